//! Shared types between the engine and the operator panel
//!
//! These types cross every wire the engine speaks:
//! - the append-only turn transcript and the live event feed
//! - the render-job / annotation handshake with the annotator
//! - the operator command acknowledgements
//!
//! Serializable with serde for JSON over HTTP/SSE, exported to TypeScript
//! for the panel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ============================================================================
// Action Vocabulary
// ============================================================================

/// One tool of the fixed action vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub enum Tool {
    Click,
    RightClick,
    DoubleClick,
    Drag,
    Write,
    Remember,
    Recall,
}

impl Tool {
    /// The full vocabulary, in canonical order.
    pub const ALL: [Tool; 7] = [
        Tool::Click,
        Tool::RightClick,
        Tool::DoubleClick,
        Tool::Drag,
        Tool::Write,
        Tool::Remember,
        Tool::Recall,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Click => "click",
            Tool::RightClick => "right_click",
            Tool::DoubleClick => "double_click",
            Tool::Drag => "drag",
            Tool::Write => "write",
            Tool::Remember => "remember",
            Tool::Recall => "recall",
        }
    }

    /// Look a tool up by its call name. Names are case-sensitive.
    pub fn from_name(name: &str) -> Option<Tool> {
        Tool::ALL.into_iter().find(|tool| tool.as_str() == name)
    }
}

impl std::fmt::Display for Tool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An executed action as reported by the execution surface.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct ActionCall {
    pub name: String,
    #[ts(type = "unknown[]")]
    pub args: Vec<serde_json::Value>,
}

// ============================================================================
// Annotation Handshake
// ============================================================================

/// The frame currently waiting to be annotated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct RenderJob {
    #[ts(type = "number")]
    pub seq: u64,
    /// Raw captured frame, base64 PNG
    pub image_b64: String,
    /// Actions executed right before the frame was captured
    pub actions: Vec<ActionCall>,
}

/// Annotator → engine: the marked-up frame for a sequence.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct AnnotationSubmission {
    #[ts(type = "number")]
    pub seq: u64,
    #[serde(default)]
    pub image_b64: String,
}

// ============================================================================
// Turn Transcript
// ============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub enum TurnStatus {
    Ok,
    Error,
    /// Abandoned before inference because the engine was paused
    Aborted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct TurnRequest {
    /// Conversational context sent to inference this turn
    pub context: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct TurnResponse {
    pub status: TurnStatus,
    pub text: String,
    pub error: Option<String>,
    #[ts(type = "unknown")]
    pub usage: serde_json::Value,
}

/// One line of the append-only transcript, and one message on the event feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct TurnRecord {
    /// Turn number, starting at 1
    #[ts(type = "number")]
    pub turn: u64,
    pub timestamp: DateTime<Utc>,
    #[ts(type = "number")]
    pub latency_ms: u64,
    pub request: TurnRequest,
    pub response: TurnResponse,
    /// Actions the execution surface carried out this turn
    pub actions: Vec<ActionCall>,
    /// Rejected or malformed action lines, one description per line
    #[serde(default)]
    pub malformed: Vec<String>,
}

impl TurnRecord {
    pub fn status(&self) -> TurnStatus {
        self.response.status
    }
}

/// Latest-state snapshot, overwritten after every turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct StateSnapshot {
    #[ts(type = "number")]
    pub turn: u64,
    pub context: String,
    pub timestamp: DateTime<Utc>,
}

// ============================================================================
// Operator Commands
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct HealthStatus {
    pub ok: bool,
    pub paused: bool,
    pub run_dir: String,
    pub ts: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct PauseAck {
    pub paused: bool,
}

/// Generic acknowledgement for commands with no payload of their own.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct CommandAck {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandAck {
    pub fn ok() -> Self {
        Self {
            ok: true,
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct DebugExecuteRequest {
    /// Action text, one call per line
    #[serde(default)]
    pub raw: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, TS)]
#[ts(export, export_to = "../../panel/types/generated.ts")]
pub struct DebugExecuteResponse {
    pub executed: Vec<String>,
    pub malformed: Vec<String>,
    pub error: Option<String>,
}
