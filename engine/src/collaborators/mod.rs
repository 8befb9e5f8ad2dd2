//! Interfaces to the parties the control loop drives.
//!
//! The orchestrator only ever sees these traits; the concrete adapters
//! (an external executor process and an OpenAI-compatible HTTP endpoint)
//! are chosen at startup.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use shared_types::Tool;

pub mod inference;
pub mod process;

pub use inference::OpenAiInference;
pub use process::ProcessExecutor;

#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Context text; the executor carries out every call line it contains
    pub context: String,
    /// Run directory the executor may use for memory and crop files
    pub run_dir: Option<PathBuf>,
    /// Dry run requested from the operator panel
    pub debug: bool,
    pub allowed_tools: Vec<Tool>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    /// Captured frame after the actions ran, base64 PNG. Empty when capture failed.
    pub frame_b64: String,
    /// Report lines of the calls that ran, e.g. `click(10, 20)`
    pub executed: Vec<String>,
    /// Lines that were rejected or failed to parse
    pub malformed: Vec<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Execution or capture failure reported by the collaborator itself
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub context: String,
    /// Annotated frame, base64 PNG
    pub image_b64: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InferenceResponse {
    pub text: String,
    pub usage: serde_json::Value,
    pub success: bool,
    pub error: Option<String>,
}

impl InferenceResponse {
    pub fn completed(text: impl Into<String>, usage: serde_json::Value) -> Self {
        Self {
            text: text.into(),
            usage,
            success: true,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            text: String::new(),
            usage: serde_json::json!({}),
            success: false,
            error: Some(error.into()),
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    #[error("failed to launch collaborator: {0}")]
    Spawn(#[from] std::io::Error),
    #[error("collaborator exited with status {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("collaborator produced no output")]
    EmptyOutput,
    #[error("collaborator output is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("collaborator timed out after {0:?}")]
    Timeout(Duration),
}

/// Carries out actions on the display and captures the resulting frame.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, request: ExecutionRequest)
        -> Result<ExecutionOutcome, CollaboratorError>;
}

/// Turns context plus one annotated frame into free text.
///
/// Failures are reported inside the response rather than as `Err`, since
/// the control loop treats them as degraded output.
#[async_trait]
pub trait Inference: Send + Sync {
    /// Model identifier recorded with every turn
    fn model(&self) -> &str;

    async fn infer(&self, request: InferenceRequest) -> InferenceResponse;
}

pub type SharedExecutor = Arc<dyn Executor>;
pub type SharedInference = Arc<dyn Inference>;
