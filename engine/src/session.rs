//! Per-run directory with an append-only turn transcript.
//!
//! Layout of one run:
//!
//! ```text
//! <run base>/run_20260101_120000/
//!     allowed_tools.json   ordered tool allow-list
//!     turns.jsonl          one TurnRecord per line, append-only
//!     state.json           latest {turn, context, timestamp}, overwritten
//!     turn_0001.png        captured frame per turn
//! ```

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::Engine as _;
use chrono::{DateTime, Local, Utc};
use shared_types::{StateSnapshot, TurnRecord};
use tracing::info;

use crate::tools::{ToolRegistry, ToolRegistryError};

pub const TRANSCRIPT_FILE: &str = "turns.jsonl";
pub const SNAPSHOT_FILE: &str = "state.json";

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("run directory I/O failed: {0}")]
    Io(#[from] io::Error),
    #[error("failed to encode record: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("frame is not valid base64: {0}")]
    Frame(#[from] base64::DecodeError),
    #[error(transparent)]
    Tools(#[from] ToolRegistryError),
}

#[derive(Debug)]
pub struct RunSession {
    root: PathBuf,
    created_at: DateTime<Utc>,
}

impl RunSession {
    /// Allocate a fresh run directory under `base` and attach the tool
    /// registry to it.
    pub fn start(base: &Path, tools: &ToolRegistry) -> Result<Arc<Self>, SessionError> {
        let stem = Local::now().format("run_%Y%m%d_%H%M%S").to_string();
        let root = allocate_run_dir(base, &stem)?;
        tools.attach(&root)?;
        info!(run_dir = %root.display(), "run session started");
        Ok(Arc::new(Self {
            root,
            created_at: Utc::now(),
        }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Append one record to the transcript and overwrite the snapshot with
    /// the context the next turn will start from.
    pub fn append(&self, record: &TurnRecord, context: &str) -> Result<(), SessionError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let mut transcript = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.root.join(TRANSCRIPT_FILE))?;
        transcript.write_all(line.as_bytes())?;

        let snapshot = StateSnapshot {
            turn: record.turn,
            context: context.to_string(),
            timestamp: Utc::now(),
        };
        fs::write(
            self.root.join(SNAPSHOT_FILE),
            serde_json::to_string_pretty(&snapshot)?,
        )?;
        Ok(())
    }

    /// Decode a base64 frame and store it as `turn_NNNN.png`.
    pub fn save_frame(&self, turn: u64, image_b64: &str) -> Result<PathBuf, SessionError> {
        let bytes = base64::engine::general_purpose::STANDARD.decode(image_b64.trim())?;
        let path = self.root.join(frame_file_name(turn));
        fs::write(&path, bytes)?;
        Ok(path)
    }

    pub fn read_transcript(&self) -> Result<Vec<TurnRecord>, SessionError> {
        let path = self.root.join(TRANSCRIPT_FILE);
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        raw.lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| serde_json::from_str(line).map_err(SessionError::from))
            .collect()
    }

    pub fn read_snapshot(&self) -> Result<Option<StateSnapshot>, SessionError> {
        match fs::read_to_string(self.root.join(SNAPSHOT_FILE)) {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

pub fn frame_file_name(turn: u64) -> String {
    format!("turn_{turn:04}.png")
}

/// Claim `base/stem`, or `base/stem_1`, `base/stem_2`, ... when taken.
///
/// `create_dir` fails on an existing path, so the claim holds even when two
/// engines start within the same second.
fn allocate_run_dir(base: &Path, stem: &str) -> io::Result<PathBuf> {
    fs::create_dir_all(base)?;
    let mut candidate = base.join(stem);
    let mut suffix = 1u32;
    loop {
        match fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                candidate = base.join(format!("{stem}_{suffix}"));
                suffix += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
