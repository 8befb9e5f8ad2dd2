//! Executor backed by an external program.
//!
//! One JSON request goes to the child's stdin, one JSON reply comes back on
//! stdout. stderr is forwarded to the log. The child is killed when the
//! timeout elapses.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

use super::{CollaboratorError, ExecutionOutcome, ExecutionRequest, Executor};
use crate::config::ExecutorConfig;
use crate::tools;

#[derive(Debug, Serialize)]
struct ExecutorInput<'a> {
    raw: &'a str,
    run_dir: String,
    debug: bool,
    allowed_tools: Vec<&'static str>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ExecutorReply {
    success: Option<bool>,
    executed: Vec<String>,
    malformed: Vec<String>,
    screenshot_b64: String,
    width: Option<u32>,
    height: Option<u32>,
    error: Option<String>,
    capture_error: Option<String>,
}

impl From<ExecutorReply> for ExecutionOutcome {
    fn from(reply: ExecutorReply) -> Self {
        let error = reply.error.or(reply.capture_error).or_else(|| {
            (reply.success == Some(false)).then(|| "executor reported failure".to_string())
        });
        ExecutionOutcome {
            frame_b64: reply.screenshot_b64,
            executed: reply.executed,
            malformed: reply.malformed,
            width: reply.width,
            height: reply.height,
            error,
        }
    }
}

pub struct ProcessExecutor {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        Self {
            program: config.program.clone(),
            args: config.args.clone(),
            timeout: config.timeout,
        }
    }

    async fn run(&self, input: Vec<u8>) -> Result<Vec<u8>, CollaboratorError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // A child that exits without reading stdin closes the pipe early;
            // its exit status still tells the story.
            if let Err(e) = stdin.write_all(&input).await {
                debug!(error = %e, "executor did not read its request");
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| CollaboratorError::Timeout(self.timeout))??;

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            debug!(target: "engine::executor", "{line}");
        }

        if !output.status.success() {
            return Err(CollaboratorError::Exit {
                code: output.status.code(),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl Executor for ProcessExecutor {
    async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, CollaboratorError> {
        let input = ExecutorInput {
            raw: &request.context,
            run_dir: request
                .run_dir
                .as_ref()
                .map(|p| p.to_string_lossy().into_owned())
                .unwrap_or_default(),
            debug: request.debug,
            allowed_tools: tools::names(&request.allowed_tools),
        };
        let stdout = self.run(serde_json::to_vec(&input)?).await?;

        if stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(CollaboratorError::EmptyOutput);
        }
        let reply: ExecutorReply = serde_json::from_slice(&stdout)?;
        let outcome = ExecutionOutcome::from(reply);
        if let Some(error) = &outcome.error {
            warn!(error = %error, "executor reported an error");
        }
        Ok(outcome)
    }
}
