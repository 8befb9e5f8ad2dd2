//! Fake collaborators and fixtures shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use tokio::task::JoinHandle;

use engine::collaborators::{
    CollaboratorError, ExecutionOutcome, ExecutionRequest, Executor, Inference, InferenceRequest,
    InferenceResponse,
};
use engine::config::TurnConfig;
use engine::handshake::AnnotationHandshake;
use engine::session::RunSession;
use engine::tools::ToolRegistry;
use engine::AppState;

pub fn b64(bytes: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(bytes)
}

/// Raw frame as returned by the fake executor.
pub fn raw_frame() -> String {
    b64(b"\x89PNG\r\n\x1a\nraw-frame-bytes")
}

/// Marked-up frame as submitted by the fake annotator. Long enough to pass
/// the handshake's size check.
pub fn annotated_frame() -> String {
    b64(&[0x42; 256])
}

pub enum ExecutorBehavior {
    Reply(ExecutionOutcome),
    Fail,
    Hang,
}

pub struct FakeExecutor {
    behavior: ExecutorBehavior,
    pub requests: Mutex<Vec<ExecutionRequest>>,
}

impl FakeExecutor {
    pub fn new(behavior: ExecutorBehavior) -> Arc<Self> {
        Arc::new(Self {
            behavior,
            requests: Mutex::new(Vec::new()),
        })
    }

    /// Frame plus two executed actions.
    pub fn capturing() -> Arc<Self> {
        Self::new(ExecutorBehavior::Reply(ExecutionOutcome {
            frame_b64: raw_frame(),
            executed: vec!["click(100, 200)".to_string(), "write(\"hi\")".to_string()],
            malformed: vec!["teleport(1, 1)".to_string()],
            width: Some(640),
            height: Some(480),
            error: None,
        }))
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_request(&self) -> Option<ExecutionRequest> {
        self.requests.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl Executor for FakeExecutor {
    async fn execute(
        &self,
        request: ExecutionRequest,
    ) -> Result<ExecutionOutcome, CollaboratorError> {
        self.requests.lock().unwrap().push(request);
        match &self.behavior {
            ExecutorBehavior::Reply(outcome) => Ok(outcome.clone()),
            ExecutorBehavior::Fail => Err(CollaboratorError::EmptyOutput),
            ExecutorBehavior::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(CollaboratorError::EmptyOutput)
            }
        }
    }
}

/// Replays scripted responses in order, then fails.
pub struct ScriptedInference {
    script: Mutex<VecDeque<InferenceResponse>>,
    pub requests: Mutex<Vec<InferenceRequest>>,
}

impl ScriptedInference {
    pub fn new(script: Vec<InferenceResponse>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl Inference for ScriptedInference {
    fn model(&self) -> &str {
        "fake-vlm"
    }

    async fn infer(&self, request: InferenceRequest) -> InferenceResponse {
        self.requests.lock().unwrap().push(request);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| InferenceResponse::failed("script exhausted"))
    }
}

/// Never answers; only the caller's bound ends an attempt.
#[derive(Default)]
pub struct HangingInference {
    pub attempts: Mutex<usize>,
}

impl HangingInference {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        *self.attempts.lock().unwrap()
    }
}

#[async_trait]
impl Inference for HangingInference {
    fn model(&self) -> &str {
        "fake-vlm"
    }

    async fn infer(&self, _request: InferenceRequest) -> InferenceResponse {
        *self.attempts.lock().unwrap() += 1;
        tokio::time::sleep(Duration::from_secs(3600)).await;
        InferenceResponse::failed("woke up")
    }
}

pub struct Fixture {
    pub dir: tempfile::TempDir,
    pub state: Arc<AppState>,
}

pub fn fixture(executor: Arc<dyn Executor>) -> Fixture {
    let dir = tempfile::tempdir().expect("Failed to create temp directory");
    let tools = Arc::new(ToolRegistry::new());
    let session = RunSession::start(dir.path(), &tools).expect("Failed to start run session");
    let state = Arc::new(
        AppState::new(session, tools, executor)
            .with_panel_html(dir.path().join("panel.html"))
            .with_sse_keepalive(Duration::from_secs(1))
            .with_executor_timeout(Duration::from_millis(500)),
    );
    Fixture { dir, state }
}

pub fn fast_turns() -> TurnConfig {
    TurnConfig {
        annotation_timeout: Duration::from_secs(5),
        throttle: Duration::from_millis(10),
        executor_timeout: Duration::from_secs(2),
        inference_timeout: Duration::from_secs(2),
        ..TurnConfig::default()
    }
}

/// Submits `image` for every job that shows up, like a well-behaved panel.
pub fn spawn_annotator(handshake: Arc<AnnotationHandshake>, image: String) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if let Some(job) = handshake.peek() {
                let _ = handshake.submit(job.seq, image.clone());
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
}
