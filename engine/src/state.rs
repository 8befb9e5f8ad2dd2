use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::collaborators::SharedExecutor;
use crate::event_bus::EventBus;
use crate::handshake::AnnotationHandshake;
use crate::pause::PauseController;
use crate::session::RunSession;
use crate::tools::ToolRegistry;

/// Handles shared by the control loop and the operator API.
pub struct AppState {
    pub pause: PauseController,
    pub tools: Arc<ToolRegistry>,
    pub handshake: Arc<AnnotationHandshake>,
    pub bus: EventBus,
    pub session: Arc<RunSession>,
    pub executor: SharedExecutor,
    /// Operator panel page served at `/`
    pub panel_html: PathBuf,
    pub sse_keepalive: Duration,
    /// Upper bound on operator-triggered executor calls
    pub executor_timeout: Duration,
}

impl AppState {
    /// Fresh state for a started session. The engine begins paused.
    pub fn new(
        session: Arc<RunSession>,
        tools: Arc<ToolRegistry>,
        executor: SharedExecutor,
    ) -> Self {
        Self {
            pause: PauseController::default(),
            tools,
            handshake: Arc::new(AnnotationHandshake::new()),
            bus: EventBus::new(),
            session,
            executor,
            panel_html: PathBuf::from("panel.html"),
            sse_keepalive: Duration::from_secs(10),
            executor_timeout: Duration::from_secs(120),
        }
    }

    pub fn with_panel_html(mut self, path: PathBuf) -> Self {
        self.panel_html = path;
        self
    }

    pub fn with_sse_keepalive(mut self, interval: Duration) -> Self {
        self.sse_keepalive = interval;
        self
    }

    pub fn with_executor_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = timeout;
        self
    }
}
