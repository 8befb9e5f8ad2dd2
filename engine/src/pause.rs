//! Engine-wide pause gate.
//!
//! A single boolean shared by the control loop and the operator handlers.
//! Backed by a `watch` channel so waiters wake on change instead of polling.

use std::sync::Arc;

use tokio::sync::watch;

#[derive(Clone)]
pub struct PauseController {
    tx: Arc<watch::Sender<bool>>,
}

impl PauseController {
    pub fn new(paused: bool) -> Self {
        let (tx, _rx) = watch::channel(paused);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.set(true);
    }

    pub fn unpause(&self) {
        self.set(false);
    }

    /// Last write wins. Returns the previous value.
    pub fn set(&self, paused: bool) -> bool {
        self.tx.send_replace(paused)
    }

    pub fn is_paused(&self) -> bool {
        *self.tx.borrow()
    }

    /// Resolves as soon as the engine is (or becomes) paused.
    pub async fn wait_until_paused(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|paused| *paused).await;
    }

    /// Resolves as soon as the engine is (or becomes) unpaused.
    pub async fn wait_until_unpaused(&self) {
        let mut rx = self.tx.subscribe();
        let _ = rx.wait_for(|paused| !*paused).await;
    }
}

impl Default for PauseController {
    /// The engine starts paused; the operator resumes it.
    fn default() -> Self {
        Self::new(true)
    }
}
