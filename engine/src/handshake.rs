//! Single-slot sequenced rendezvous between the control loop and the
//! annotator.
//!
//! The control loop publishes a raw frame as a render job and then blocks
//! until the annotator submits the marked-up frame for exactly that
//! sequence. Inference never sees a frame that did not come through here.
//!
//! ```text
//! Idle --publish--> Awaiting(seq) --submit(seq)--> Settled(seq) --take--> Idle
//!                        |                                         ^
//!                        +------------ timeout / pause ------------+
//! ```
//!
//! The slot lives behind one mutex that is only held for the read/update;
//! waiting happens on a `Notify` outside the lock.

use std::sync::Mutex;
use std::time::Duration;

use shared_types::{ActionCall, RenderJob};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::pause::PauseController;

/// Submissions shorter than this (in base64 characters) are rejected.
pub const MIN_ANNOTATION_B64_LEN: usize = 100;

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("no outstanding job")]
    NoOutstandingJob,
    #[error(
        "seq mismatch (got {got}, want {})",
        .expected.map_or_else(|| "none".to_string(), |s| s.to_string())
    )]
    SequenceMismatch { got: u64, expected: Option<u64> },
    #[error("annotated image too small/empty ({len} < {min} chars)")]
    InvalidImage { len: usize, min: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    Awaiting(u64),
    Settled(u64),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationResult {
    pub seq: u64,
    pub image_b64: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AwaitOutcome {
    Annotated(AnnotationResult),
    Paused,
    TimedOut,
    /// A newer job replaced the one being awaited.
    Superseded,
}

struct Slot {
    last_seq: u64,
    state: HandshakeState,
    job: Option<RenderJob>,
    result: Option<String>,
}

pub struct AnnotationHandshake {
    slot: Mutex<Slot>,
    settled: Notify,
}

impl AnnotationHandshake {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot {
                last_seq: 0,
                state: HandshakeState::Idle,
                job: None,
                result: None,
            }),
            settled: Notify::new(),
        }
    }

    /// Replace the current job with a new one and start awaiting it.
    pub fn publish(&self, image_b64: String, actions: Vec<ActionCall>) -> RenderJob {
        let job = {
            let mut slot = self.slot.lock().expect("handshake lock poisoned");
            slot.last_seq += 1;
            let job = RenderJob {
                seq: slot.last_seq,
                image_b64,
                actions,
            };
            slot.job = Some(job.clone());
            slot.result = None;
            slot.state = HandshakeState::Awaiting(job.seq);
            job
        };
        // Wake any stale waiter so it can observe it was superseded.
        self.settled.notify_waiters();
        debug!(seq = job.seq, "render job published");
        job
    }

    /// The job awaiting annotation, if any. No side effects.
    pub fn peek(&self) -> Option<RenderJob> {
        let slot = self.slot.lock().expect("handshake lock poisoned");
        match slot.state {
            HandshakeState::Awaiting(_) => slot.job.clone(),
            _ => None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.slot.lock().expect("handshake lock poisoned").state
    }

    /// Accept the annotated frame for the awaited sequence.
    pub fn submit(&self, seq: u64, image_b64: String) -> Result<(), HandshakeError> {
        {
            let mut slot = self.slot.lock().expect("handshake lock poisoned");
            match slot.state {
                HandshakeState::Idle => return Err(HandshakeError::NoOutstandingJob),
                HandshakeState::Settled(_) => {
                    return Err(HandshakeError::SequenceMismatch {
                        got: seq,
                        expected: None,
                    })
                }
                HandshakeState::Awaiting(want) if want != seq => {
                    return Err(HandshakeError::SequenceMismatch {
                        got: seq,
                        expected: Some(want),
                    })
                }
                HandshakeState::Awaiting(_) => {}
            }

            let len = image_b64.trim().len();
            if len < MIN_ANNOTATION_B64_LEN {
                return Err(HandshakeError::InvalidImage {
                    len,
                    min: MIN_ANNOTATION_B64_LEN,
                });
            }

            slot.result = Some(image_b64);
            slot.state = HandshakeState::Settled(seq);
        }
        self.settled.notify_waiters();
        debug!(seq, "annotation accepted");
        Ok(())
    }

    /// Block until the annotation for `seq` arrives, `timeout` elapses, or
    /// the engine is paused. Every outcome leaves the slot Idle (or on a
    /// newer job when superseded).
    pub async fn await_annotation(
        &self,
        seq: u64,
        timeout: Duration,
        pause: &PauseController,
    ) -> AwaitOutcome {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.settled.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if pause.is_paused() {
                self.abandon(seq);
                return AwaitOutcome::Paused;
            }

            {
                let mut slot = self.slot.lock().expect("handshake lock poisoned");
                match slot.state {
                    HandshakeState::Settled(s) if s == seq => {
                        let image_b64 = slot.result.take().unwrap_or_default();
                        slot.state = HandshakeState::Idle;
                        slot.job = None;
                        return AwaitOutcome::Annotated(AnnotationResult { seq, image_b64 });
                    }
                    HandshakeState::Awaiting(s) if s == seq => {}
                    _ => {
                        warn!(seq, "awaited render job was superseded");
                        return AwaitOutcome::Superseded;
                    }
                }
            }

            tokio::select! {
                biased;
                _ = &mut notified => {}
                _ = pause.wait_until_paused() => {}
                _ = tokio::time::sleep_until(deadline) => {
                    return match self.expire(seq) {
                        Some(image_b64) => AwaitOutcome::Annotated(AnnotationResult { seq, image_b64 }),
                        None => AwaitOutcome::TimedOut,
                    };
                }
            }
        }
    }

    /// Deadline reached: hand back a result that settled in the meantime,
    /// otherwise drop the job.
    fn expire(&self, seq: u64) -> Option<String> {
        let mut slot = self.slot.lock().expect("handshake lock poisoned");
        if slot.state == HandshakeState::Settled(seq) {
            slot.state = HandshakeState::Idle;
            slot.job = None;
            return Some(slot.result.take().unwrap_or_default());
        }
        if slot.state == HandshakeState::Awaiting(seq) {
            slot.state = HandshakeState::Idle;
            slot.job = None;
            slot.result = None;
        }
        None
    }

    /// Drop the job for `seq` so late submissions are refused.
    fn abandon(&self, seq: u64) {
        let mut slot = self.slot.lock().expect("handshake lock poisoned");
        if matches!(slot.state, HandshakeState::Awaiting(s) | HandshakeState::Settled(s) if s == seq)
        {
            slot.state = HandshakeState::Idle;
            slot.job = None;
            slot.result = None;
        }
    }
}

impl Default for AnnotationHandshake {
    fn default() -> Self {
        Self::new()
    }
}
