//! The control loop.
//!
//! One iteration is one turn:
//!
//! ```text
//! execute actions -> persist frame -> publish render job -> await annotation
//!     -> infer -> parse + pad actions -> advance context -> record + broadcast
//! ```
//!
//! Inference only ever receives a frame accepted by the handshake for the
//! job this turn published. A pause abandons the turn at the annotation
//! wait; an annotation timeout force-pauses the engine.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use shared_types::{ActionCall, TurnRecord, TurnRequest, TurnResponse, TurnStatus};
use tracing::{debug, error, info, warn};

use crate::actions::{call_from_report, extract_actions, Action};
use crate::collaborators::{
    ExecutionOutcome, ExecutionRequest, InferenceRequest, InferenceResponse, SharedInference,
};
use crate::config::TurnConfig;
use crate::handshake::AwaitOutcome;
use crate::state::AppState;

/// First line of every context after the first turn.
pub const CONTEXT_PREAMBLE: &str = "I see the screen with previous actions marked.";

#[derive(Debug, Clone)]
pub enum TurnOutcome {
    /// Inference ran and the context advanced. The record may still carry
    /// status `error` when inference came back empty.
    Completed(TurnRecord),
    /// The engine was paused before inference; context unchanged.
    Aborted(TurnRecord),
    /// No annotation arrived in time; the engine is now paused.
    AnnotationTimedOut(TurnRecord),
}

impl TurnOutcome {
    pub fn record(&self) -> &TurnRecord {
        match self {
            TurnOutcome::Completed(record)
            | TurnOutcome::Aborted(record)
            | TurnOutcome::AnnotationTimedOut(record) => record,
        }
    }
}

pub struct TurnOrchestrator {
    state: Arc<AppState>,
    inference: SharedInference,
    config: TurnConfig,
    context: String,
    turn: u64,
}

/// Per-turn data gathered before inference.
struct TurnDraft {
    turn: u64,
    started: Instant,
    actions: Vec<ActionCall>,
    malformed: Vec<String>,
}

impl TurnOrchestrator {
    pub fn new(state: Arc<AppState>, inference: SharedInference, config: TurnConfig) -> Self {
        let context = config.initial_context.clone();
        Self {
            state,
            inference,
            config,
            context,
            turn: 0,
        }
    }

    /// Context the next turn will start from.
    pub fn context(&self) -> &str {
        &self.context
    }

    /// Number of the last turn started.
    pub fn turn(&self) -> u64 {
        self.turn
    }

    /// Drive turns forever, idling while paused.
    pub async fn run(mut self) {
        info!(
            run_dir = %self.state.session.root().display(),
            "control loop ready, waiting for resume"
        );
        loop {
            self.state.pause.wait_until_unpaused().await;
            if let TurnOutcome::Completed(_) = self.run_turn().await {
                tokio::time::sleep(self.config.throttle).await;
            }
        }
    }

    /// Run exactly one turn.
    pub async fn run_turn(&mut self) -> TurnOutcome {
        self.turn += 1;
        let turn = self.turn;
        let started = Instant::now();
        info!(turn, "turn started");

        let execution = self.execute(turn).await;
        let actions: Vec<ActionCall> = execution
            .executed
            .iter()
            .filter_map(|line| call_from_report(line))
            .collect();

        if execution.frame_b64.is_empty() {
            warn!(turn, "execution returned no frame");
        } else if let Err(e) = self.state.session.save_frame(turn, &execution.frame_b64) {
            warn!(turn, error = %e, "failed to persist frame");
        }

        // Executor failures ride along with the malformed lines so the record
        // shows why the turn degraded.
        let mut malformed = execution.malformed;
        if let Some(e) = execution.error {
            malformed.push(format!("execution: {e}"));
        }
        let draft = TurnDraft {
            turn,
            started,
            actions: actions.clone(),
            malformed,
        };

        let job = self.state.handshake.publish(execution.frame_b64, actions);
        debug!(turn, seq = job.seq, stage = "await_annotation", "waiting for annotation");

        let annotated = match self
            .state
            .handshake
            .await_annotation(job.seq, self.config.annotation_timeout, &self.state.pause)
            .await
        {
            AwaitOutcome::Annotated(result) => result.image_b64,
            AwaitOutcome::Paused | AwaitOutcome::Superseded => return self.abort(draft),
            AwaitOutcome::TimedOut => return self.annotation_timed_out(draft),
        };

        // A pause that raced the submission still stops the turn here.
        if self.state.pause.is_paused() {
            return self.abort(draft);
        }

        let response = self.infer(turn, annotated).await;
        let error = response
            .error
            .clone()
            .or_else(|| (!response.success).then(|| "inference reported failure".to_string()));
        let status = if !response.is_blank() && error.is_none() {
            TurnStatus::Ok
        } else {
            TurnStatus::Error
        };

        let planned = plan_actions(&response.text, &self.config.fallback_action, self.config.min_actions);
        let next = next_context(&planned);

        let record = self.build_record(
            &draft,
            TurnResponse {
                status,
                text: response.text,
                error,
                usage: response.usage,
            },
        );
        self.context = next;
        self.commit(&record);
        info!(
            turn,
            status = ?record.status(),
            latency_ms = record.latency_ms,
            "turn completed"
        );
        TurnOutcome::Completed(record)
    }

    async fn execute(&self, turn: u64) -> ExecutionOutcome {
        let request = ExecutionRequest {
            context: self.context.clone(),
            run_dir: Some(self.state.session.root().to_path_buf()),
            debug: false,
            allowed_tools: self.state.tools.get(),
        };
        let outcome = tokio::time::timeout(
            self.config.executor_timeout,
            self.state.executor.execute(request),
        )
        .await;

        match outcome {
            Ok(Ok(outcome)) => {
                if let Some(e) = &outcome.error {
                    warn!(turn, error = %e, "executor reported an error");
                }
                debug!(
                    turn,
                    executed = outcome.executed.len(),
                    malformed = outcome.malformed.len(),
                    "actions executed"
                );
                outcome
            }
            Ok(Err(e)) => {
                warn!(turn, error = %e, "execution failed");
                ExecutionOutcome {
                    error: Some(e.to_string()),
                    ..ExecutionOutcome::default()
                }
            }
            Err(_) => {
                warn!(turn, timeout = ?self.config.executor_timeout, "execution timed out");
                ExecutionOutcome {
                    error: Some(format!(
                        "execution timed out after {:?}",
                        self.config.executor_timeout
                    )),
                    ..ExecutionOutcome::default()
                }
            }
        }
    }

    /// Call inference, retrying once when the text comes back blank.
    async fn infer(&self, turn: u64, image_b64: String) -> InferenceResponse {
        let request = InferenceRequest {
            context: self.context.clone(),
            image_b64,
        };

        let mut response = InferenceResponse::failed("inference not attempted");
        for attempt in 1..=2 {
            response = match tokio::time::timeout(
                self.config.inference_timeout,
                self.inference.infer(request.clone()),
            )
            .await
            {
                Ok(response) => response,
                Err(_) => InferenceResponse::failed(format!(
                    "inference timed out after {:?}",
                    self.config.inference_timeout
                )),
            };
            if !response.is_blank() {
                break;
            }
            warn!(turn, attempt, error = ?response.error, "inference returned empty text");
        }
        response
    }

    fn abort(&mut self, draft: TurnDraft) -> TurnOutcome {
        info!(turn = draft.turn, "engine paused, turn abandoned before inference");
        let record = self.build_record(
            &draft,
            TurnResponse {
                status: TurnStatus::Aborted,
                text: String::new(),
                error: Some("turn abandoned: engine paused".to_string()),
                usage: serde_json::json!({}),
            },
        );
        self.commit(&record);
        TurnOutcome::Aborted(record)
    }

    fn annotation_timed_out(&mut self, draft: TurnDraft) -> TurnOutcome {
        self.state.pause.pause();
        error!(
            turn = draft.turn,
            timeout = ?self.config.annotation_timeout,
            "annotation timeout, engine paused"
        );
        let record = self.build_record(
            &draft,
            TurnResponse {
                status: TurnStatus::Error,
                text: String::new(),
                error: Some(format!(
                    "annotation timeout after {}s (engine paused)",
                    self.config.annotation_timeout.as_secs_f32()
                )),
                usage: serde_json::json!({}),
            },
        );
        self.commit(&record);
        TurnOutcome::AnnotationTimedOut(record)
    }

    fn build_record(&self, draft: &TurnDraft, response: TurnResponse) -> TurnRecord {
        TurnRecord {
            turn: draft.turn,
            timestamp: Utc::now(),
            latency_ms: draft.started.elapsed().as_millis() as u64,
            request: TurnRequest {
                context: self.context.clone(),
                model: self.inference.model().to_string(),
            },
            response,
            actions: draft.actions.clone(),
            malformed: draft.malformed.clone(),
        }
    }

    /// Append to the transcript, then broadcast. Persistence failures are
    /// logged; the record is still broadcast.
    fn commit(&self, record: &TurnRecord) {
        if let Err(e) = self.state.session.append(record, &self.context) {
            error!(turn = record.turn, error = %e, "failed to append turn record");
        }
        let delivered = self.state.bus.publish(record);
        debug!(turn = record.turn, subscribers = delivered, "turn record broadcast");
    }
}

/// Recognized calls from `text`, padded with `fallback` up to `min`.
pub fn plan_actions(text: &str, fallback: &Action, min: usize) -> Vec<Action> {
    let mut actions = extract_actions(text);
    while actions.len() < min {
        actions.push(fallback.clone());
    }
    actions
}

/// Context for the next turn: the preamble followed by one call per line.
pub fn next_context(actions: &[Action]) -> String {
    let lines: Vec<String> = actions.iter().map(ToString::to_string).collect();
    format!("{CONTEXT_PREAMBLE}\n\n{}\n", lines.join("\n"))
}
