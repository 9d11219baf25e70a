//! Event bus monitor.
//!
//! The monitor is the process's one long-lived wait. It consumes bus messages
//! until one of them ends the run (an error or end-of-stream) or the shutdown
//! token is cancelled by an interrupt. It then stops the pipeline and drains
//! whatever was posted before `Stopped` was reached, so a late error is never
//! lost.

use super::{BusReceiver, LifecycleController};
use crate::error::PipelineError;
use crate::types::{BusMessage, StageFailure, PIPELINE_SOURCE};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// How a run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// The source ran dry
    EndOfStream,
    /// Stopped by an interrupt (or another stop request)
    Interrupted,
    /// A stage reported a fatal error
    Failed(StageFailure),
}

impl PipelineOutcome {
    /// Process exit code for this outcome.
    pub const fn exit_code(&self) -> u8 {
        match self {
            PipelineOutcome::EndOfStream | PipelineOutcome::Interrupted => 0,
            PipelineOutcome::Failed(_) => 1,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.exit_code() == 0
    }

    /// `Err` carrying the failing stage for [`PipelineOutcome::Failed`].
    pub fn into_result(self) -> Result<(), PipelineError> {
        match self {
            PipelineOutcome::Failed(failure) => Err(PipelineError::Runtime(failure)),
            PipelineOutcome::EndOfStream | PipelineOutcome::Interrupted => Ok(()),
        }
    }
}

impl std::fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineOutcome::EndOfStream => write!(f, "end of stream"),
            PipelineOutcome::Interrupted => write!(f, "interrupted"),
            PipelineOutcome::Failed(failure) => write!(f, "failed: {failure}"),
        }
    }
}

/// Single consumer of the pipeline bus.
pub struct EventBusMonitor {
    controller: Arc<LifecycleController>,
}

impl EventBusMonitor {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }

    /// Wait for the run to end, stop the pipeline, and report how it ended.
    pub async fn run(self, mut bus: BusReceiver) -> PipelineOutcome {
        let shutdown = self.controller.shutdown_token();

        let mut outcome = loop {
            let message = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("Stop requested, leaving bus wait");
                    break PipelineOutcome::Interrupted;
                }
                message = bus.next_message() => message,
            };

            let Some(message) = message else {
                error!("Bus closed while pipeline was running");
                break PipelineOutcome::Failed(StageFailure::new(
                    PIPELINE_SOURCE,
                    "bus closed unexpectedly",
                ));
            };
            if let Some(outcome) = self.dispatch(message) {
                break outcome;
            }
        };

        self.controller.stop().await;

        for message in bus.drain_pending() {
            match message {
                BusMessage::Error(failure) => {
                    if matches!(outcome, PipelineOutcome::Failed(_)) {
                        warn!(stage = %failure.stage, error = %failure.message, "Additional error during shutdown");
                    } else {
                        error!(stage = %failure.stage, error = %failure.message, debug = ?failure.debug, "Error raised during shutdown");
                        outcome = PipelineOutcome::Failed(failure);
                    }
                }
                other => {
                    self.log_informational(&other);
                }
            }
        }

        info!(outcome = %outcome, "Pipeline run finished");
        outcome
    }

    /// Handle one message; `Some` ends the wait.
    fn dispatch(&self, message: BusMessage) -> Option<PipelineOutcome> {
        match message {
            BusMessage::Error(failure) => {
                error!(
                    stage = %failure.stage,
                    error = %failure.message,
                    debug = failure.debug.as_deref().unwrap_or("none"),
                    "Error received from stage"
                );
                Some(PipelineOutcome::Failed(failure))
            }
            BusMessage::EndOfStream => {
                info!("End-of-stream reached");
                Some(PipelineOutcome::EndOfStream)
            }
            other => {
                self.log_informational(&other);
                None
            }
        }
    }

    fn log_informational(&self, message: &BusMessage) {
        match message {
            BusMessage::StateChanged { source, old, new } if source == PIPELINE_SOURCE => {
                info!(pipeline = %self.controller.name(), "Pipeline state changed from {old} to {new}");
            }
            BusMessage::StateChanged { source, old, new } => {
                debug!(stage = %source, "State changed from {old} to {new}");
            }
            BusMessage::EndOfStream => debug!("End-of-stream after shutdown"),
            BusMessage::Error(_) => {}
        }
    }
}
