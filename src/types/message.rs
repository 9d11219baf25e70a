//! Bus notifications about pipeline health.

use super::LifecycleState;
use serde::{Deserialize, Serialize};

/// Source name used when the pipeline itself posts a message.
pub const PIPELINE_SOURCE: &str = "pipeline";

/// Stage-attributed diagnostic record.
///
/// Shared by bus errors, construction failures and transition causes so the
/// caller always sees the same shape regardless of where a failure surfaced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    /// Name of the stage that failed
    pub stage: String,
    /// Human-readable failure message
    pub message: String,
    /// Optional extra detail for debugging
    pub debug: Option<String>,
}

impl StageFailure {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            message: message.into(),
            debug: None,
        }
    }

    #[must_use]
    pub fn with_debug(mut self, debug: impl Into<String>) -> Self {
        self.debug = Some(debug.into());
        self
    }
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)?;
        if let Some(ref debug) = self.debug {
            write!(f, " ({debug})")?;
        }
        Ok(())
    }
}

/// One-shot asynchronous notification posted on the pipeline bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusMessage {
    /// A stage hit an unrecoverable error
    Error(StageFailure),
    /// The source ran dry and every frame reached the sink
    EndOfStream,
    /// A stage (or the pipeline, see [`PIPELINE_SOURCE`]) changed state
    StateChanged {
        source: String,
        old: LifecycleState,
        new: LifecycleState,
    },
}

impl BusMessage {
    pub fn pipeline_state_changed(old: LifecycleState, new: LifecycleState) -> Self {
        BusMessage::StateChanged {
            source: PIPELINE_SOURCE.to_string(),
            old,
            new,
        }
    }

    /// Whether this message ends the run.
    pub const fn is_terminal(&self) -> bool {
        matches!(self, BusMessage::Error(_) | BusMessage::EndOfStream)
    }
}

impl std::fmt::Display for BusMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BusMessage::Error(failure) => write!(f, "ERROR {failure}"),
            BusMessage::EndOfStream => write!(f, "EOS"),
            BusMessage::StateChanged { source, old, new } => {
                write!(f, "STATE {source}: {old} -> {new}")
            }
        }
    }
}
