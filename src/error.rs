//! Error taxonomy for building and running a pipeline.
//!
//! Every variant is fatal at the orchestrator layer; nothing here is retried.
//! Stage-attributed detail travels as [`StageFailure`] so that callers always
//! see which stage failed and why.

use crate::types::{LifecycleState, StageFailure};
use std::path::PathBuf;

// ============================================================================
// Configuration
// ============================================================================

/// A configuration key that is not part of the schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKey {
    /// Dotted path of the offending key
    pub path: String,
    /// Closest known key, if one is near enough
    pub suggestion: Option<String>,
}

impl std::fmt::Display for UnknownKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown key '{}'", self.path)?;
        if let Some(ref s) = self.suggestion {
            write!(f, " (did you mean '{s}'?)")?;
        }
        Ok(())
    }
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean '{s}'?)"))
        .unwrap_or_default()
}

fn bullet_list<T: std::fmt::Display>(items: &[T]) -> String {
    items.iter().map(|i| format!("\n  - {i}")).collect()
}

/// Problems detected before any stage is touched.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("credential environment variable {var} is not set")]
    MissingCredential { var: &'static str },

    #[error("credential environment variable {var} still holds the placeholder value")]
    PlaceholderCredential { var: &'static str },

    #[error("configuration contains unknown keys:{}", bullet_list(.0))]
    UnknownKeys(Vec<UnknownKey>),

    #[error("stage '{stage}' ({kind}): unknown property '{property}'{}", did_you_mean(.suggestion))]
    UnknownProperty {
        stage: String,
        kind: String,
        property: String,
        suggestion: Option<String>,
    },

    #[error("stage '{stage}': invalid value for '{property}': {reason}")]
    InvalidProperty {
        stage: String,
        property: String,
        reason: String,
    },

    #[error("stage name '{0}' is used more than once")]
    DuplicateStageName(String),

    #[error("config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, std::io::Error),

    #[error("config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, toml::de::Error),

    #[error("config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("config validation failed:{}", bullet_list(.0))]
    Validation(Vec<String>),
}

// ============================================================================
// Stage operations
// ============================================================================

/// Rejected `set_property` call.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PropertyError {
    #[error("unknown property '{0}'")]
    Unknown(String),

    #[error("property '{name}' expects {expected}, got {got}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
        got: &'static str,
    },

    #[error("property '{name}': {reason}")]
    Invalid { name: String, reason: String },
}

/// Error returned by a stage while changing state or moving frames.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StageError {
    #[error("{message}")]
    Flow {
        message: String,
        debug: Option<String>,
    },

    #[error("not negotiated: {0}")]
    NotNegotiated(String),

    #[error("state change failed: {0}")]
    StateChange(String),

    #[error(transparent)]
    Property(#[from] PropertyError),
}

impl StageError {
    pub fn flow(message: impl Into<String>) -> Self {
        StageError::Flow {
            message: message.into(),
            debug: None,
        }
    }

    /// Attach the stage name to produce a bus-ready failure record.
    pub fn into_failure(self, stage: &str) -> StageFailure {
        match self {
            StageError::Flow { message, debug } => StageFailure {
                stage: stage.to_string(),
                message,
                debug,
            },
            other => StageFailure::new(stage, other.to_string()),
        }
    }
}

// ============================================================================
// Graph construction
// ============================================================================

/// One or more stage factories failed; lists every failing stage.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("failed to construct {} stage(s):{}", .failures.len(), bullet_list(.failures))]
pub struct ConstructionError {
    pub failures: Vec<StageFailure>,
}

impl ConstructionError {
    pub fn failed_stages(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.stage.as_str()).collect()
    }
}

/// Two adjacent stages refused to connect.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "cannot link stage #{upstream_index} '{upstream}' to stage #{downstream_index} '{downstream}': {reason}"
)]
pub struct LinkError {
    pub upstream_index: usize,
    pub upstream: String,
    pub downstream_index: usize,
    pub downstream: String,
    pub reason: String,
}

impl LinkError {
    pub const fn pair(&self) -> (usize, usize) {
        (self.upstream_index, self.downstream_index)
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// The pipeline did not reach the requested state.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error(
    "pipeline failed to go from {from} to {to} (stages: {}){}",
    .failed_stages.join(", "),
    bullet_list(.causes)
)]
pub struct TransitionError {
    pub from: LifecycleState,
    pub to: LifecycleState,
    /// Stages that did not acknowledge the transition
    pub failed_stages: Vec<String>,
    /// Error detail drained from the bus after the failure
    pub causes: Vec<StageFailure>,
}

// ============================================================================
// Umbrella
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error("invalid topology: {0}")]
    Topology(String),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("runtime error from {0}")]
    Runtime(StageFailure),

    #[error("pipeline is stopped and cannot be restarted")]
    Terminated,
}

impl PipelineError {
    /// Stage the error is attributed to, when there is exactly one.
    pub fn stage(&self) -> Option<&str> {
        match self {
            PipelineError::Runtime(failure) => Some(failure.stage.as_str()),
            PipelineError::Construction(e) if e.failures.len() == 1 => {
                Some(e.failures[0].stage.as_str())
            }
            PipelineError::Transition(e) => e
                .causes
                .first()
                .map(|c| c.stage.as_str())
                .or_else(|| e.failed_stages.first().map(String::as_str)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_construction_error_lists_every_stage() {
        let err = ConstructionError {
            failures: vec![
                StageFailure::new("converter1", "no factory for kind 'bogus'"),
                StageFailure::new("sink", "no factory for kind 'other'"),
            ],
        };
        assert_eq!(err.failed_stages(), vec!["converter1", "sink"]);
        let text = err.to_string();
        assert!(text.contains("2 stage(s)"));
        assert!(text.contains("converter1"));
        assert!(text.contains("sink"));
    }

    #[test]
    fn test_unknown_property_suggestion() {
        let err = ConfigError::UnknownProperty {
            stage: "analysis".to_string(),
            kind: "vision-analysis".to_string(),
            property: "temprature".to_string(),
            suggestion: Some("temperature".to_string()),
        };
        assert!(err.to_string().ends_with("(did you mean 'temperature'?)"));
    }

    #[test]
    fn test_flow_error_keeps_debug() {
        let failure = StageError::Flow {
            message: "read failed".to_string(),
            debug: Some("frame 3".to_string()),
        }
        .into_failure("source");
        assert_eq!(failure.stage, "source");
        assert_eq!(failure.debug.as_deref(), Some("frame 3"));
    }

    #[test]
    fn test_runtime_error_attribution() {
        let err = PipelineError::Runtime(StageFailure::new("source", "boom"));
        assert_eq!(err.stage(), Some("source"));
        assert!(err.to_string().contains("[source] boom"));
    }
}
