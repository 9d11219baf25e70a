//! Vision Pipeline: linear video pipeline orchestration
//!
//! Builds a single source → ... → sink chain of stages, drives it through
//! its lifecycle, watches the event bus for errors and end-of-stream, and
//! delivers out-of-band frame descriptions from an analysis stage.
//!
//! ## Architecture
//!
//! - **Stages**: named units with typed properties and capability ports
//! - **Graph Builder**: constructs every stage and links neighbours in order
//! - **Lifecycle Controller**: `Idle → Ready → Paused → Playing`, idempotent stop
//! - **Event Bus Monitor**: turns bus messages into a run outcome
//! - **Analysis Correlator**: hands timestamped descriptions to an observer

pub mod analysis;
pub mod app;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod stage;
pub mod types;

// Re-export configuration
pub use config::PipelineConfig;

// Re-export commonly used types
pub use types::{
    AnalysisResult, BusMessage, Frame, FrameTimestamp, GenerationConfig, LifecycleState,
    StageFailure, VideoFormat,
};

// Re-export errors
pub use error::{
    ConfigError, ConstructionError, LinkError, PipelineError, StageError, TransitionError,
};

// Re-export pipeline components
pub use pipeline::{
    AnalysisCorrelator, AnalysisDelivery, AnalysisObserver, EventBusMonitor, InterruptHandler,
    LifecycleController, Pipeline, PipelineBuilder, PipelineOutcome,
};

// Re-export stage plumbing
pub use stage::{Stage, StageFactory, StageRegistry, StageSpec};

pub use app::{run, RunReport};
