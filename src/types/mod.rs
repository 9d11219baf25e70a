//! Shared data structures for the video pipeline
//!
//! - FrameTimestamp: nanosecond presentation time and its rendering
//! - Frame / VideoFormat / FormatSet: what moves between stages
//! - LifecycleState / StateTransition: the pipeline-wide run state
//! - BusMessage / StageFailure: asynchronous health notifications
//! - AnalysisResult / GenerationConfig: out-of-band descriptions

mod analysis;
mod frame;
mod message;
mod state;
mod timestamp;

pub use analysis::*;
pub use frame::*;
pub use message::*;
pub use state::*;
pub use timestamp::*;
