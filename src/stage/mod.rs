//! Stages: the units a pipeline chains together.
//!
//! A stage has at most one frame input (sink port) and at most one frame
//! output (src port). Multi-port stages cannot be expressed, so every graph
//! built from stages is a straight line.
//!
//! Stages are synchronous. The streaming driver calls [`Stage::pull`] on the
//! source and [`Stage::push`] on everything downstream; stages that need
//! background work (the analysis stage) spawn it themselves when they move
//! from `Ready` to `Paused`.

pub mod builtin;
mod properties;
mod registry;

pub use properties::*;
pub use registry::*;

use crate::error::{PropertyError, StageError};
use crate::pipeline::{AnalysisResultSender, BusHandle};
use crate::types::{FormatSet, Frame, StateTransition};

/// Capability ports of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ports {
    /// Formats accepted from upstream; `None` for sources
    pub sink: Option<FormatSet>,
    /// Formats produced downstream; `None` for sinks
    pub src: Option<FormatSet>,
    /// Whether the stage emits out-of-band analysis results
    pub results: bool,
}

impl Ports {
    pub const fn source(src: FormatSet) -> Self {
        Self {
            sink: None,
            src: Some(src),
            results: false,
        }
    }

    pub const fn transform(sink: FormatSet, src: FormatSet) -> Self {
        Self {
            sink: Some(sink),
            src: Some(src),
            results: false,
        }
    }

    pub const fn sink(sink: FormatSet) -> Self {
        Self {
            sink: Some(sink),
            src: None,
            results: false,
        }
    }

    #[must_use]
    pub const fn with_results(mut self) -> Self {
        self.results = true;
        self
    }
}

/// Outcome of moving one frame through a stage.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    /// Frame to hand to the next stage
    Frame(Frame),
    /// Frame was absorbed (sinks, or a stage dropping it)
    Consumed,
    /// No more frames will come from this stage
    Eos,
}

/// Handles a stage may keep while it is running.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub bus: BusHandle,
}

/// One named processing unit in the chain.
pub trait Stage: Send {
    fn name(&self) -> &str;

    /// Registered factory kind this stage was created from.
    fn kind(&self) -> &str;

    fn ports(&self) -> Ports;

    /// Negotiate the link from `upstream`, which offers `offered`.
    ///
    /// The default accepts any upstream whose formats overlap this stage's
    /// sink port.
    fn accept_link(&mut self, upstream: &str, offered: &FormatSet) -> Result<(), String> {
        match self.ports().sink {
            Some(sink) if sink.intersects(offered) => Ok(()),
            Some(sink) => Err(format!(
                "'{upstream}' offers {offered}, '{}' accepts {sink}",
                self.name()
            )),
            None => Err(format!("'{}' has no sink port", self.name())),
        }
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError>;

    /// Apply one step of a state change. Downward steps must tolerate being
    /// called on a stage that never completed the matching upward step.
    fn change_state(
        &mut self,
        _transition: StateTransition,
        _ctx: &StageContext,
    ) -> Result<(), StageError> {
        Ok(())
    }

    /// Produce the next frame. Only called on the first stage.
    fn pull(&mut self) -> Result<Flow, StageError> {
        Err(StageError::NotNegotiated(format!(
            "'{}' cannot produce frames",
            self.name()
        )))
    }

    /// Process one frame from upstream.
    fn push(&mut self, frame: Frame) -> Result<Flow, StageError>;

    /// Whether frames should be paced to their timestamps.
    fn is_live(&self) -> bool {
        false
    }

    /// Route analysis results to `sender`. Returns `false` if this stage
    /// does not publish results by callback.
    fn connect_analysis(&mut self, _sender: AnalysisResultSender) -> bool {
        false
    }
}

impl std::fmt::Debug for dyn Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stage")
            .field("name", &self.name())
            .field("kind", &self.kind())
            .finish()
    }
}
