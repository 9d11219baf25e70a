//! Pipeline Module
//!
//! ## Run Architecture
//!
//! ```text
//! BUILD:    PipelineBuilder (construct every stage, link neighbours in order)
//! START:    LifecycleController (Idle -> Ready -> Paused -> Playing)
//! STREAM:   streaming task (source pull, push through to the sink)
//! WATCH:    EventBusMonitor (error / end-of-stream / interrupt)
//! RESULTS:  AnalysisCorrelator (analysis results to the observer, off the frame path)
//! STOP:     LifecycleController::stop (idempotent, every stage to Stopped)
//! ```

mod bus;
mod builder;
mod correlator;
mod lifecycle;
mod monitor;
mod signal;
mod streaming;

pub use bus::{Bus, BusHandle, BusReceiver};
pub use builder::{link, Link, Pipeline, PipelineBuilder};
pub use correlator::{
    AnalysisCorrelator, AnalysisDelivery, AnalysisObserver, AnalysisResultSender,
    CorrelatorStats, LoggingObserver,
};
pub use lifecycle::LifecycleController;
pub use monitor::{EventBusMonitor, PipelineOutcome};
pub use signal::InterruptHandler;
