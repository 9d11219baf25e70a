//! Application bootstrap: credential check, graph construction, start,
//! bus monitoring and teardown, ending in an exit code.
//!
//! ```text
//! credential ─► build ─► connect results ─► play ─► monitor ─► stop ─► report
//!                                                     ▲
//!                               interrupt handler ────┘
//! ```

use crate::config::{resolve_credential, PipelineConfig};
use crate::error::PipelineError;
use crate::pipeline::{
    AnalysisCorrelator, AnalysisObserver, Bus, EventBusMonitor, InterruptHandler,
    LifecycleController, PipelineBuilder, PipelineOutcome,
};
use crate::stage::StageRegistry;
use crate::types::LifecycleState;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Exit code for command-line and config-file errors.
pub const EXIT_USAGE: u8 = 2;

/// Exit code for every fatal runtime or startup condition.
pub const EXIT_FAILURE: u8 = 1;

/// Summary of one completed run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub pipeline: String,
    pub outcome: PipelineOutcome,
    /// Analysis results handed to the observer
    pub delivered: u64,
    /// Always `Stopped` once a run has been torn down
    pub final_state: LifecycleState,
}

impl RunReport {
    pub const fn exit_code(&self) -> u8 {
        self.outcome.exit_code()
    }
}

/// Run a pipeline to completion.
///
/// `env` resolves the credential variable and is consulted before any stage
/// is built. `interrupt` resolving requests a graceful stop.
pub async fn run<E, O, F>(
    config: &PipelineConfig,
    registry: &StageRegistry,
    env: E,
    observer: O,
    interrupt: F,
) -> Result<RunReport, PipelineError>
where
    E: Fn(&str) -> Option<String>,
    O: AnalysisObserver,
    F: Future<Output = ()> + Send + 'static,
{
    // Phase 1: credential, before anything is constructed
    let api_key = resolve_credential(env).inspect_err(|e| {
        error!(error = %e, "Startup configuration error");
    })?;

    // Phase 2: build and link
    let name = config.pipeline.name.clone();
    let specs = config.stage_specs_with_credential(&api_key);
    let mut pipeline = PipelineBuilder::new(name.clone(), registry)
        .build(&specs)
        .inspect_err(|e| error!(pipeline = %name, error = %e, "Failed to build pipeline"))?;
    info!(pipeline = %name, stages = ?pipeline.stage_names(), "🔗 Pipeline built");

    // Phase 3: result channel, bus, controller, interrupt handler
    let shutdown = CancellationToken::new();
    let (correlator, results) = AnalysisCorrelator::new(observer, shutdown.clone());
    let connected = pipeline.connect_analysis(&results);
    drop(results);
    if connected == 0 {
        info!(pipeline = %name, "No stage publishes analysis results by callback");
    }
    let correlator = correlator.spawn();

    let (bus, mut bus_rx) = Bus::new();
    let controller = LifecycleController::new(pipeline, bus, shutdown);
    let interrupt = InterruptHandler::new(Arc::clone(&controller)).spawn(interrupt);

    // Phase 4: start
    let started = controller.play(&mut bus_rx).await;

    // Phase 5: wait for the run to end
    let outcome = match started {
        Ok(()) => {
            info!(pipeline = %name, "▶️  Pipeline playing");
            Ok(EventBusMonitor::new(Arc::clone(&controller))
                .run(bus_rx)
                .await)
        }
        Err(PipelineError::Terminated) => {
            // Stopped by an interrupt while starting up.
            controller.stop().await;
            Ok(PipelineOutcome::Interrupted)
        }
        Err(e) => {
            controller.stop().await;
            Err(e)
        }
    };

    // Phase 6: teardown. The controller cancelled the shutdown token on
    // stop, which disarms the interrupt handler and drains the correlator.
    if let Err(e) = interrupt.await {
        warn!(error = %e, "Interrupt handler ended abnormally");
    }
    let delivered = match correlator.await {
        Ok(stats) => stats.delivered,
        Err(e) => {
            warn!(error = %e, "Analysis correlator ended abnormally");
            0
        }
    };

    let outcome = outcome?;
    let report = RunReport {
        pipeline: name,
        outcome,
        delivered,
        final_state: controller.state(),
    };
    info!(
        pipeline = %report.pipeline,
        outcome = %report.outcome,
        delivered = report.delivered,
        exit_code = report.exit_code(),
        "Run complete"
    );
    Ok(report)
}
