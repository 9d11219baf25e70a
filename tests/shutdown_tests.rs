//! Shutdown Path Tests
//!
//! Drives the bus monitor and interrupt handler against a real controller
//! with a hand-fed bus: errors raised while the pipeline is being torn down
//! must still reach the outcome, and an interrupt racing a normal stop must
//! tear the pipeline down exactly once.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use vision_pipeline::error::{PropertyError, StageError};
use vision_pipeline::pipeline::{
    Bus, BusReceiver, EventBusMonitor, InterruptHandler, LifecycleController, PipelineBuilder,
    PipelineOutcome,
};
use vision_pipeline::stage::{
    builtin, Flow, Ports, PropertySpec, PropertyValue, Stage, StageContext, StageFactory,
    StageSpec,
};
use vision_pipeline::types::{
    BusMessage, FormatSet, Frame, LifecycleState, StageFailure, StateTransition,
};

// ============================================================================
// Helpers
// ============================================================================

/// Sink that counts teardowns and can post an error while flushing.
struct FlushingSink {
    name: String,
    fail_on_flush: bool,
    teardowns: Arc<AtomicUsize>,
}

impl Stage for FlushingSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        "flushing-sink"
    }

    fn ports(&self) -> Ports {
        Ports::sink(FormatSet::ANY)
    }

    fn set_property(&mut self, name: &str, _value: &PropertyValue) -> Result<(), PropertyError> {
        Err(PropertyError::Unknown(name.to_string()))
    }

    fn change_state(
        &mut self,
        transition: StateTransition,
        ctx: &StageContext,
    ) -> Result<(), StageError> {
        match (transition.from, transition.to) {
            (LifecycleState::Paused, LifecycleState::Ready) if self.fail_on_flush => {
                ctx.bus.post(BusMessage::Error(StageFailure::new(
                    &self.name,
                    "flush failed",
                )));
            }
            (_, LifecycleState::Stopped) => {
                self.teardowns.fetch_add(1, Ordering::SeqCst);
            }
            _ => {}
        }
        Ok(())
    }

    fn push(&mut self, _frame: Frame) -> Result<Flow, StageError> {
        Ok(Flow::Consumed)
    }
}

struct FlushingSinkFactory {
    fail_on_flush: bool,
    teardowns: Arc<AtomicUsize>,
}

impl StageFactory for FlushingSinkFactory {
    fn property_schema(&self) -> &[PropertySpec] {
        &[]
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(FlushingSink {
            name: name.to_string(),
            fail_on_flush: self.fail_on_flush,
            teardowns: Arc::clone(&self.teardowns),
        }))
    }
}

struct Harness {
    controller: Arc<LifecycleController>,
    bus: BusReceiver,
    teardowns: Arc<AtomicUsize>,
}

/// One-frame source into a flushing sink, already playing.
async fn playing(fail_on_flush: bool) -> Harness {
    let teardowns = Arc::new(AtomicUsize::new(0));
    let mut registry = builtin::registry();
    registry.register(
        "flushing-sink",
        Arc::new(FlushingSinkFactory {
            fail_on_flush,
            teardowns: Arc::clone(&teardowns),
        }),
    );
    let specs = vec![
        StageSpec::new("source", builtin::TEST_SOURCE)
            .with("num-buffers", 1i64)
            .with("width", 8i64)
            .with("height", 8i64),
        StageSpec::new("sink", "flushing-sink"),
    ];
    let pipeline = PipelineBuilder::new("shutdown", &registry)
        .build(&specs)
        .unwrap();

    let (handle, mut bus) = Bus::new();
    let controller = LifecycleController::new(pipeline, handle, CancellationToken::new());
    controller.play(&mut bus).await.unwrap();
    Harness {
        controller,
        bus,
        teardowns,
    }
}

fn pipeline_stopped_count(bus: &mut BusReceiver) -> usize {
    bus.drain_pending()
        .into_iter()
        .filter(|m| {
            matches!(
                m,
                BusMessage::StateChanged { source, new: LifecycleState::Stopped, .. }
                    if source == "pipeline"
            )
        })
        .count()
}

// ============================================================================
// Errors raised between the wait ending and Stopped
// ============================================================================

#[tokio::test]
async fn end_of_stream_without_late_error_stays_clean() {
    let h = playing(false).await;
    let outcome = EventBusMonitor::new(Arc::clone(&h.controller))
        .run(h.bus)
        .await;
    assert_eq!(outcome, PipelineOutcome::EndOfStream);
    assert_eq!(h.controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn error_during_teardown_turns_end_of_stream_into_failure() {
    let h = playing(true).await;
    let outcome = EventBusMonitor::new(Arc::clone(&h.controller))
        .run(h.bus)
        .await;

    let PipelineOutcome::Failed(failure) = outcome else {
        panic!("expected failure, got {outcome}");
    };
    assert_eq!(failure.stage, "sink");
    assert_eq!(failure.message, "flush failed");
    assert_eq!(h.controller.state(), LifecycleState::Stopped);
}

#[tokio::test]
async fn error_during_teardown_turns_interrupt_into_failure() {
    let h = playing(true).await;
    h.controller.shutdown_token().cancel();

    let outcome = EventBusMonitor::new(Arc::clone(&h.controller))
        .run(h.bus)
        .await;
    assert!(
        matches!(outcome, PipelineOutcome::Failed(ref f) if f.stage == "sink"),
        "got {outcome}"
    );
}

// ============================================================================
// Interrupt handling
// ============================================================================

#[tokio::test]
async fn interrupt_handler_disarms_when_already_stopping() {
    let h = playing(false).await;
    h.controller.shutdown_token().cancel();

    let fired = InterruptHandler::new(Arc::clone(&h.controller))
        .run(std::future::ready(()))
        .await;

    assert!(!fired);
    // Disarming never tears anything down itself.
    assert_eq!(h.teardowns.load(Ordering::SeqCst), 0);
    assert_eq!(h.controller.state(), LifecycleState::Playing);
    h.controller.stop().await;
}

#[tokio::test]
async fn interrupt_then_stop_tears_down_once() {
    let mut h = playing(false).await;

    let fired = InterruptHandler::new(Arc::clone(&h.controller))
        .run(std::future::ready(()))
        .await;
    assert!(fired);
    assert!(h.controller.is_stop_requested());
    assert!(!h.controller.stop().await, "teardown already done");

    assert_eq!(h.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline_stopped_count(&mut h.bus), 1);
}

#[tokio::test]
async fn interrupt_racing_stop_tears_down_once() {
    let mut h = playing(false).await;
    let handler = InterruptHandler::new(Arc::clone(&h.controller));

    let (fired, stopped) = tokio::join!(
        handler.run(std::future::ready(())),
        h.controller.stop(),
    );

    // Either the interrupt did the teardown or the plain stop did, never both.
    assert!(fired ^ stopped, "fired={fired} stopped={stopped}");
    assert_eq!(h.teardowns.load(Ordering::SeqCst), 1);
    assert_eq!(pipeline_stopped_count(&mut h.bus), 1);
    assert_eq!(h.controller.state(), LifecycleState::Stopped);
}
