//! Lifecycle controller.
//!
//! Owns the stages of a built pipeline and the single pipeline-wide
//! [`LifecycleState`]. Upward transitions are walked one step at a time
//! (`Idle -> Ready -> Paused -> Playing`), each step applied to every stage
//! from sink to source. A step only counts as done once every stage has
//! acknowledged it.
//!
//! Stopping is idempotent. The first caller cancels the shutdown token,
//! joins the streaming task, walks every stage down to `Stopped` and
//! publishes the final state; later callers see `Stopped` and return.

use super::builder::Pipeline;
use super::streaming::{lock_stages, run_streaming, SharedStages};
use super::{BusHandle, BusReceiver};
use crate::error::{PipelineError, TransitionError};
use crate::stage::StageContext;
use crate::types::{BusMessage, LifecycleState, StageFailure, StateTransition};
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

struct Streaming {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// State guarded by the transition lock.
struct TransitionSlot {
    streaming: Option<Streaming>,
    /// Highest state any stage has been asked to reach
    highest: LifecycleState,
}

/// Drives a pipeline through its states.
pub struct LifecycleController {
    name: String,
    stages: SharedStages,
    state: watch::Sender<LifecycleState>,
    bus: BusHandle,
    shutdown: CancellationToken,
    slot: tokio::sync::Mutex<TransitionSlot>,
}

impl LifecycleController {
    /// Take ownership of a freshly built pipeline.
    ///
    /// `shutdown` is cancelled by the first stop request and is the token the
    /// bus monitor and interrupt handler watch.
    pub fn new(pipeline: Pipeline, bus: BusHandle, shutdown: CancellationToken) -> Arc<Self> {
        let (name, stages) = pipeline.into_parts();
        let (state, _) = watch::channel(LifecycleState::Idle);
        Arc::new(Self {
            name,
            stages: Arc::new(Mutex::new(stages)),
            state,
            bus,
            shutdown,
            slot: tokio::sync::Mutex::new(TransitionSlot {
                streaming: None,
                highest: LifecycleState::Idle,
            }),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current pipeline-wide state.
    pub fn state(&self) -> LifecycleState {
        *self.state.borrow()
    }

    /// Watch state changes. Every published value is a completed transition.
    pub fn subscribe(&self) -> watch::Receiver<LifecycleState> {
        self.state.subscribe()
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_stop_requested(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Move the whole pipeline to `target`, one step at a time.
    ///
    /// Requesting `Stopped` is the same as calling [`stop`](Self::stop).
    /// Downward moves other than to `Stopped` go no lower than `Ready`.
    pub async fn set_state(&self, target: LifecycleState) -> Result<(), PipelineError> {
        if target.is_terminal() {
            self.stop().await;
            return Ok(());
        }

        let mut slot = self.slot.lock().await;
        loop {
            let current = self.state();
            if current.is_terminal() || self.shutdown.is_cancelled() {
                return Err(PipelineError::Terminated);
            }
            if current == target {
                return Ok(());
            }
            let next = if current.is_below(target) {
                current.next_up()
            } else if target == LifecycleState::Idle {
                None
            } else {
                current.next_down()
            };
            let Some(next) = next else {
                return Err(TransitionError {
                    from: current,
                    to: target,
                    failed_stages: Vec::new(),
                    causes: Vec::new(),
                }
                .into());
            };
            self.apply_step(StateTransition::new(current, next), &mut slot)
                .await?;
        }
    }

    /// Go to `Playing`. On failure, pending bus errors are drained into the
    /// returned error so the caller sees what actually went wrong.
    pub async fn play(&self, bus: &mut BusReceiver) -> Result<(), PipelineError> {
        match self.set_state(LifecycleState::Playing).await {
            Ok(()) => Ok(()),
            Err(PipelineError::Transition(mut e)) => {
                for message in bus.drain_pending() {
                    match message {
                        BusMessage::Error(failure) => e.causes.push(failure),
                        BusMessage::EndOfStream => {
                            info!(pipeline = %self.name, "End of stream reached before playing");
                        }
                        other => debug!(pipeline = %self.name, message = %other, "Drained"),
                    }
                }
                for cause in &e.causes {
                    error!(
                        stage = %cause.stage,
                        error = %cause.message,
                        debug = ?cause.debug,
                        "Failed to start pipeline"
                    );
                }
                Err(e.into())
            }
            Err(other) => Err(other),
        }
    }

    /// Stop the pipeline. Safe to call any number of times from any task;
    /// returns `true` only for the call that performed the teardown.
    pub async fn stop(&self) -> bool {
        self.shutdown.cancel();

        let mut slot = self.slot.lock().await;
        let current = self.state();
        if current.is_terminal() {
            debug!(pipeline = %self.name, "Stop requested, already stopped");
            return false;
        }

        Self::stop_streaming(&mut slot).await;

        // Walk down from the highest state any stage was asked to reach, so a
        // stage left ahead by a failed transition is torn down too.
        let mut level = if current.is_below(slot.highest) {
            slot.highest
        } else {
            current
        };
        let ctx = self.context();
        while let Some(next) = level.next_down() {
            let step = StateTransition::new(level, next);
            let mut stages = lock_stages(&self.stages);
            for stage in stages.iter_mut().rev() {
                if let Err(e) = stage.change_state(step, &ctx) {
                    warn!(stage = %stage.name(), %step, error = %e, "Stage failed during teardown");
                }
            }
            level = next;
        }

        self.state.send_replace(LifecycleState::Stopped);
        self.bus.post(BusMessage::pipeline_state_changed(
            current,
            LifecycleState::Stopped,
        ));
        info!(pipeline = %self.name, from = %current, "🛑 Pipeline stopped");
        true
    }

    fn context(&self) -> StageContext {
        StageContext {
            bus: self.bus.clone(),
        }
    }

    async fn apply_step(
        &self,
        step: StateTransition,
        slot: &mut TransitionSlot,
    ) -> Result<(), PipelineError> {
        if slot.highest.is_below(step.to) {
            slot.highest = step.to;
        }
        if step.from == LifecycleState::Playing {
            Self::stop_streaming(slot).await;
        }

        let failures = self.apply_to_stages(step);
        if !failures.is_empty() {
            for failure in &failures {
                self.bus.post(BusMessage::Error(failure.clone()));
            }
            return Err(TransitionError {
                from: step.from,
                to: step.to,
                failed_stages: failures.into_iter().map(|f| f.stage).collect(),
                causes: Vec::new(),
            }
            .into());
        }

        self.state.send_replace(step.to);
        self.bus
            .post(BusMessage::pipeline_state_changed(step.from, step.to));
        info!(pipeline = %self.name, %step, "State changed");

        if step.to == LifecycleState::Playing {
            let cancel = self.shutdown.child_token();
            let handle = tokio::spawn(run_streaming(
                Arc::clone(&self.stages),
                self.bus.clone(),
                cancel.clone(),
            ));
            slot.streaming = Some(Streaming { cancel, handle });
        }
        Ok(())
    }

    /// Apply one step to every stage, sink first. Returns the failures.
    fn apply_to_stages(&self, step: StateTransition) -> Vec<StageFailure> {
        let ctx = self.context();
        let mut failures = Vec::new();
        let mut stages = lock_stages(&self.stages);
        for stage in stages.iter_mut().rev() {
            match stage.change_state(step, &ctx) {
                Ok(()) => {
                    self.bus.post(BusMessage::StateChanged {
                        source: stage.name().to_string(),
                        old: step.from,
                        new: step.to,
                    });
                }
                Err(e) => {
                    let failure = e.into_failure(stage.name());
                    error!(stage = %failure.stage, %step, error = %failure.message, "Stage refused state change");
                    failures.push(failure);
                }
            }
        }
        failures
    }

    async fn stop_streaming(slot: &mut TransitionSlot) {
        if let Some(streaming) = slot.streaming.take() {
            streaming.cancel.cancel();
            if let Err(e) = streaming.handle.await {
                warn!(error = %e, "Streaming task ended abnormally");
            }
        }
    }
}

impl std::fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
