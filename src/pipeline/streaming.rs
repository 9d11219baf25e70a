//! Streaming driver: moves frames from the source to the sink while the
//! pipeline is `Playing`.
//!
//! The stage lock is held only while a frame is being pulled or pushed, never
//! across an await, so the lifecycle controller can always get in between
//! two frames.

use super::BusHandle;
use crate::stage::{Flow, Stage};
use crate::types::{BusMessage, Frame, FrameTimestamp, StageFailure};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub(crate) type SharedStages = Arc<Mutex<Vec<Box<dyn Stage>>>>;

pub(crate) fn lock_stages(stages: &SharedStages) -> MutexGuard<'_, Vec<Box<dyn Stage>>> {
    match stages.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Stage lock poisoned, recovering");
            poisoned.into_inner()
        }
    }
}

enum Pulled {
    Frame { frame: Frame, live: bool },
    Eos,
    Failed(StageFailure),
}

enum Pushed {
    Delivered,
    Eos,
    Failed(StageFailure),
}

fn pull_one(stages: &mut [Box<dyn Stage>]) -> Pulled {
    let Some(source) = stages.first_mut() else {
        return Pulled::Eos;
    };
    match source.pull() {
        Ok(Flow::Frame(frame)) => Pulled::Frame {
            frame,
            live: source.is_live(),
        },
        Ok(Flow::Eos) => Pulled::Eos,
        Ok(Flow::Consumed) => Pulled::Failed(StageFailure::new(
            source.name(),
            "source produced no frame",
        )),
        Err(e) => Pulled::Failed(e.into_failure(source.name())),
    }
}

fn push_through(stages: &mut [Box<dyn Stage>], frame: Frame) -> Pushed {
    let mut current = frame;
    for stage in stages.iter_mut().skip(1) {
        match stage.push(current) {
            Ok(Flow::Frame(next)) => current = next,
            Ok(Flow::Consumed) => return Pushed::Delivered,
            Ok(Flow::Eos) => return Pushed::Eos,
            Err(e) => return Pushed::Failed(e.into_failure(stage.name())),
        }
    }
    Pushed::Delivered
}

/// Run until end-of-stream, a stage error, or cancellation.
///
/// End-of-stream and errors are posted to the bus; cancellation is silent.
pub(crate) async fn run_streaming(stages: SharedStages, bus: BusHandle, cancel: CancellationToken) {
    // Wall-clock anchor for live pacing: (start instant, first pts)
    let mut clock: Option<(Instant, FrameTimestamp)> = None;
    let mut frames: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            debug!(frames, "Streaming cancelled");
            return;
        }

        let pulled = pull_one(&mut lock_stages(&stages));
        let frame = match pulled {
            Pulled::Frame { frame, live } => {
                if live {
                    let (start, first) = *clock.get_or_insert_with(|| (Instant::now(), frame.pts));
                    let deadline = start + frame.pts.saturating_since(first);
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => {
                            debug!(frames, "Streaming cancelled while pacing");
                            return;
                        }
                        () = tokio::time::sleep_until(deadline) => {}
                    }
                } else {
                    tokio::task::yield_now().await;
                }
                frame
            }
            Pulled::Eos => {
                info!(frames, "Source reached end of stream");
                bus.post(BusMessage::EndOfStream);
                return;
            }
            Pulled::Failed(failure) => {
                error!(stage = %failure.stage, error = %failure.message, "Source failed");
                bus.post(BusMessage::Error(failure));
                return;
            }
        };

        if cancel.is_cancelled() {
            return;
        }
        let pts = frame.pts;
        let pushed = push_through(&mut lock_stages(&stages), frame);
        match pushed {
            Pushed::Delivered => {
                frames += 1;
                debug!(%pts, frames, "Frame delivered");
            }
            Pushed::Eos => {
                info!(frames, "Downstream stage reached end of stream");
                bus.post(BusMessage::EndOfStream);
                return;
            }
            Pushed::Failed(failure) => {
                error!(stage = %failure.stage, error = %failure.message, %pts, "Stage failed while streaming");
                bus.post(BusMessage::Error(failure));
                return;
            }
        }
    }
}
