//! Interrupt handler: turns an external interrupt into a graceful stop.

use super::LifecycleController;
use std::future::Future;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Waits for an interrupt and stops the pipeline through the same idempotent
/// path as a normal shutdown.
pub struct InterruptHandler {
    controller: Arc<LifecycleController>,
}

impl InterruptHandler {
    pub fn new(controller: Arc<LifecycleController>) -> Self {
        Self { controller }
    }

    /// Wait for `interrupt`. Returns `true` if the interrupt fired, `false`
    /// if the pipeline began stopping on its own first.
    pub async fn run<F>(self, interrupt: F) -> bool
    where
        F: Future<Output = ()>,
    {
        let shutdown = self.controller.shutdown_token();
        tokio::select! {
            biased;
            _ = shutdown.cancelled() => {
                debug!("Pipeline already stopping, interrupt handler disarmed");
                false
            }
            () = interrupt => {
                info!("🛑 Interrupt received, stopping pipeline");
                self.controller.stop().await;
                // Also ends the bus monitor's wait if it is still blocked.
                shutdown.cancel();
                true
            }
        }
    }

    pub fn spawn<F>(self, interrupt: F) -> JoinHandle<bool>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        tokio::spawn(self.run(interrupt))
    }
}
