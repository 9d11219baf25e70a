//! The vision analysis stage.
//!
//! Frames pass straight through. Every `analysis-interval` seconds of frame
//! time (and only while no request is in flight) one frame is copied to a
//! background worker that asks a [`Describer`] for a description. The
//! result is either published to the analysis correlator (callback mode) or
//! attached to every later frame's metadata (metadata mode).

use super::{AnalysisRequest, AnalysisSettings, Describer, ANALYSIS_PROPERTIES};
use crate::error::{PropertyError, StageError};
use crate::pipeline::AnalysisResultSender;
use crate::stage::{
    Flow, Ports, PropertySpec, PropertyValue, Stage, StageContext, StageFactory,
};
use crate::stage::builtin::VISION_ANALYSIS;
use crate::types::{AnalysisResult, FormatSet, Frame, FrameTimestamp, LifecycleState, StateTransition};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared between the stage and its worker.
struct Shared {
    /// Set by `submit`, cleared only by the worker that took the job. Stays
    /// set across a pause while an old worker finishes its call.
    in_flight: AtomicBool,
    /// Latest description, for metadata mode
    pending: Mutex<Option<String>>,
}

impl Shared {
    fn pending(&self) -> Option<String> {
        match self.pending.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_pending(&self, description: String) {
        let mut guard = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Some(description);
    }
}

struct Worker {
    jobs: mpsc::Sender<Frame>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

/// Frame sampler backed by an asynchronous describer.
pub struct VisionAnalysisStage {
    name: String,
    settings: AnalysisSettings,
    describer: Arc<dyn Describer>,
    results: Option<AnalysisResultSender>,
    shared: Arc<Shared>,
    last_analyzed: Option<FrameTimestamp>,
    worker: Option<Worker>,
}

impl VisionAnalysisStage {
    pub fn new(name: &str, describer: Arc<dyn Describer>) -> Self {
        Self {
            name: name.to_string(),
            settings: AnalysisSettings::default(),
            describer,
            results: None,
            shared: Arc::new(Shared {
                in_flight: AtomicBool::new(false),
                pending: Mutex::new(None),
            }),
            last_analyzed: None,
            worker: None,
        }
    }

    pub const fn settings(&self) -> &AnalysisSettings {
        &self.settings
    }

    pub fn is_analysis_in_flight(&self) -> bool {
        self.shared.in_flight.load(Ordering::Acquire)
    }

    fn should_analyze(&self, pts: FrameTimestamp) -> bool {
        if self.is_analysis_in_flight() {
            return false;
        }
        self.last_analyzed
            .map_or(true, |last| pts.saturating_since(last) >= self.settings.interval)
    }

    fn start_worker(&mut self) -> Result<(), StageError> {
        if self.worker.is_some() {
            return Ok(());
        }
        if !self.settings.has_credential() {
            return Err(StageError::StateChange("api-key is not set".to_string()));
        }
        self.settings
            .generation
            .validate()
            .map_err(|errors| StageError::StateChange(errors.join("; ")))?;
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| StageError::StateChange(format!("no async runtime for worker: {e}")))?;

        let (jobs, rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();
        let ctx = WorkerContext {
            stage: self.name.clone(),
            settings: self.settings.clone(),
            describer: Arc::clone(&self.describer),
            results: self.results.clone(),
            shared: Arc::clone(&self.shared),
        };
        let handle = runtime.spawn(run_worker(rx, ctx, cancel.clone()));
        info!(stage = %self.name, model = %self.settings.model_name, "Analysis worker started");

        self.last_analyzed = None;
        self.worker = Some(Worker {
            jobs,
            cancel,
            handle,
        });
        Ok(())
    }

    fn stop_worker(&mut self) {
        if let Some(worker) = self.worker.take() {
            // An in-flight describe call is allowed to finish.
            worker.cancel.cancel();
            drop(worker.jobs);
            drop(worker.handle);
            info!(stage = %self.name, "Analysis worker stopped");
        }
    }

    fn submit(&mut self, frame: &Frame) {
        let Some(ref worker) = self.worker else {
            warn!(stage = %self.name, "Worker not running, skipping analysis");
            return;
        };
        self.shared.in_flight.store(true, Ordering::Release);
        match worker.jobs.try_send(frame.clone()) {
            Ok(()) => {
                self.last_analyzed = Some(frame.pts);
                debug!(stage = %self.name, pts = %frame.pts, "Queued frame for analysis");
            }
            Err(e) => {
                self.shared.in_flight.store(false, Ordering::Release);
                warn!(stage = %self.name, error = %e, "Could not queue frame for analysis");
            }
        }
    }
}

impl Drop for VisionAnalysisStage {
    fn drop(&mut self) {
        if let Some(worker) = self.worker.take() {
            worker.cancel.cancel();
        }
    }
}

impl Stage for VisionAnalysisStage {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        VISION_ANALYSIS
    }

    fn ports(&self) -> Ports {
        Ports::transform(FormatSet::ANY, FormatSet::ANY).with_results()
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        self.settings.apply(name, value)
    }

    fn change_state(
        &mut self,
        transition: StateTransition,
        _ctx: &StageContext,
    ) -> Result<(), StageError> {
        match (transition.from, transition.to) {
            (LifecycleState::Ready, LifecycleState::Paused) => self.start_worker(),
            (LifecycleState::Paused, LifecycleState::Ready) | (_, LifecycleState::Stopped) => {
                self.stop_worker();
                Ok(())
            }
            _ => Ok(()),
        }
    }

    fn push(&mut self, mut frame: Frame) -> Result<Flow, StageError> {
        if self.should_analyze(frame.pts) {
            self.submit(&frame);
        }
        if self.settings.output_metadata {
            if let Some(description) = self.shared.pending() {
                frame.meta.description = Some(description);
            }
        }
        Ok(Flow::Frame(frame))
    }

    fn connect_analysis(&mut self, sender: AnalysisResultSender) -> bool {
        if self.settings.output_metadata {
            return false;
        }
        self.results = Some(sender);
        true
    }
}

// ============================================================================
// Worker
// ============================================================================

struct WorkerContext {
    stage: String,
    settings: AnalysisSettings,
    describer: Arc<dyn Describer>,
    results: Option<AnalysisResultSender>,
    shared: Arc<Shared>,
}

impl WorkerContext {
    fn deliver(&self, description: String, source_timestamp: FrameTimestamp) {
        info!(stage = %self.stage, pts = %source_timestamp, %description, "Received description");
        if self.settings.output_metadata {
            self.shared.set_pending(description);
            return;
        }
        match self.results {
            Some(ref sender) => {
                if sender.send(AnalysisResult::new(description, source_timestamp)).is_err() {
                    warn!(
                        stage = %self.stage,
                        pts = %source_timestamp,
                        "Analysis result dropped: correlator no longer accepting results"
                    );
                }
            }
            None => debug!(stage = %self.stage, "No result observer connected"),
        }
    }
}

async fn run_worker(mut jobs: mpsc::Receiver<Frame>, ctx: WorkerContext, cancel: CancellationToken) {
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = jobs.recv() => match job {
                Some(frame) => frame,
                None => break,
            },
        };

        let pts = frame.pts;
        let request = AnalysisRequest {
            frame,
            prompt: ctx.settings.prompt.clone(),
            model_name: ctx.settings.model_name.clone(),
            api_key: ctx.settings.api_key.clone(),
            generation: ctx.settings.generation.clone(),
        };
        match ctx.describer.describe(&request).await {
            Ok(description) => ctx.deliver(description, pts),
            Err(e) => warn!(stage = %ctx.stage, pts = %pts, error = %e, "Frame analysis failed"),
        }
        ctx.shared.in_flight.store(false, Ordering::Release);
    }
    // A job queued but never taken still holds the in-flight flag.
    jobs.close();
    if let Ok(frame) = jobs.try_recv() {
        debug!(stage = %ctx.stage, pts = %frame.pts, "Discarding queued frame");
        ctx.shared.in_flight.store(false, Ordering::Release);
    }
    debug!(stage = %ctx.stage, "Analysis worker exiting");
}

// ============================================================================
// Factory
// ============================================================================

/// Creates analysis stages sharing one describer.
pub struct VisionAnalysisFactory {
    describer: Arc<dyn Describer>,
}

impl VisionAnalysisFactory {
    pub fn new(describer: Arc<dyn Describer>) -> Self {
        Self { describer }
    }
}

impl StageFactory for VisionAnalysisFactory {
    fn property_schema(&self) -> &[PropertySpec] {
        ANALYSIS_PROPERTIES
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(VisionAnalysisStage::new(name, Arc::clone(&self.describer))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::FixedDescriber;
    use crate::pipeline::Bus;
    use crate::types::{FrameMeta, VideoFormat};
    use std::time::Duration;

    fn frame_at(seconds: f64) -> Frame {
        Frame {
            pts: FrameTimestamp::from_secs_f64(seconds),
            duration: Duration::from_millis(250),
            format: VideoFormat::Rgb,
            width: 1,
            height: 1,
            data: vec![255, 0, 0],
            meta: FrameMeta::default(),
        }
    }

    fn ctx() -> StageContext {
        let (bus, _rx) = Bus::new();
        StageContext { bus }
    }

    fn started(stage: &mut VisionAnalysisStage) {
        let ctx = ctx();
        for (from, to) in [
            (LifecycleState::Idle, LifecycleState::Ready),
            (LifecycleState::Ready, LifecycleState::Paused),
            (LifecycleState::Paused, LifecycleState::Playing),
        ] {
            stage.change_state(StateTransition::new(from, to), &ctx).unwrap();
        }
    }

    #[tokio::test]
    async fn test_start_fails_without_credential() {
        let mut stage = VisionAnalysisStage::new("analysis", Arc::new(FixedDescriber::new("x")));
        let err = stage
            .change_state(
                StateTransition::new(LifecycleState::Ready, LifecycleState::Paused),
                &ctx(),
            )
            .unwrap_err();
        assert!(err.to_string().contains("api-key"));
    }

    #[tokio::test]
    async fn test_callback_mode_samples_by_interval() {
        let describer = Arc::new(FixedDescriber::new("A red square appears."));
        let mut stage = VisionAnalysisStage::new("analysis", describer.clone());
        stage.set_property("api-key", &"key".into()).unwrap();
        stage.set_property("output-metadata", &false.into()).unwrap();
        stage.set_property("analysis-interval", &1.0.into()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(stage.connect_analysis(tx));
        started(&mut stage);

        stage.push(frame_at(2.25)).unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.description, "A red square appears.");
        assert_eq!(first.source_timestamp.render(), "2.250000000");

        // Within the interval: not sampled.
        stage.push(frame_at(2.5)).unwrap();
        tokio::task::yield_now().await;
        assert!(rx.try_recv().is_err());

        stage.push(frame_at(3.25)).unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.source_timestamp.render(), "3.250000000");
        assert_eq!(describer.calls(), 2);
    }

    #[tokio::test]
    async fn test_metadata_mode_attaches_latest_description() {
        let mut stage =
            VisionAnalysisStage::new("analysis", Arc::new(FixedDescriber::new("A red frame.")));
        stage.set_property("api-key", &"key".into()).unwrap();
        let (tx, _rx) = mpsc::unbounded_channel();
        assert!(!stage.connect_analysis(tx));
        started(&mut stage);

        let Flow::Frame(first) = stage.push(frame_at(0.0)).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(first.meta.description, None);

        while stage.is_analysis_in_flight() {
            tokio::task::yield_now().await;
        }
        let Flow::Frame(second) = stage.push(frame_at(0.1)).unwrap() else {
            panic!("expected frame");
        };
        assert_eq!(second.meta.description.as_deref(), Some("A red frame."));
    }

    /// Sleeps on every call and records the peak number of concurrent calls.
    struct SlowDescriber {
        active: std::sync::atomic::AtomicUsize,
        peak: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl Describer for SlowDescriber {
        async fn describe(&self, _request: &AnalysisRequest) -> anyhow::Result<String> {
            let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_secs(10)).await;
            self.active.fetch_sub(1, Ordering::SeqCst);
            Ok("slow".to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_keeps_one_request_in_flight() {
        let describer = Arc::new(SlowDescriber {
            active: 0.into(),
            peak: 0.into(),
        });
        let mut stage = VisionAnalysisStage::new("analysis", describer.clone());
        stage.set_property("api-key", &"key".into()).unwrap();
        stage.set_property("output-metadata", &false.into()).unwrap();
        stage.set_property("analysis-interval", &1.0.into()).unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();
        assert!(stage.connect_analysis(tx));
        started(&mut stage);

        stage.push(frame_at(0.0)).unwrap();
        while describer.active.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let ctx = ctx();
        for (from, to) in [
            (LifecycleState::Playing, LifecycleState::Paused),
            (LifecycleState::Paused, LifecycleState::Ready),
            (LifecycleState::Ready, LifecycleState::Paused),
            (LifecycleState::Paused, LifecycleState::Playing),
        ] {
            stage.change_state(StateTransition::new(from, to), &ctx).unwrap();
        }

        // The first call is still running, so this frame is not sampled.
        assert!(stage.is_analysis_in_flight());
        stage.push(frame_at(0.5)).unwrap();
        tokio::task::yield_now().await;
        assert_eq!(describer.peak.load(Ordering::SeqCst), 1);

        // The old call finishes and releases the flag for the new worker.
        let first = rx.recv().await.unwrap();
        assert_eq!(first.source_timestamp.render(), "0.000000000");
        assert!(!stage.is_analysis_in_flight());

        stage.push(frame_at(1.0)).unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.source_timestamp.render(), "1.000000000");
        assert_eq!(describer.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_stop_clears_worker() {
        let mut stage = VisionAnalysisStage::new("analysis", Arc::new(FixedDescriber::new("x")));
        stage.set_property("api-key", &"key".into()).unwrap();
        started(&mut stage);
        stage
            .change_state(
                StateTransition::new(LifecycleState::Ready, LifecycleState::Stopped),
                &ctx(),
            )
            .unwrap();
        assert!(stage.worker.is_none());
        // Downward steps are safe to repeat.
        stage
            .change_state(
                StateTransition::new(LifecycleState::Ready, LifecycleState::Stopped),
                &ctx(),
            )
            .unwrap();
    }
}
