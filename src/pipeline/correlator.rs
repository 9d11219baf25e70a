//! Analysis correlator.
//!
//! Receives analysis results on a channel separate from the frame path and
//! hands each one, with its rendered timestamp, to the registered observer.
//! Delivery runs on its own task so a slow observer never holds up frames.
//!
//! Results already queued when a stop is requested are still delivered.
//! After that the channel is closed, and a result the analysis stage tries to
//! send fails on its side and is logged there as dropped.

use crate::types::{AnalysisResult, FrameTimestamp};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Sending side handed to stages that publish results.
pub type AnalysisResultSender = mpsc::UnboundedSender<AnalysisResult>;

/// What the observer sees for each result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisDelivery {
    pub description: String,
    pub source_timestamp: FrameTimestamp,
    /// `seconds.nanoseconds`, fraction zero-padded to 9 digits
    pub rendered_timestamp: String,
}

/// Receives each analysis result exactly once.
pub trait AnalysisObserver: Send + 'static {
    fn on_analysis_result(&mut self, delivery: &AnalysisDelivery);
}

impl<F> AnalysisObserver for F
where
    F: FnMut(&AnalysisDelivery) + Send + 'static,
{
    fn on_analysis_result(&mut self, delivery: &AnalysisDelivery) {
        self(delivery);
    }
}

/// Observer that just logs each description.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingObserver;

impl AnalysisObserver for LoggingObserver {
    fn on_analysis_result(&mut self, delivery: &AnalysisDelivery) {
        info!(
            pts = %delivery.rendered_timestamp,
            "Description: {}",
            delivery.description
        );
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CorrelatorStats {
    pub delivered: u64,
    /// Highest source timestamp delivered so far
    pub latest: Option<FrameTimestamp>,
}

pub struct AnalysisCorrelator<O: AnalysisObserver> {
    observer: O,
    results: mpsc::UnboundedReceiver<AnalysisResult>,
    shutdown: CancellationToken,
    stats: CorrelatorStats,
}

impl<O: AnalysisObserver> AnalysisCorrelator<O> {
    /// Create a correlator and the sender stages publish on.
    pub fn new(observer: O, shutdown: CancellationToken) -> (Self, AnalysisResultSender) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                observer,
                results: rx,
                shutdown,
                stats: CorrelatorStats::default(),
            },
            tx,
        )
    }

    /// Deliver one result to the observer.
    pub fn on_analysis_result(&mut self, result: AnalysisResult) {
        let delivery = AnalysisDelivery {
            rendered_timestamp: result.source_timestamp.render(),
            source_timestamp: result.source_timestamp,
            description: result.description,
        };
        debug!(pts = %delivery.rendered_timestamp, "Delivering analysis result");
        self.observer.on_analysis_result(&delivery);
        self.stats.delivered += 1;
        self.stats.latest = self.stats.latest.max(Some(delivery.source_timestamp));
    }

    /// Deliver results until a stop is requested, then deliver the backlog.
    pub async fn run(mut self) -> CorrelatorStats {
        loop {
            tokio::select! {
                biased;
                result = self.results.recv() => match result {
                    Some(result) => self.on_analysis_result(result),
                    None => return self.stats,
                },
                _ = self.shutdown.cancelled() => break,
            }
        }

        self.results.close();
        while let Some(result) = self.results.recv().await {
            self.on_analysis_result(result);
        }
        debug!(delivered = self.stats.delivered, "Correlator finished");
        self.stats
    }

    pub fn spawn(self) -> JoinHandle<CorrelatorStats> {
        tokio::spawn(self.run())
    }
}
