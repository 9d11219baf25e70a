//! The seam between the analysis stage and whatever produces descriptions.
//!
//! A network client for a hosted vision model implements [`Describer`]
//! outside this crate. The two implementations here are offline.

use crate::types::{Frame, GenerationConfig, VideoFormat};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::debug;

/// Everything needed to describe one sampled frame.
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub frame: Frame,
    pub prompt: String,
    pub model_name: String,
    pub api_key: String,
    pub generation: GenerationConfig,
}

/// Produces a description string for a frame.
#[async_trait]
pub trait Describer: Send + Sync {
    async fn describe(&self, request: &AnalysisRequest) -> anyhow::Result<String>;
}

// ============================================================================
// Frame Summary
// ============================================================================

fn colour_name((r, g, b): (u8, u8, u8)) -> &'static str {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max < 16 {
        return "black";
    }
    if min > 215 {
        return "white";
    }
    if max - min < 24 {
        return "grey";
    }
    let (r, g, b) = (u16::from(r), u16::from(g), u16::from(b));
    if r * 2 > (g + b) * 3 && r > g && r > b {
        "red"
    } else if g * 2 > (r + b) * 3 && g > r && g > b {
        "green"
    } else if b * 2 > (r + g) * 3 && b > r && b > g {
        "blue"
    } else {
        "mixed colours"
    }
}

/// Describes a frame from its geometry and average colour.
#[derive(Debug, Default, Clone, Copy)]
pub struct FrameSummaryDescriber;

#[async_trait]
impl Describer for FrameSummaryDescriber {
    async fn describe(&self, request: &AnalysisRequest) -> anyhow::Result<String> {
        let frame = &request.frame;
        debug!(
            model = %request.model_name,
            pts = %frame.pts,
            generation = %request.generation.to_json(),
            "Summarising frame"
        );
        if frame.format == VideoFormat::Jpeg {
            return Ok(format!(
                "A {}x{} JPEG image of {} bytes.",
                frame.width,
                frame.height,
                frame.data.len()
            ));
        }
        let mean = frame
            .mean_rgb()
            .ok_or_else(|| anyhow::anyhow!("frame at {} has no pixel data", frame.pts))?;
        Ok(format!(
            "A {}x{} frame dominated by {}.",
            frame.width,
            frame.height,
            colour_name(mean)
        ))
    }
}

// ============================================================================
// Fixed
// ============================================================================

/// Returns the same description for every frame and counts calls.
#[derive(Debug)]
pub struct FixedDescriber {
    text: String,
    calls: AtomicUsize,
}

impl FixedDescriber {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Describer for FixedDescriber {
    async fn describe(&self, _request: &AnalysisRequest) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        Ok(self.text.clone())
    }
}
