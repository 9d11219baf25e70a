//! Built-in stages: a synthetic source, a pixel-format converter and a
//! discarding sink, plus the registry that wires them up together with the
//! vision analysis stage.

use super::{
    check_property, Flow, Ports, PropertyKind, PropertySpec, PropertyValue, Stage, StageFactory,
    StageRegistry,
};
use crate::analysis::{FrameSummaryDescriber, VisionAnalysisFactory};
use crate::error::{PropertyError, StageError};
use crate::types::{FormatSet, Frame, FrameMeta, FrameTimestamp, VideoFormat};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub const TEST_SOURCE: &str = "test-source";
pub const VIDEO_CONVERT: &str = "video-convert";
pub const VISION_ANALYSIS: &str = "vision-analysis";
pub const NULL_SINK: &str = "null-sink";

/// Registry with every built-in kind. The analysis stage uses the offline
/// [`FrameSummaryDescriber`].
pub fn registry() -> StageRegistry {
    let mut registry = StageRegistry::new();
    registry.register(TEST_SOURCE, Arc::new(TestSourceFactory));
    registry.register(VIDEO_CONVERT, Arc::new(VideoConvertFactory));
    registry.register(NULL_SINK, Arc::new(NullSinkFactory));
    registry.register(
        VISION_ANALYSIS,
        Arc::new(VisionAnalysisFactory::new(Arc::new(FrameSummaryDescriber))),
    );
    registry
}

// ============================================================================
// Pixel Conversion
// ============================================================================

fn to_rgb(px: &[u8], format: VideoFormat) -> [u8; 3] {
    match format {
        VideoFormat::Gray8 => [px[0], px[0], px[0]],
        _ => [px[0], px[1], px[2]],
    }
}

fn luma(rgb: [u8; 3]) -> u8 {
    let [r, g, b] = rgb.map(u32::from);
    ((77 * r + 150 * g + 29 * b) >> 8) as u8
}

/// Convert a raw pixel buffer between layouts.
pub fn convert_pixels(
    data: &[u8],
    from: VideoFormat,
    to: VideoFormat,
) -> Result<Vec<u8>, StageError> {
    if from == to {
        return Ok(data.to_vec());
    }
    let (Some(from_bpp), Some(to_bpp)) = (from.bytes_per_pixel(), to.bytes_per_pixel()) else {
        return Err(StageError::NotNegotiated(format!(
            "cannot convert {from} to {to}"
        )));
    };

    let mut out = Vec::with_capacity(data.len() / from_bpp * to_bpp);
    for px in data.chunks_exact(from_bpp) {
        let rgb = to_rgb(px, from);
        match to {
            VideoFormat::Gray8 => out.push(luma(rgb)),
            VideoFormat::Rgba => {
                let alpha = if from == VideoFormat::Rgba { px[3] } else { 255 };
                out.extend_from_slice(&[rgb[0], rgb[1], rgb[2], alpha]);
            }
            _ => out.extend_from_slice(&rgb),
        }
    }
    Ok(out)
}

// ============================================================================
// Test Source
// ============================================================================

pub const TEST_SOURCE_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new(
        "pattern",
        PropertyKind::Choice(&["smpte", "black", "white", "red-square", "snow"]),
        "Picture to generate",
    ),
    PropertySpec::new("width", PropertyKind::Int { min: 1, max: 7680 }, "Frame width in pixels"),
    PropertySpec::new("height", PropertyKind::Int { min: 1, max: 4320 }, "Frame height in pixels"),
    PropertySpec::new(
        "framerate",
        PropertyKind::Float { min: 0.01, max: 1000.0 },
        "Frames per second",
    ),
    PropertySpec::new(
        "num-buffers",
        PropertyKind::Int { min: -1, max: i64::MAX },
        "Frames to emit before end-of-stream (-1 = unlimited)",
    ),
    PropertySpec::new("is-live", PropertyKind::Bool, "Pace frames to their timestamps"),
    PropertySpec::new(
        "format",
        PropertyKind::Choice(&["rgb", "rgba", "gray8"]),
        "Output pixel format",
    ),
    PropertySpec::new(
        "timestamp-offset",
        PropertyKind::Int { min: 0, max: i64::MAX },
        "PTS of the first frame in nanoseconds",
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Smpte,
    Black,
    White,
    RedSquare,
    Snow,
}

impl Pattern {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "smpte" => Some(Pattern::Smpte),
            "black" => Some(Pattern::Black),
            "white" => Some(Pattern::White),
            "red-square" => Some(Pattern::RedSquare),
            "snow" => Some(Pattern::Snow),
            _ => None,
        }
    }
}

const RED: [u8; 3] = [255, 0, 0];
const BLACK: [u8; 3] = [0, 0, 0];

const SMPTE_BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

/// Synthetic video source.
#[derive(Debug)]
pub struct TestSource {
    name: String,
    pattern: Pattern,
    width: u32,
    height: u32,
    framerate: f64,
    num_buffers: i64,
    is_live: bool,
    format: VideoFormat,
    timestamp_offset: u64,
    produced: u64,
}

impl TestSource {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            pattern: Pattern::Smpte,
            width: 320,
            height: 240,
            framerate: 30.0,
            num_buffers: -1,
            is_live: false,
            format: VideoFormat::Rgb,
            timestamp_offset: 0,
            produced: 0,
        }
    }

    fn offset_of(&self, index: u64) -> Duration {
        Duration::from_secs_f64(index as f64 / self.framerate)
    }

    fn render_rgb(&self) -> Vec<u8> {
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * 3);
        match self.pattern {
            Pattern::Black => data.resize(w * h * 3, 0),
            Pattern::White => data.resize(w * h * 3, 255),
            Pattern::Smpte => {
                for _ in 0..h {
                    for x in 0..w {
                        data.extend_from_slice(&SMPTE_BARS[x * SMPTE_BARS.len() / w]);
                    }
                }
            }
            Pattern::RedSquare => {
                let side = w.min(h) / 2;
                let (left, top) = ((w - side) / 2, (h - side) / 2);
                for y in 0..h {
                    for x in 0..w {
                        let inside = (left..left + side).contains(&x) && (top..top + side).contains(&y);
                        data.extend_from_slice(if inside { &RED } else { &BLACK });
                    }
                }
            }
            Pattern::Snow => {
                let mut rng = rand::thread_rng();
                for _ in 0..w * h {
                    let v: u8 = rng.gen();
                    data.extend_from_slice(&[v, v, v]);
                }
            }
        }
        data
    }
}

impl Stage for TestSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        TEST_SOURCE
    }

    fn ports(&self) -> Ports {
        Ports::source(FormatSet::RAW)
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        check_property(TEST_SOURCE_PROPERTIES, name, value)?;
        match name {
            "pattern" => {
                self.pattern = Pattern::parse(value.expect_str(name)?).unwrap_or(Pattern::Smpte);
            }
            "width" => self.width = value.expect_i64(name)? as u32,
            "height" => self.height = value.expect_i64(name)? as u32,
            "framerate" => self.framerate = value.expect_f64(name)?,
            "num-buffers" => self.num_buffers = value.expect_i64(name)?,
            "is-live" => self.is_live = value.expect_bool(name)?,
            "format" => {
                self.format = VideoFormat::parse(value.expect_str(name)?).unwrap_or(VideoFormat::Rgb);
            }
            "timestamp-offset" => self.timestamp_offset = value.expect_i64(name)? as u64,
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }

    fn pull(&mut self) -> Result<Flow, StageError> {
        if self.num_buffers >= 0 && self.produced >= self.num_buffers as u64 {
            debug!(stage = %self.name, frames = self.produced, "Test source exhausted");
            return Ok(Flow::Eos);
        }

        let index = self.produced;
        let start = self.offset_of(index);
        let pts = FrameTimestamp::from_nanos(self.timestamp_offset).saturating_add(start);
        let duration = self.offset_of(index + 1).saturating_sub(start);
        let data = convert_pixels(&self.render_rgb(), VideoFormat::Rgb, self.format)?;
        self.produced += 1;

        Ok(Flow::Frame(Frame {
            pts,
            duration,
            format: self.format,
            width: self.width,
            height: self.height,
            data,
            meta: FrameMeta::default(),
        }))
    }

    fn push(&mut self, _frame: Frame) -> Result<Flow, StageError> {
        Err(StageError::NotNegotiated(format!(
            "'{}' has no sink port",
            self.name
        )))
    }

    fn is_live(&self) -> bool {
        self.is_live
    }
}

struct TestSourceFactory;

impl StageFactory for TestSourceFactory {
    fn property_schema(&self) -> &[PropertySpec] {
        TEST_SOURCE_PROPERTIES
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(TestSource::new(name)))
    }
}

// ============================================================================
// Video Convert
// ============================================================================

pub const VIDEO_CONVERT_PROPERTIES: &[PropertySpec] = &[PropertySpec::new(
    "format",
    PropertyKind::Choice(&["rgb", "rgba", "gray8"]),
    "Target pixel format (unset = passthrough)",
)];

/// Converts raw frames to a target layout, or passes them through.
#[derive(Debug)]
pub struct VideoConvert {
    name: String,
    target: Option<VideoFormat>,
}

impl VideoConvert {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            target: None,
        }
    }
}

impl Stage for VideoConvert {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        VIDEO_CONVERT
    }

    fn ports(&self) -> Ports {
        Ports::transform(FormatSet::RAW, FormatSet::RAW)
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        check_property(VIDEO_CONVERT_PROPERTIES, name, value)?;
        self.target = VideoFormat::parse(value.expect_str(name)?);
        Ok(())
    }

    fn push(&mut self, mut frame: Frame) -> Result<Flow, StageError> {
        let Some(target) = self.target.filter(|t| *t != frame.format) else {
            return Ok(Flow::Frame(frame));
        };
        frame.data = convert_pixels(&frame.data, frame.format, target)?;
        frame.format = target;
        Ok(Flow::Frame(frame))
    }
}

struct VideoConvertFactory;

impl StageFactory for VideoConvertFactory {
    fn property_schema(&self) -> &[PropertySpec] {
        VIDEO_CONVERT_PROPERTIES
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(VideoConvert::new(name)))
    }
}

// ============================================================================
// Null Sink
// ============================================================================

pub const NULL_SINK_PROPERTIES: &[PropertySpec] = &[PropertySpec::new(
    "silent",
    PropertyKind::Bool,
    "Suppress per-frame log lines",
)];

/// Discards every frame.
#[derive(Debug)]
pub struct NullSink {
    name: String,
    silent: bool,
    received: u64,
}

impl NullSink {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            silent: true,
            received: 0,
        }
    }

    pub const fn received(&self) -> u64 {
        self.received
    }
}

impl Stage for NullSink {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        NULL_SINK
    }

    fn ports(&self) -> Ports {
        Ports::sink(FormatSet::ANY)
    }

    fn set_property(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        check_property(NULL_SINK_PROPERTIES, name, value)?;
        self.silent = value.expect_bool(name)?;
        Ok(())
    }

    fn push(&mut self, frame: Frame) -> Result<Flow, StageError> {
        self.received += 1;
        if !self.silent {
            info!(
                stage = %self.name,
                pts = %frame.pts,
                format = %frame.format,
                description = ?frame.meta.description,
                "Frame received"
            );
        }
        Ok(Flow::Consumed)
    }
}

struct NullSinkFactory;

impl StageFactory for NullSinkFactory {
    fn property_schema(&self) -> &[PropertySpec] {
        NULL_SINK_PROPERTIES
    }

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError> {
        Ok(Box::new(NullSink::new(name)))
    }
}
