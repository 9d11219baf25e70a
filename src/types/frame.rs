//! Video frames and the formats stages negotiate over.

use super::FrameTimestamp;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Video Formats
// ============================================================================

/// Pixel layout of a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoFormat {
    /// Packed 8-bit RGB
    Rgb,
    /// Packed 8-bit RGBA
    Rgba,
    /// 8-bit luma
    Gray8,
    /// Encoded JPEG image
    Jpeg,
}

impl VideoFormat {
    /// Bytes per pixel for raw formats; `None` for encoded payloads.
    pub const fn bytes_per_pixel(self) -> Option<usize> {
        match self {
            VideoFormat::Rgb => Some(3),
            VideoFormat::Rgba => Some(4),
            VideoFormat::Gray8 => Some(1),
            VideoFormat::Jpeg => None,
        }
    }

    pub const fn is_raw(self) -> bool {
        self.bytes_per_pixel().is_some()
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            VideoFormat::Rgb => "rgb",
            VideoFormat::Rgba => "rgba",
            VideoFormat::Gray8 => "gray8",
            VideoFormat::Jpeg => "jpeg",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "rgb" => Some(VideoFormat::Rgb),
            "rgba" => Some(VideoFormat::Rgba),
            "gray8" | "gray" => Some(VideoFormat::Gray8),
            "jpeg" | "jpg" => Some(VideoFormat::Jpeg),
            _ => None,
        }
    }
}

impl std::fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A set of formats a port can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatSet(&'static [VideoFormat]);

impl FormatSet {
    pub const RAW: Self = Self(&[VideoFormat::Rgb, VideoFormat::Rgba, VideoFormat::Gray8]);
    pub const ANY: Self = Self(&[
        VideoFormat::Rgb,
        VideoFormat::Rgba,
        VideoFormat::Gray8,
        VideoFormat::Jpeg,
    ]);

    pub const fn new(formats: &'static [VideoFormat]) -> Self {
        Self(formats)
    }

    pub fn contains(&self, format: VideoFormat) -> bool {
        self.0.contains(&format)
    }

    pub fn intersects(&self, other: &FormatSet) -> bool {
        self.0.iter().any(|f| other.contains(*f))
    }

    pub fn formats(&self) -> &'static [VideoFormat] {
        self.0
    }
}

impl std::fmt::Display for FormatSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|v| v.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}

// ============================================================================
// Frames
// ============================================================================

/// Side-channel data carried alongside the pixels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameMeta {
    /// Description attached by an analysis stage in metadata mode
    pub description: Option<String>,
}

/// One video frame moving through the chain.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Presentation timestamp
    pub pts: FrameTimestamp,
    /// Nominal display duration
    pub duration: Duration,
    pub format: VideoFormat,
    pub width: u32,
    pub height: u32,
    /// Pixel payload (or encoded bytes for JPEG)
    pub data: Vec<u8>,
    pub meta: FrameMeta,
}

impl Frame {
    /// Expected payload length for raw formats.
    pub fn expected_len(&self) -> Option<usize> {
        self.format
            .bytes_per_pixel()
            .map(|bpp| self.width as usize * self.height as usize * bpp)
    }

    /// Mean (r, g, b) over the frame, or `None` for encoded or empty payloads.
    pub fn mean_rgb(&self) -> Option<(u8, u8, u8)> {
        let bpp = self.format.bytes_per_pixel()?;
        let pixels = self.data.len() / bpp;
        if pixels == 0 {
            return None;
        }
        let (mut r, mut g, mut b) = (0u64, 0u64, 0u64);
        for px in self.data.chunks_exact(bpp) {
            match self.format {
                VideoFormat::Gray8 => {
                    r += u64::from(px[0]);
                    g += u64::from(px[0]);
                    b += u64::from(px[0]);
                }
                _ => {
                    r += u64::from(px[0]);
                    g += u64::from(px[1]);
                    b += u64::from(px[2]);
                }
            }
        }
        let n = pixels as u64;
        Some(((r / n) as u8, (g / n) as u8, (b / n) as u8))
    }
}
