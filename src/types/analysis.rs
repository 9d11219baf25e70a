//! Analysis results and the generation parameters sent with each request.

use super::FrameTimestamp;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Description produced for one sampled frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub description: String,
    /// PTS of the frame the description refers to
    pub source_timestamp: FrameTimestamp,
}

impl AnalysisResult {
    pub fn new(description: impl Into<String>, source_timestamp: FrameTimestamp) -> Self {
        Self {
            description: description.into(),
            source_timestamp,
        }
    }
}

// ============================================================================
// Generation Config
// ============================================================================

pub const TEMPERATURE_RANGE: (f64, f64) = (0.0, 2.0);
pub const TOP_P_RANGE: (f64, f64) = (0.0, 1.0);
pub const TOP_K_RANGE: (i64, i64) = (1, 40);

/// Sampling parameters for the external vision model.
///
/// Serializes to the camelCase `generationConfig` object of the request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub stop_sequences: BTreeSet<String>,
    pub temperature: f64,
    pub max_output_tokens: u32,
    pub top_p: f64,
    pub top_k: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            stop_sequences: BTreeSet::new(),
            temperature: 1.0,
            max_output_tokens: 800,
            top_p: 0.8,
            top_k: 10,
        }
    }
}

impl GenerationConfig {
    /// Check every field against its allowed range.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !(TEMPERATURE_RANGE.0..=TEMPERATURE_RANGE.1).contains(&self.temperature) {
            errors.push(format!(
                "temperature ({}) must be within [{}, {}]",
                self.temperature, TEMPERATURE_RANGE.0, TEMPERATURE_RANGE.1
            ));
        }
        if self.max_output_tokens == 0 {
            errors.push("max_output_tokens must be positive".to_string());
        }
        if !(TOP_P_RANGE.0..=TOP_P_RANGE.1).contains(&self.top_p) {
            errors.push(format!(
                "top_p ({}) must be within [{}, {}]",
                self.top_p, TOP_P_RANGE.0, TOP_P_RANGE.1
            ));
        }
        if !(TOP_K_RANGE.0..=TOP_K_RANGE.1).contains(&i64::from(self.top_k)) {
            errors.push(format!(
                "top_k ({}) must be within [{}, {}]",
                self.top_k, TOP_K_RANGE.0, TOP_K_RANGE.1
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
