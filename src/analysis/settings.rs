//! Configuration of the vision analysis stage.

use crate::error::PropertyError;
use crate::stage::{check_property, PropertyKind, PropertySpec, PropertyValue};
use crate::types::GenerationConfig;
use std::time::Duration;

pub const DEFAULT_PROMPT: &str = "Describe what you see in this image";
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_INTERVAL_SECS: f64 = 5.0;

pub const ANALYSIS_PROPERTIES: &[PropertySpec] = &[
    PropertySpec::new("api-key", PropertyKind::String, "Credential for the vision API"),
    PropertySpec::new("prompt", PropertyKind::String, "Instruction sent with each frame"),
    PropertySpec::new("model-name", PropertyKind::String, "Vision model to query"),
    PropertySpec::new(
        "analysis-interval",
        PropertyKind::Float { min: 0.1, max: 3600.0 },
        "Seconds of frame time between analyses",
    ),
    PropertySpec::new(
        "output-metadata",
        PropertyKind::Bool,
        "Attach descriptions to frames instead of publishing results",
    ),
    PropertySpec::new(
        "stop-sequences",
        PropertyKind::StringList,
        "Sequences that end generation",
    ),
    PropertySpec::new(
        "temperature",
        PropertyKind::Float { min: 0.0, max: 2.0 },
        "Sampling temperature",
    ),
    PropertySpec::new(
        "max-output-tokens",
        PropertyKind::Int { min: 1, max: i32::MAX as i64 },
        "Upper bound on generated tokens",
    ),
    PropertySpec::new(
        "top-p",
        PropertyKind::Float { min: 0.0, max: 1.0 },
        "Nucleus sampling mass",
    ),
    PropertySpec::new("top-k", PropertyKind::Int { min: 1, max: 40 }, "Top-k sampling"),
];

/// Typed view of the analysis stage's properties.
#[derive(Clone, PartialEq)]
pub struct AnalysisSettings {
    pub api_key: String,
    pub prompt: String,
    pub model_name: String,
    /// Minimum frame-time gap between two analyzed frames
    pub interval: Duration,
    /// Attach descriptions to frame metadata rather than publishing them
    pub output_metadata: bool,
    pub generation: GenerationConfig,
}

impl Default for AnalysisSettings {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            prompt: DEFAULT_PROMPT.to_string(),
            model_name: DEFAULT_MODEL.to_string(),
            interval: Duration::from_secs_f64(DEFAULT_INTERVAL_SECS),
            output_metadata: true,
            generation: GenerationConfig::default(),
        }
    }
}

impl AnalysisSettings {
    /// Apply one property after checking it against [`ANALYSIS_PROPERTIES`].
    pub fn apply(&mut self, name: &str, value: &PropertyValue) -> Result<(), PropertyError> {
        check_property(ANALYSIS_PROPERTIES, name, value)?;
        match name {
            "api-key" => self.api_key = value.expect_str(name)?.to_string(),
            "prompt" => self.prompt = value.expect_str(name)?.to_string(),
            "model-name" => self.model_name = value.expect_str(name)?.to_string(),
            "analysis-interval" => {
                self.interval = Duration::from_secs_f64(value.expect_f64(name)?);
            }
            "output-metadata" => self.output_metadata = value.expect_bool(name)?,
            "stop-sequences" => {
                self.generation.stop_sequences = value.expect_list(name)?.iter().cloned().collect();
            }
            "temperature" => self.generation.temperature = value.expect_f64(name)?,
            "max-output-tokens" => {
                self.generation.max_output_tokens = value.expect_i64(name)? as u32;
            }
            "top-p" => self.generation.top_p = value.expect_f64(name)?,
            "top-k" => self.generation.top_k = value.expect_i64(name)? as u32,
            _ => return Err(PropertyError::Unknown(name.to_string())),
        }
        Ok(())
    }

    pub fn has_credential(&self) -> bool {
        !self.api_key.trim().is_empty()
    }
}

impl std::fmt::Debug for AnalysisSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisSettings")
            .field("api_key", &if self.has_credential() { "<set>" } else { "<unset>" })
            .field("prompt", &self.prompt)
            .field("model_name", &self.model_name)
            .field("interval", &self.interval)
            .field("output_metadata", &self.output_metadata)
            .field("generation", &self.generation)
            .finish()
    }
}
