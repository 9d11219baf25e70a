//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Config Loading
// ============================================================================

/// Environment variable holding a path to the pipeline TOML file.
pub const CONFIG_PATH_ENV_VAR: &str = "VISION_PIPELINE_CONFIG";

/// Config file looked up in the current working directory.
pub const LOCAL_CONFIG_FILE: &str = "pipeline.toml";

/// Pipeline name used when the file does not set one.
pub const DEFAULT_PIPELINE_NAME: &str = "vision-pipeline";

// ============================================================================
// Credential
// ============================================================================

/// Environment variable the API credential is read from.
pub const CREDENTIAL_ENV_VAR: &str = "GST_GEMINI_API_KEY";

/// Value shipped in sample environments; treated the same as unset.
pub const PLACEHOLDER_CREDENTIAL: &str = "YOUR_API_KEY_HERE";

// ============================================================================
// Demo Chain
// ============================================================================

/// Seconds between analyzed frames in the demo chain.
pub const DEMO_ANALYSIS_INTERVAL_SECS: f64 = 5.0;

pub const DEMO_TEMPERATURE: f64 = 0.7;

pub const DEMO_MAX_OUTPUT_TOKENS: i64 = 150;

pub const DEMO_TOP_P: f64 = 0.9;

pub const DEMO_TOP_K: i64 = 20;

/// Generation stops at the first of these markers.
pub const DEMO_STOP_SEQUENCES: &[&str] = &["Title", "Conclusion"];
