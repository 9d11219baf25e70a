//! Pipeline Configuration - the ordered stage chain as a TOML file
//!
//! ```toml
//! [pipeline]
//! name = "vision-demo"
//!
//! [[stages]]
//! name = "source"
//! kind = "test-source"
//! [stages.properties]
//! is-live = true
//! ```
//!
//! With no file present the built-in demo chain is used, so the binary runs
//! out of the box given a credential.

use super::defaults::{
    CONFIG_PATH_ENV_VAR, DEFAULT_PIPELINE_NAME, DEMO_ANALYSIS_INTERVAL_SECS,
    DEMO_MAX_OUTPUT_TOKENS, DEMO_STOP_SEQUENCES, DEMO_TEMPERATURE, DEMO_TOP_K, DEMO_TOP_P,
    LOCAL_CONFIG_FILE,
};
use crate::error::ConfigError;
use crate::stage::{builtin, PropertyValue, StageSpec};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

// ============================================================================
// Config Source
// ============================================================================

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    /// `--config` on the command line
    CommandLine(PathBuf),
    /// The `VISION_PIPELINE_CONFIG` environment variable
    Environment(PathBuf),
    /// `./pipeline.toml`
    LocalFile(PathBuf),
    /// Nothing found; the demo chain
    BuiltIn,
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigSource::CommandLine(p) => write!(f, "--config {}", p.display()),
            ConfigSource::Environment(p) => write!(f, "{CONFIG_PATH_ENV_VAR}={}", p.display()),
            ConfigSource::LocalFile(p) => write!(f, "{}", p.display()),
            ConfigSource::BuiltIn => write!(f, "built-in demo chain"),
        }
    }
}

// ============================================================================
// Top-Level Config
// ============================================================================

/// Pipeline identification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineInfo {
    #[serde(default = "default_pipeline_name")]
    pub name: String,
}

fn default_pipeline_name() -> String {
    DEFAULT_PIPELINE_NAME.to_string()
}

impl Default for PipelineInfo {
    fn default() -> Self {
        Self {
            name: default_pipeline_name(),
        }
    }
}

/// Root configuration: a named, ordered chain of stages.
///
/// Load with `PipelineConfig::load()` which searches:
/// 1. `--config <path>`
/// 2. `$VISION_PIPELINE_CONFIG`
/// 3. `./pipeline.toml`
/// 4. Built-in demo chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub pipeline: PipelineInfo,

    /// Source first, sink last
    #[serde(default)]
    pub stages: Vec<StageSpec>,
}

impl Default for PipelineConfig {
    /// The five-stage demo chain: a live test pattern through a converter,
    /// the analysis stage in callback mode, a second converter and a sink.
    fn default() -> Self {
        let stop_sequences: Vec<String> =
            DEMO_STOP_SEQUENCES.iter().map(|s| (*s).to_string()).collect();
        Self {
            pipeline: PipelineInfo::default(),
            stages: vec![
                StageSpec::new("source", builtin::TEST_SOURCE).with("is-live", true),
                StageSpec::new("converter1", builtin::VIDEO_CONVERT),
                StageSpec::new("analysis", builtin::VISION_ANALYSIS)
                    .with("analysis-interval", DEMO_ANALYSIS_INTERVAL_SECS)
                    .with("output-metadata", false)
                    .with("stop-sequences", PropertyValue::List(stop_sequences))
                    .with("temperature", DEMO_TEMPERATURE)
                    .with("max-output-tokens", DEMO_MAX_OUTPUT_TOKENS)
                    .with("top-p", DEMO_TOP_P)
                    .with("top-k", DEMO_TOP_K),
                StageSpec::new("converter2", builtin::VIDEO_CONVERT),
                StageSpec::new("sink", builtin::NULL_SINK),
            ],
        }
    }
}

impl PipelineConfig {
    /// Load configuration using the standard search order.
    ///
    /// A file that is named (by flag or environment) but unreadable or
    /// invalid is an error; there is no silent fallback to the demo chain.
    pub fn load(cli_path: Option<&Path>) -> Result<(Self, ConfigSource), ConfigError> {
        Self::load_with(cli_path, |var| std::env::var(var).ok())
    }

    /// [`load`](Self::load) with an injectable environment lookup.
    pub fn load_with<F>(
        cli_path: Option<&Path>,
        env: F,
    ) -> Result<(Self, ConfigSource), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // 1. Command line
        if let Some(path) = cli_path {
            let config = Self::load_from_file(path)?;
            info!(path = %path.display(), pipeline = %config.pipeline.name, "Loaded pipeline config from --config");
            return Ok((config, ConfigSource::CommandLine(path.to_path_buf())));
        }

        // 2. Environment variable
        if let Some(path) = env(CONFIG_PATH_ENV_VAR).filter(|p| !p.trim().is_empty()) {
            let path = PathBuf::from(path);
            let config = Self::load_from_file(&path)?;
            info!(path = %path.display(), pipeline = %config.pipeline.name, "Loaded pipeline config from {CONFIG_PATH_ENV_VAR}");
            return Ok((config, ConfigSource::Environment(path)));
        }

        // 3. ./pipeline.toml
        let local = PathBuf::from(LOCAL_CONFIG_FILE);
        if local.exists() {
            let config = Self::load_from_file(&local)?;
            info!(pipeline = %config.pipeline.name, "Loaded pipeline config from ./{LOCAL_CONFIG_FILE}");
            return Ok((config, ConfigSource::LocalFile(local)));
        }

        // 4. Defaults
        info!("No {LOCAL_CONFIG_FILE} found, using built-in demo chain");
        Ok((Self::default(), ConfigSource::BuiltIn))
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        Self::from_toml_str(&contents, path)
    }

    /// Parse and validate TOML text. `origin` is only used in error messages.
    pub fn from_toml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        // Two-pass: reject unknown keys before serde fills in defaults
        let unknown = super::validation::validate_unknown_keys(contents);
        if !unknown.is_empty() {
            for key in &unknown {
                warn!("{}", key);
            }
            return Err(ConfigError::UnknownKeys(unknown));
        }

        let config: Self =
            toml::from_str(contents).map_err(|e| ConfigError::Parse(origin.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize the current config to a TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    /// Check the chain's shape. Stage kinds and properties are checked
    /// against the stage registry when the graph is built.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if self.pipeline.name.trim().is_empty() {
            errors.push("pipeline.name must not be empty".to_string());
        }
        if self.stages.is_empty() {
            errors.push("at least one [[stages]] entry is required".to_string());
        }

        let mut seen = HashSet::new();
        for (index, stage) in self.stages.iter().enumerate() {
            if stage.name.trim().is_empty() {
                errors.push(format!("stages[{index}].name must not be empty"));
            } else if !seen.insert(stage.name.as_str()) {
                errors.push(format!("stage name '{}' is used more than once", stage.name));
            }
            if stage.kind.trim().is_empty() {
                errors.push(format!("stages[{index}].kind must not be empty"));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }

    /// The stage list with `api-key` set on every analysis stage that does
    /// not configure its own.
    pub fn stage_specs_with_credential(&self, api_key: &str) -> Vec<StageSpec> {
        self.stages
            .iter()
            .cloned()
            .map(|mut spec| {
                if spec.kind == builtin::VISION_ANALYSIS {
                    spec.properties
                        .entry("api-key".to_string())
                        .or_insert_with(|| PropertyValue::from(api_key));
                }
                spec
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_is_demo_chain() {
        let config = PipelineConfig::default();
        let names: Vec<&str> = config.stages.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, ["source", "converter1", "analysis", "converter2", "sink"]);
        assert!(config.validate().is_ok());

        let analysis = &config.stages[2];
        assert_eq!(
            analysis.properties.get("output-metadata"),
            Some(&PropertyValue::Bool(false))
        );
        assert_eq!(analysis.properties.get("top-k"), Some(&PropertyValue::Int(20)));
    }

    #[test]
    fn test_default_round_trips_through_toml() {
        let config = PipelineConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = PipelineConfig::from_toml_str(&text, Path::new("<memory>")).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_unknown_key_rejected() {
        let text = r#"
[pipline]
name = "x"

[[stages]]
name = "source"
kind = "test-source"
"#;
        let err = PipelineConfig::from_toml_str(text, Path::new("<memory>")).unwrap_err();
        let ConfigError::UnknownKeys(keys) = err else {
            panic!("expected UnknownKeys, got {err}");
        };
        assert!(keys
            .iter()
            .any(|k| k.path == "pipline" && k.suggestion.as_deref() == Some("pipeline")));
    }

    #[test]
    fn test_duplicate_and_empty_names() {
        let config = PipelineConfig {
            pipeline: PipelineInfo::default(),
            stages: vec![
                StageSpec::new("a", builtin::TEST_SOURCE),
                StageSpec::new("a", builtin::NULL_SINK),
                StageSpec::new("", builtin::NULL_SINK),
            ],
        };
        let Err(ConfigError::Validation(errors)) = config.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_empty_chain_rejected() {
        let err = PipelineConfig::from_toml_str("[pipeline]\nname = \"x\"\n", Path::new("<memory>"))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }

    #[test]
    fn test_credential_injected_only_where_missing() {
        let config = PipelineConfig {
            pipeline: PipelineInfo::default(),
            stages: vec![
                StageSpec::new("source", builtin::TEST_SOURCE),
                StageSpec::new("a1", builtin::VISION_ANALYSIS),
                StageSpec::new("a2", builtin::VISION_ANALYSIS).with("api-key", "own"),
                StageSpec::new("sink", builtin::NULL_SINK),
            ],
        };
        let specs = config.stage_specs_with_credential("env-key");
        assert_eq!(
            specs[1].properties.get("api-key"),
            Some(&PropertyValue::from("env-key"))
        );
        assert_eq!(
            specs[2].properties.get("api-key"),
            Some(&PropertyValue::from("own"))
        );
        assert!(specs[0].properties.get("api-key").is_none());
    }

    #[test]
    fn test_load_search_order() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[pipeline]\nname = \"from-env\"\n\n[[stages]]\nname = \"source\"\nkind = \"test-source\"\n"
        )
        .unwrap();
        let env_path = file.path().to_string_lossy().to_string();

        let (config, source) =
            PipelineConfig::load_with(None, |var| (var == CONFIG_PATH_ENV_VAR).then(|| env_path.clone()))
                .unwrap();
        assert_eq!(config.pipeline.name, "from-env");
        assert!(matches!(source, ConfigSource::Environment(_)));

        // The command line wins over the environment.
        let (_, source) =
            PipelineConfig::load_with(Some(file.path()), |_| Some("/nonexistent.toml".into()))
                .unwrap();
        assert!(matches!(source, ConfigSource::CommandLine(_)));
    }

    #[test]
    fn test_named_missing_file_is_an_error() {
        let err = PipelineConfig::load_with(Some(Path::new("/definitely/not/here.toml")), |_| None)
            .unwrap_err();
        assert!(matches!(err, ConfigError::Io(..)));
    }
}
