//! Config Validation Tests
//!
//! Exercises the configuration layer independently from the rest of the
//! pipeline: unknown-key rejection, file loading, and the hand-off of the
//! parsed chain to the graph builder.

use std::io::Write;
use vision_pipeline::config::validation::{
    known_config_keys, suggest_correction, validate_unknown_keys,
};
use vision_pipeline::config::{ConfigSource, PipelineConfig};
use vision_pipeline::error::{ConfigError, PipelineError};
use vision_pipeline::pipeline::PipelineBuilder;
use vision_pipeline::stage::{builtin, PropertyValue};

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

// ============================================================================
// Typo Detection
// ============================================================================

#[test]
fn typo_in_stage_key_rejected_with_suggestion() {
    let toml_str = r#"
[[stages]]
name = "source"
knd = "test-source"
"#;
    let unknown = validate_unknown_keys(toml_str);
    assert_eq!(unknown.len(), 1, "Expected exactly 1 unknown key");
    assert_eq!(unknown[0].path, "stages.knd");
    assert_eq!(unknown[0].suggestion.as_deref(), Some("stages.kind"));
}

#[test]
fn property_names_are_not_file_keys() {
    let toml_str = r#"
[[stages]]
name = "analysis"
kind = "vision-analysis"

[stages.properties]
analysis-interval = 2.5
stop-sequences = ["Title"]
"#;
    assert!(validate_unknown_keys(toml_str).is_empty());
}

#[test]
fn suggest_correction_ignores_distant_keys() {
    let known = known_config_keys();
    assert_eq!(
        suggest_correction("pipeline.nam", &known).as_deref(),
        Some("pipeline.name")
    );
    assert!(suggest_correction("completely_unrelated_garbage_key_xyz", &known).is_none());
}

// ============================================================================
// File Loading
// ============================================================================

#[test]
fn file_with_unknown_key_fails_to_load() {
    let file = write_config(
        r#"
[pipeline]
name = "demo"
colour = "blue"

[[stages]]
name = "source"
kind = "test-source"
"#,
    );
    let err = PipelineConfig::load_from_file(file.path()).unwrap_err();
    let ConfigError::UnknownKeys(keys) = err else {
        panic!("expected unknown keys, got {err}");
    };
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0].path, "pipeline.colour");
}

#[test]
fn file_loads_typed_properties() {
    let file = write_config(
        r#"
[pipeline]
name = "lobby-camera"

[[stages]]
name = "source"
kind = "test-source"
[stages.properties]
is-live = true
framerate = 15.0
num-buffers = 100
pattern = "snow"

[[stages]]
name = "analysis"
kind = "vision-analysis"
[stages.properties]
stop-sequences = ["Title", "Conclusion"]

[[stages]]
name = "sink"
kind = "null-sink"
"#,
    );
    let (config, source) = PipelineConfig::load_with(Some(file.path()), |_| None).unwrap();
    assert!(matches!(source, ConfigSource::CommandLine(_)));
    assert_eq!(config.pipeline.name, "lobby-camera");

    let props = &config.stages[0].properties;
    assert_eq!(props.get("is-live"), Some(&PropertyValue::Bool(true)));
    assert_eq!(props.get("framerate"), Some(&PropertyValue::Float(15.0)));
    assert_eq!(props.get("num-buffers"), Some(&PropertyValue::Int(100)));
    assert_eq!(
        config.stages[1].properties.get("stop-sequences"),
        Some(&PropertyValue::List(vec!["Title".into(), "Conclusion".into()]))
    );

    let registry = builtin::registry();
    let specs = config.stage_specs_with_credential("k");
    let pipeline = PipelineBuilder::new(&config.pipeline.name, &registry)
        .build(&specs)
        .unwrap();
    assert_eq!(pipeline.len(), 3);
}

#[test]
fn malformed_toml_is_a_parse_error() {
    let file = write_config("[[stages]\nname = ");
    let err = PipelineConfig::load_from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Parse(..)));
}

#[test]
fn unknown_property_caught_by_builder_with_suggestion() {
    let file = write_config(
        r#"
[[stages]]
name = "source"
kind = "test-source"
[stages.properties]
framerat = 10.0

[[stages]]
name = "sink"
kind = "null-sink"
"#,
    );
    let config = PipelineConfig::load_from_file(file.path()).unwrap();
    let registry = builtin::registry();
    let err = PipelineBuilder::new("p", &registry)
        .build(&config.stages)
        .unwrap_err();
    assert!(matches!(
        err,
        PipelineError::Config(ConfigError::UnknownProperty { ref property, ref suggestion, .. })
            if property == "framerat" && suggestion.as_deref() == Some("framerate")
    ));
}

#[test]
fn print_config_output_reloads() {
    let text = PipelineConfig::default().to_toml().unwrap();
    let file = write_config(&text);
    let reloaded = PipelineConfig::load_from_file(file.path()).unwrap();
    assert_eq!(reloaded, PipelineConfig::default());
}
