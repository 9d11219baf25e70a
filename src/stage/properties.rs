//! Typed stage properties and the per-kind schemas they are checked against.

use crate::config::validation::suggest_correction;
use crate::error::{ConfigError, PropertyError};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// A configuration value as written in the pipeline file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<String>),
}

impl PropertyValue {
    pub const fn type_name(&self) -> &'static str {
        match self {
            PropertyValue::Bool(_) => "bool",
            PropertyValue::Int(_) => "integer",
            PropertyValue::Float(_) => "float",
            PropertyValue::String(_) => "string",
            PropertyValue::List(_) => "list of strings",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Floats accept integer literals too (`interval = 5`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropertyValue::Float(f) => Some(*f),
            PropertyValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::List(l) => Some(l),
            _ => None,
        }
    }

    pub(crate) fn expect_str(&self, name: &str) -> Result<&str, PropertyError> {
        self.as_str().ok_or_else(|| self.mismatch(name, "string"))
    }

    pub(crate) fn expect_bool(&self, name: &str) -> Result<bool, PropertyError> {
        self.as_bool().ok_or_else(|| self.mismatch(name, "bool"))
    }

    pub(crate) fn expect_i64(&self, name: &str) -> Result<i64, PropertyError> {
        self.as_i64().ok_or_else(|| self.mismatch(name, "integer"))
    }

    pub(crate) fn expect_f64(&self, name: &str) -> Result<f64, PropertyError> {
        self.as_f64().ok_or_else(|| self.mismatch(name, "float"))
    }

    pub(crate) fn expect_list(&self, name: &str) -> Result<&[String], PropertyError> {
        self.as_list().ok_or_else(|| self.mismatch(name, "list of strings"))
    }

    fn mismatch(&self, name: &str, expected: &'static str) -> PropertyError {
        PropertyError::TypeMismatch {
            name: name.to_string(),
            expected,
            got: self.type_name(),
        }
    }
}

impl std::fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyValue::Bool(b) => write!(f, "{b}"),
            PropertyValue::Int(i) => write!(f, "{i}"),
            PropertyValue::Float(x) => write!(f, "{x}"),
            PropertyValue::String(s) => write!(f, "\"{s}\""),
            PropertyValue::List(l) => write!(f, "{l:?}"),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::String(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        PropertyValue::Int(value)
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        PropertyValue::Float(value)
    }
}

impl From<Vec<String>> for PropertyValue {
    fn from(value: Vec<String>) -> Self {
        PropertyValue::List(value)
    }
}

// ============================================================================
// Schemas
// ============================================================================

/// Expected type (and range) of one property.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PropertyKind {
    String,
    Bool,
    Int { min: i64, max: i64 },
    Float { min: f64, max: f64 },
    Choice(&'static [&'static str]),
    StringList,
}

/// Declared property of a stage kind.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PropertySpec {
    pub name: &'static str,
    pub kind: PropertyKind,
    pub blurb: &'static str,
}

impl PropertySpec {
    pub const fn new(name: &'static str, kind: PropertyKind, blurb: &'static str) -> Self {
        Self { name, kind, blurb }
    }

    /// Check a value's type and range without applying it.
    pub fn check(&self, value: &PropertyValue) -> Result<(), PropertyError> {
        match self.kind {
            PropertyKind::String => value.expect_str(self.name).map(|_| ()),
            PropertyKind::Bool => value.expect_bool(self.name).map(|_| ()),
            PropertyKind::StringList => value.expect_list(self.name).map(|_| ()),
            PropertyKind::Int { min, max } => {
                let v = value.expect_i64(self.name)?;
                if (min..=max).contains(&v) {
                    Ok(())
                } else {
                    Err(self.invalid(format!("{v} is outside [{min}, {max}]")))
                }
            }
            PropertyKind::Float { min, max } => {
                let v = value.expect_f64(self.name)?;
                if v.is_finite() && v >= min && v <= max {
                    Ok(())
                } else {
                    Err(self.invalid(format!("{v} is outside [{min}, {max}]")))
                }
            }
            PropertyKind::Choice(options) => {
                let v = value.expect_str(self.name)?;
                if options.contains(&v) {
                    Ok(())
                } else {
                    Err(self.invalid(format!("'{v}' is not one of {}", options.join(", "))))
                }
            }
        }
    }

    fn invalid(&self, reason: String) -> PropertyError {
        PropertyError::Invalid {
            name: self.name.to_string(),
            reason,
        }
    }
}

/// Look up `name` in `schema` and check `value` against it.
pub fn check_property(
    schema: &[PropertySpec],
    name: &str,
    value: &PropertyValue,
) -> Result<(), PropertyError> {
    schema
        .iter()
        .find(|p| p.name == name)
        .ok_or_else(|| PropertyError::Unknown(name.to_string()))?
        .check(value)
}

/// Validate a stage's configured properties against its kind's schema.
///
/// Unknown names are rejected with the closest known name as a suggestion.
pub fn validate_properties(
    stage: &str,
    kind: &str,
    schema: &[PropertySpec],
    properties: &BTreeMap<String, PropertyValue>,
) -> Result<(), ConfigError> {
    let known: HashSet<&str> = schema.iter().map(|p| p.name).collect();

    for (name, value) in properties {
        let Some(spec) = schema.iter().find(|p| p.name == name.as_str()) else {
            return Err(ConfigError::UnknownProperty {
                stage: stage.to_string(),
                kind: kind.to_string(),
                property: name.clone(),
                suggestion: suggest_correction(name, &known),
            });
        };
        spec.check(value).map_err(|e| ConfigError::InvalidProperty {
            stage: stage.to_string(),
            property: name.clone(),
            reason: e.to_string(),
        })?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SCHEMA: &[PropertySpec] = &[
        PropertySpec::new("width", PropertyKind::Int { min: 1, max: 8192 }, "Frame width"),
        PropertySpec::new("framerate", PropertyKind::Float { min: 0.1, max: 1000.0 }, "FPS"),
        PropertySpec::new("pattern", PropertyKind::Choice(&["black", "white"]), "Pattern"),
    ];

    fn props(entries: &[(&str, PropertyValue)]) -> BTreeMap<String, PropertyValue> {
        entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect()
    }

    #[test]
    fn test_float_accepts_integer_literal() {
        assert_eq!(PropertyValue::Int(5).as_f64(), Some(5.0));
        assert!(validate_properties("s", "k", SCHEMA, &props(&[("framerate", PropertyValue::Int(4))])).is_ok());
    }

    #[test]
    fn test_unknown_property_suggests_name() {
        let err = validate_properties("s", "k", SCHEMA, &props(&[("widht", PropertyValue::Int(4))]))
            .unwrap_err();
        match err {
            ConfigError::UnknownProperty { property, suggestion, .. } => {
                assert_eq!(property, "widht");
                assert_eq!(suggestion.as_deref(), Some("width"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_out_of_range_is_invalid() {
        let err = validate_properties("s", "k", SCHEMA, &props(&[("width", PropertyValue::Int(0))]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidProperty { .. }));
    }

    #[test]
    fn test_choice_and_type_mismatch() {
        let spec = SCHEMA[2];
        assert!(spec.check(&"black".into()).is_ok());
        assert!(spec.check(&"plaid".into()).is_err());
        assert!(matches!(
            spec.check(&PropertyValue::Bool(true)),
            Err(PropertyError::TypeMismatch { expected: "string", got: "bool", .. })
        ));
    }

    #[test]
    fn test_untagged_deserialization() {
        let parsed: BTreeMap<String, PropertyValue> = toml::from_str(
            r#"
            a = true
            b = 3
            c = 0.5
            d = "x"
            e = ["Title", "Conclusion"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed["a"], PropertyValue::Bool(true));
        assert_eq!(parsed["b"], PropertyValue::Int(3));
        assert_eq!(parsed["c"], PropertyValue::Float(0.5));
        assert_eq!(parsed["d"], PropertyValue::String("x".to_string()));
        assert_eq!(parsed["e"].as_list().map(<[String]>::len), Some(2));
    }
}
