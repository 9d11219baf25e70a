//! Stage factories keyed by kind name.

use super::{PropertySpec, PropertyValue, Stage};
use crate::error::StageError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Declarative description of one stage in the chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageSpec {
    /// Unique within the pipeline
    pub name: String,
    /// Registered factory kind
    pub kind: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub properties: BTreeMap<String, PropertyValue>,
}

impl StageSpec {
    pub fn new(name: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            properties: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with(mut self, property: &str, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(property.to_string(), value.into());
        self
    }
}

/// Creates stages of one kind.
pub trait StageFactory: Send + Sync {
    /// Properties stages of this kind accept.
    fn property_schema(&self) -> &[PropertySpec];

    fn create(&self, name: &str) -> Result<Box<dyn Stage>, StageError>;
}

/// Lookup table from kind name to factory.
#[derive(Clone, Default)]
pub struct StageRegistry {
    factories: BTreeMap<String, Arc<dyn StageFactory>>,
}

impl StageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the factory for `kind`.
    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn StageFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn factory(&self, kind: &str) -> Option<&Arc<dyn StageFactory>> {
        self.factories.get(kind)
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Create a stage; an unregistered kind is an error, not a panic.
    pub fn create(&self, kind: &str, name: &str) -> Result<Box<dyn Stage>, StageError> {
        let factory = self.factories.get(kind).ok_or_else(|| {
            StageError::flow(format!("no factory registered for kind '{kind}'"))
        })?;
        factory.create(name)
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::builtin;

    #[test]
    fn test_unknown_kind_is_error() {
        let registry = builtin::registry();
        let err = registry.create("warp-drive", "x").unwrap_err();
        assert!(err.to_string().contains("warp-drive"));
    }

    #[test]
    fn test_builtin_kinds_registered() {
        let registry = builtin::registry();
        let kinds: Vec<&str> = registry.kinds().collect();
        assert_eq!(
            kinds,
            vec!["null-sink", "test-source", "video-convert", "vision-analysis"]
        );
    }

    #[test]
    fn test_spec_builder() {
        let spec = StageSpec::new("source", "test-source").with("num-buffers", 4i64);
        assert_eq!(spec.properties["num-buffers"], PropertyValue::Int(4));
    }
}
