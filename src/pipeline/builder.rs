//! Stage graph builder.
//!
//! Building runs in three passes:
//!
//! 1. Validate every stage's properties against its kind's schema. Nothing
//!    is constructed if any stage is misconfigured.
//! 2. Construct every stage, collecting all failures so the error names each
//!    stage that could not be built.
//! 3. Link stage `i` to `i + 1` strictly in order, stopping at the first pair
//!    that refuses to connect.

use crate::error::{ConfigError, ConstructionError, LinkError, PipelineError};
use crate::stage::{validate_properties, Stage, StageRegistry, StageSpec};
use crate::types::{FormatSet, StageFailure};
use std::collections::HashSet;
use tracing::{debug, error, info};

/// Edge between two adjacent stages, by position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Link {
    pub upstream: usize,
    pub downstream: usize,
}

/// A built, linked, linear chain of stages in the `Idle` state.
#[derive(Debug)]
pub struct Pipeline {
    name: String,
    stages: Vec<Box<dyn Stage>>,
    links: Vec<Link>,
}

impl Pipeline {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.name()).collect()
    }

    pub fn links(&self) -> &[Link] {
        &self.links
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Offer a result channel to every stage. Returns how many accepted.
    pub fn connect_analysis(&mut self, sender: &super::AnalysisResultSender) -> usize {
        let mut connected = 0;
        for stage in &mut self.stages {
            if stage.connect_analysis(sender.clone()) {
                debug!(stage = %stage.name(), "Analysis results connected");
                connected += 1;
            }
        }
        connected
    }

    pub(crate) fn into_parts(self) -> (String, Vec<Box<dyn Stage>>) {
        (self.name, self.stages)
    }
}

/// Negotiate the link between two adjacent stages.
pub fn link(upstream: &dyn Stage, downstream: &mut dyn Stage) -> Result<(), String> {
    let offered: FormatSet = upstream
        .ports()
        .src
        .ok_or_else(|| format!("'{}' has no src port", upstream.name()))?;
    downstream.accept_link(upstream.name(), &offered)
}

/// Builds a [`Pipeline`] from an ordered list of stage specs.
pub struct PipelineBuilder<'a> {
    name: String,
    registry: &'a StageRegistry,
}

impl<'a> PipelineBuilder<'a> {
    pub fn new(name: impl Into<String>, registry: &'a StageRegistry) -> Self {
        Self {
            name: name.into(),
            registry,
        }
    }

    pub fn build(&self, specs: &[StageSpec]) -> Result<Pipeline, PipelineError> {
        if specs.is_empty() {
            return Err(PipelineError::Topology("pipeline has no stages".to_string()));
        }
        self.validate(specs)?;
        let mut stages = self.construct(specs)?;
        check_endpoints(&stages)?;
        let links = link_in_order(&mut stages)?;

        info!(
            pipeline = %self.name,
            stages = stages.len(),
            links = links.len(),
            "Pipeline built"
        );
        Ok(Pipeline {
            name: self.name.clone(),
            stages,
            links,
        })
    }

    fn validate(&self, specs: &[StageSpec]) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in specs {
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::DuplicateStageName(spec.name.clone()));
            }
            // Unknown kinds are reported by the construction pass.
            if let Some(factory) = self.registry.factory(&spec.kind) {
                validate_properties(
                    &spec.name,
                    &spec.kind,
                    factory.property_schema(),
                    &spec.properties,
                )?;
            }
        }
        Ok(())
    }

    fn construct(&self, specs: &[StageSpec]) -> Result<Vec<Box<dyn Stage>>, ConstructionError> {
        let mut stages = Vec::with_capacity(specs.len());
        let mut failures = Vec::new();

        for spec in specs {
            match self.create_one(spec) {
                Ok(stage) => stages.push(stage),
                Err(failure) => {
                    error!(stage = %failure.stage, kind = %spec.kind, error = %failure.message, "Stage construction failed");
                    failures.push(failure);
                }
            }
        }

        if failures.is_empty() {
            Ok(stages)
        } else {
            Err(ConstructionError { failures })
        }
    }

    fn create_one(&self, spec: &StageSpec) -> Result<Box<dyn Stage>, StageFailure> {
        let mut stage = self
            .registry
            .create(&spec.kind, &spec.name)
            .map_err(|e| e.into_failure(&spec.name))?;
        for (property, value) in &spec.properties {
            stage.set_property(property, value).map_err(|e| {
                StageFailure::new(&spec.name, e.to_string())
                    .with_debug(format!("{property} = {value}"))
            })?;
        }
        debug!(stage = %spec.name, kind = %spec.kind, "Stage constructed");
        Ok(stage)
    }
}

fn check_endpoints(stages: &[Box<dyn Stage>]) -> Result<(), PipelineError> {
    let (Some(first), Some(last)) = (stages.first(), stages.last()) else {
        return Err(PipelineError::Topology("pipeline has no stages".to_string()));
    };
    let head = first.ports();
    if head.sink.is_some() || head.src.is_none() {
        return Err(PipelineError::Topology(format!(
            "first stage '{}' is not a source",
            first.name()
        )));
    }
    if stages.len() > 1 && last.ports().src.is_some() {
        return Err(PipelineError::Topology(format!(
            "last stage '{}' is not a sink",
            last.name()
        )));
    }
    Ok(())
}

fn link_in_order(stages: &mut [Box<dyn Stage>]) -> Result<Vec<Link>, LinkError> {
    let mut links = Vec::with_capacity(stages.len().saturating_sub(1));
    for i in 0..stages.len().saturating_sub(1) {
        let (head, tail) = stages.split_at_mut(i + 1);
        let (upstream, downstream) = (&head[i], &mut tail[0]);
        if let Err(reason) = link(upstream.as_ref(), downstream.as_mut()) {
            error!(upstream = %upstream.name(), downstream = %downstream.name(), %reason, "Link failed");
            return Err(LinkError {
                upstream_index: i,
                upstream: upstream.name().to_string(),
                downstream_index: i + 1,
                downstream: downstream.name().to_string(),
                reason,
            });
        }
        debug!(upstream = %upstream.name(), downstream = %downstream.name(), "Linked");
        links.push(Link {
            upstream: i,
            downstream: i + 1,
        });
    }
    Ok(links)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stage::builtin;

    fn demo_specs() -> Vec<StageSpec> {
        vec![
            StageSpec::new("source", builtin::TEST_SOURCE),
            StageSpec::new("converter1", builtin::VIDEO_CONVERT),
            StageSpec::new("analysis", builtin::VISION_ANALYSIS).with("api-key", "k"),
            StageSpec::new("converter2", builtin::VIDEO_CONVERT),
            StageSpec::new("sink", builtin::NULL_SINK),
        ]
    }

    #[test]
    fn test_demo_chain_builds() {
        let registry = builtin::registry();
        let pipeline = PipelineBuilder::new("demo", &registry).build(&demo_specs()).unwrap();
        assert_eq!(pipeline.len(), 5);
        assert_eq!(pipeline.links().len(), 4);
        for (i, link) in pipeline.links().iter().enumerate() {
            assert_eq!((link.upstream, link.downstream), (i, i + 1));
        }
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let registry = builtin::registry();
        let specs = vec![
            StageSpec::new("x", builtin::TEST_SOURCE),
            StageSpec::new("x", builtin::NULL_SINK),
        ];
        let err = PipelineBuilder::new("p", &registry).build(&specs).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::DuplicateStageName(ref n)) if n == "x"
        ));
    }

    #[test]
    fn test_bad_property_rejected_before_construction() {
        let registry = builtin::registry();
        let mut specs = demo_specs();
        specs[1] = StageSpec::new("converter1", "bogus-kind");
        specs[3] = StageSpec::new("converter2", builtin::VIDEO_CONVERT).with("fromat", "rgb");
        let err = PipelineBuilder::new("p", &registry).build(&specs).unwrap_err();
        // Schema errors win over construction errors.
        assert!(matches!(
            err,
            PipelineError::Config(ConfigError::UnknownProperty { ref suggestion, .. })
                if suggestion.as_deref() == Some("format")
        ));
    }

    #[test]
    fn test_sink_first_is_topology_error() {
        let registry = builtin::registry();
        let specs = vec![
            StageSpec::new("sink", builtin::NULL_SINK),
            StageSpec::new("source", builtin::TEST_SOURCE),
        ];
        let err = PipelineBuilder::new("p", &registry).build(&specs).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }

    #[test]
    fn test_empty_is_topology_error() {
        let registry = builtin::registry();
        let err = PipelineBuilder::new("p", &registry).build(&[]).unwrap_err();
        assert!(matches!(err, PipelineError::Topology(_)));
    }
}
