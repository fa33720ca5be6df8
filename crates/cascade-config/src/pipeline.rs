//! YAML pipeline definitions (spec §4.8, §6 stream-spec syntax), resolved
//! into a runnable [`cascade_engine::Engine`] — the static-registry
//! replacement for `cascade_main.py`'s `Cascade.setup()`.

use cascade_engine::{Engine, Params, PortSpec, Storage};
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::error::{ConfigError, Result};
use crate::registry::StepRegistry;

/// One step entry in a pipeline YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct StepConfig {
    pub kind: String,
    #[serde(default)]
    pub streams: HashMap<String, String>,
    #[serde(default)]
    pub params: Map<String, Value>,
}

/// The top-level shape of a pipeline YAML file:
///
/// ```yaml
/// project: demo
/// steps:
///   src:
///     kind: echo-source
///     streams:
///       output: X
///     params:
///       count: 2
///       values: ["a", "b"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub project: String,
    pub steps: HashMap<String, StepConfig>,
}

impl PipelineConfig {
    /// Parse and validate a pipeline file: every step's `kind` must be
    /// registered in `registry`, and every stream spec must parse per the
    /// BNF in spec §6. Validation failures are [`ConfigError`], fatal at
    /// setup (spec §7: "Configuration errors... the engine never starts").
    pub fn load(path: impl AsRef<Path>, registry: &StepRegistry) -> Result<Self> {
        let path_ref = path.as_ref();
        let content = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Io {
            path: path_ref.display().to_string(),
            source,
        })?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        config.validate(registry)?;
        Ok(config)
    }

    fn validate(&self, registry: &StepRegistry) -> Result<()> {
        for (name, step) in &self.steps {
            if !registry.contains(&step.kind) {
                return Err(ConfigError::UnknownStepKind(step.kind.clone()));
            }
            for (port, spec) in &step.streams {
                PortSpec::parse(spec).map_err(|e| ConfigError::InvalidStreamSpec {
                    step: name.clone(),
                    port: port.clone(),
                    reason: e.to_string(),
                })?;
            }
        }
        Ok(())
    }

    /// Build and register every step against a fresh [`Engine`] over
    /// `storage`, mirroring `cascade_main.py`'s `Cascade.setup()`.
    pub async fn into_engine(self, registry: &StepRegistry, storage: Arc<dyn Storage>) -> Result<Engine> {
        let mut engine = Engine::new(self.project, storage);
        for (name, step_config) in self.steps {
            let params = Params::new(step_config.params);
            let step = registry.build(&step_config.kind, &name, step_config.streams, params)?;
            engine.register(step).await?;
        }
        Ok(engine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cascade_storage::InMemoryStorage;

    const DEMO_YAML: &str = r#"
project: demo
steps:
  src:
    kind: echo-source
    streams:
      output: X
    params:
      count: 2
      values: ["a", "b"]
  up:
    kind: uppercase
    streams:
      input: "X:1"
      output: Y
  log:
    kind: console-sink
    streams:
      input: "Y:1"
"#;

    fn write_temp(contents: &str) -> std::path::PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("cascade-config-test-{}.yaml", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn loads_and_validates_demo_pipeline() {
        let path = write_temp(DEMO_YAML);
        let registry = StepRegistry::with_builtins();
        let config = PipelineConfig::load(&path, &registry).unwrap();
        assert_eq!(config.project, "demo");
        assert_eq!(config.steps.len(), 3);
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn unknown_kind_fails_validation() {
        let yaml = DEMO_YAML.replace("echo-source", "nonexistent-kind");
        let path = write_temp(&yaml);
        let registry = StepRegistry::with_builtins();
        let err = PipelineConfig::load(&path, &registry);
        assert!(matches!(err, Err(ConfigError::UnknownStepKind(_))));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_stream_spec_fails_validation() {
        let yaml = DEMO_YAML.replace("\"X:1\"", "\"X:not-a-number\"");
        let path = write_temp(&yaml);
        let registry = StepRegistry::with_builtins();
        let err = PipelineConfig::load(&path, &registry);
        assert!(matches!(err, Err(ConfigError::InvalidStreamSpec { .. })));
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn into_engine_runs_demo_pipeline() {
        let path = write_temp(DEMO_YAML);
        let registry = StepRegistry::with_builtins();
        let config = PipelineConfig::load(&path, &registry).unwrap();
        let storage: Arc<dyn Storage> = Arc::new(InMemoryStorage::new());
        let engine = config.into_engine(&registry, storage.clone()).await.unwrap();
        engine.run().await.unwrap();

        assert!(storage.exists("X", "src:count=0").await.unwrap());
        assert!(storage.exists("Y", "src:count=0/up").await.unwrap());
        std::fs::remove_file(path).ok();
    }
}
