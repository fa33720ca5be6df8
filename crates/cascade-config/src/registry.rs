//! The static step registry (spec §4.8, §9 design note "Dynamic step
//! loading"): a `kind` string from configuration resolves to a
//! [`StepFactory`], the systems-language replacement for the Python
//! original's `importlib.import_module` lookup.

use async_trait::async_trait;
use cascade_engine::{Params, Sink, Source, Step, Transform};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{ConfigError, Result};

/// Constructs a concrete [`Step`] for one `kind` string. Implementations are
/// typically zero-sized marker types; the interesting state lives in the
/// `Source`/`Transform`/`Sink` body each factory builds.
pub trait StepFactory: Send + Sync {
    fn build(&self, name: &str, ports: HashMap<String, String>, params: Params) -> Result<Step>;
}

/// A `HashMap<String, Arc<dyn StepFactory>>` populated at process startup.
/// `with_builtins()` registers the three worked-example kinds described in
/// SPEC_FULL §4.8; downstream implementers (LLM steps, HTTP steps, ...)
/// register their own kinds the same way before loading a pipeline config.
#[derive(Default, Clone)]
pub struct StepRegistry {
    factories: HashMap<String, Arc<dyn StepFactory>>,
}

impl StepRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry pre-populated with `echo-source`, `uppercase`, and
    /// `console-sink` — enough to run the S1 scenario from spec §8
    /// end-to-end and to give downstream implementers a concrete pattern.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("echo-source", Arc::new(EchoSourceFactory));
        registry.register("uppercase", Arc::new(UppercaseFactory));
        registry.register("console-sink", Arc::new(ConsoleSinkFactory));
        registry
    }

    pub fn register(&mut self, kind: impl Into<String>, factory: Arc<dyn StepFactory>) {
        self.factories.insert(kind.into(), factory);
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn build(
        &self,
        kind: &str,
        name: &str,
        ports: HashMap<String, String>,
        params: Params,
    ) -> Result<Step> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| ConfigError::UnknownStepKind(kind.to_string()))?;
        factory.build(name, ports, params)
    }
}

/// Emits each entry of its `values` array param in order, one per
/// `generate()` call; `count` (read by the engine itself) should match
/// `values.len()` for every configured payload to be produced.
struct EchoSource {
    values: Vec<Value>,
    next: usize,
}

#[async_trait]
impl Source for EchoSource {
    async fn generate(&mut self) -> cascade_engine::StepResult<Option<Value>> {
        let v = self.values.get(self.next).cloned();
        self.next += 1;
        Ok(v)
    }
}

struct EchoSourceFactory;

impl StepFactory for EchoSourceFactory {
    fn build(&self, name: &str, ports: HashMap<String, String>, params: Params) -> Result<Step> {
        let values = params
            .get("values")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(Step::source(name, ports, params, Box::new(EchoSource { values, next: 0 }))?)
    }
}

/// Uppercases a string payload. Non-string payloads pass through as `null`
/// rather than panicking, since a misconfigured pipeline is a setup-time
/// error, not a reason to crash a running worker.
struct Uppercase;

#[async_trait]
impl Transform for Uppercase {
    async fn process(&mut self, message: &cascade_core::Message) -> cascade_engine::StepResult<Option<Value>> {
        Ok(message.payload.as_str().map(|s| Value::String(s.to_uppercase())))
    }
}

struct UppercaseFactory;

impl StepFactory for UppercaseFactory {
    fn build(&self, name: &str, ports: HashMap<String, String>, params: Params) -> Result<Step> {
        Ok(Step::transform(name, ports, params, Box::new(Uppercase))?)
    }
}

/// Logs every payload it receives via `tracing::info!`. The console-sink
/// worked example for the "explorer"-style tap described in spec §4.3.
struct ConsoleSink;

#[async_trait]
impl Sink for ConsoleSink {
    async fn sink(&mut self, message: &cascade_core::Message) -> cascade_engine::StepResult<()> {
        tracing::info!(cascade_id = %message.cascade_id, payload = %message.payload, "sink");
        Ok(())
    }
}

struct ConsoleSinkFactory;

impl StepFactory for ConsoleSinkFactory {
    fn build(&self, name: &str, ports: HashMap<String, String>, params: Params) -> Result<Step> {
        Ok(Step::sink(name, ports, params, Box::new(ConsoleSink))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_builtins_registers_all_three() {
        let registry = StepRegistry::with_builtins();
        assert!(registry.contains("echo-source"));
        assert!(registry.contains("uppercase"));
        assert!(registry.contains("console-sink"));
    }

    #[test]
    fn unknown_kind_is_an_error() {
        let registry = StepRegistry::with_builtins();
        let err = registry.build("no-such-kind", "x", HashMap::new(), Params::default());
        assert!(matches!(err, Err(ConfigError::UnknownStepKind(_))));
    }
}
