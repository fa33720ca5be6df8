//! YAML pipeline configuration and the static step registry (spec §4.8).
//!
//! Replaces the Python original's `importlib`-based dynamic class loading
//! (spec §9) with a `StepRegistry` populated at process startup, and loads
//! pipeline definitions with `serde_yaml` the way `langgraph-core::yaml` and
//! the orchestrator crate's `config::loader` load their own configuration.

pub mod error;
pub mod pipeline;
pub mod registry;

pub use error::{ConfigError, Result};
pub use pipeline::{PipelineConfig, StepConfig};
pub use registry::{StepFactory, StepRegistry};
