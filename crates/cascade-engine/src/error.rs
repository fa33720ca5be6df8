//! Engine-level error types.

use cascade_core::CascadeError;
use cascade_storage::StorageError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors surfaced by the pipeline runtime (streams, manager, step
/// lifecycle, unroll). See spec §7 for the policy governing each variant.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A port's stream spec (`"name"` or `"name:weight"`) failed to parse.
    /// Fatal at setup (spec §7: configuration errors never let the engine
    /// start).
    #[error("invalid stream spec '{0}': {1}")]
    InvalidStreamSpec(String, String),

    /// A step's shape requires a port (e.g. a transform's `"input"` or
    /// `"output"`) that its config never declared. Fatal at setup, same
    /// policy as `InvalidStreamSpec` (spec §7).
    #[error("step '{step}' has no resolved port '{port}'")]
    UnresolvedPort { step: String, port: String },

    #[error(transparent)]
    Cascade(#[from] CascadeError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A `process`/`generate`/`sink` call from user step code failed. Caught
    /// at the worker boundary, logged, and the worker continues (spec §7).
    #[error("step '{step}' failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl EngineError {
    pub fn step(step: impl Into<String>, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        EngineError::Step { step: step.into(), source: Box::new(source) }
    }
}

/// Result type returned by user-provided `Source`/`Transform`/`Sink` bodies.
/// Kept generic over the user's own error type so implementers are not
/// forced to depend on `cascade-engine`'s error enum.
pub type StepResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
