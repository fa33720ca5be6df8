//! Configuration error types. All fatal at setup (spec §7): the engine
//! never starts on a `ConfigError`.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("unknown step kind '{0}' (not registered)")]
    UnknownStepKind(String),

    #[error("invalid stream spec for step '{step}' port '{port}': {reason}")]
    InvalidStreamSpec { step: String, port: String, reason: String },

    #[error("failed to read config file '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Engine(#[from] cascade_engine::EngineError),
}
