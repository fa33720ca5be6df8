//! Error types for the cascade id algebra and message model.

use thiserror::Error;

/// Convenience result type using [`CascadeError`].
pub type Result<T> = std::result::Result<T, CascadeError>;

/// Errors raised by cascade id derivation, merging, and parsing.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CascadeError {
    /// A step name or parameter value contained a reserved alphabet character
    /// (`/ : , = ; @`).
    #[error("'{value}' contains a reserved cascade-id character: {reserved:?}")]
    ReservedCharacter { value: String, reserved: char },

    /// A parameter value could not be canonically encoded (e.g. a nested
    /// array or object).
    #[error("parameter '{key}' has a value that cannot be encoded in a cascade id: {reason}")]
    InvalidParam { key: String, reason: String },

    /// A cascade id token (`step_name[:params]`) was malformed.
    #[error("malformed cascade-id token '{0}'")]
    InvalidToken(String),

    /// `merge` was called with no parents.
    #[error("merge requires at least one parent id")]
    EmptyMerge,
}
