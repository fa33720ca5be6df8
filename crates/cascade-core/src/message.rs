//! The immutable message type carried on streams.

use crate::cascade_id::{self, ParamValue};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// An immutable `(cascade_id, payload, metadata)` triple. Identified
/// exclusively by its `cascade_id` within a stream (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub cascade_id: String,
    pub payload: Value,
    pub metadata: Map<String, Value>,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Build a message carrying `source_step` in its metadata, the
    /// convention every built-in step shape uses.
    pub fn from_step(cascade_id: String, payload: Value, source_step: &str) -> Self {
        let mut metadata = Map::new();
        metadata.insert("source_step".to_string(), Value::String(source_step.to_string()));
        Self { cascade_id, payload, metadata, created_at: Utc::now() }
    }

    /// Derive this message's cascade id extended by `step` with `params`.
    /// Convenience wrapper around [`cascade_id::derive`].
    pub fn derive_cascade_id(&self, step: &str, params: &[(&str, ParamValue)]) -> Result<String> {
        cascade_id::derive(&self.cascade_id, step, params)
    }
}
