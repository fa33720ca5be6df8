//! Stream-specification syntax for a step's declared ports (spec §6).
//!
//! A port value is either `"<stream>"` (publish) or `"<stream>:<weight>"`
//! (subscribe, weight `0` meaning broadcast).

use crate::error::{EngineError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Publish { stream: String },
    Subscribe { stream: String, weight: u32 },
}

impl PortSpec {
    pub fn stream_name(&self) -> &str {
        match self {
            PortSpec::Publish { stream } => stream,
            PortSpec::Subscribe { stream, .. } => stream,
        }
    }

    /// Parse one port value. `"name"` is a publish port; `"name:weight"`
    /// (weight a non-negative integer) is a subscribe port.
    pub fn parse(spec: &str) -> Result<PortSpec> {
        match spec.rsplit_once(':') {
            Some((stream, weight_str)) => {
                let weight: u32 = weight_str.parse().map_err(|_| {
                    EngineError::InvalidStreamSpec(
                        spec.to_string(),
                        format!("'{weight_str}' is not a non-negative integer weight"),
                    )
                })?;
                if stream.is_empty() {
                    return Err(EngineError::InvalidStreamSpec(
                        spec.to_string(),
                        "missing stream name before ':'".to_string(),
                    ));
                }
                Ok(PortSpec::Subscribe { stream: stream.to_string(), weight })
            }
            None => {
                if spec.is_empty() {
                    return Err(EngineError::InvalidStreamSpec(
                        spec.to_string(),
                        "empty stream spec".to_string(),
                    ));
                }
                Ok(PortSpec::Publish { stream: spec.to_string() })
            }
        }
    }
}
