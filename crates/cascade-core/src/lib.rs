//! Message model and cascade-id provenance algebra.
//!
//! This crate has no I/O and no async: it is the pure core that
//! `cascade-storage` and `cascade-engine` build on.

pub mod cascade_id;
pub mod error;
pub mod message;

pub use cascade_id::{ParamValue, ParsedCascadeId, PathToken};
pub use error::{CascadeError, Result};
pub use message::Message;
