//! Durable content-addressed message storage (spec §4.2, §6).

pub mod error;
pub mod memory;
pub mod sqlite;
pub mod traits;

pub use error::{Result, StorageError};
pub use memory::InMemoryStorage;
pub use sqlite::SqliteStorage;
pub use traits::Storage;
