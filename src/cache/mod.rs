//! Tiered response cache: a fast in-memory tier backed by a durable SQLite
//! tier that survives restarts.
//!
//! Reads and writes are routed per [`CacheStrategy`]; entries older than the
//! time-to-live are treated as absent in every tier. Durable-tier failures
//! are logged and degrade silently to memory-only semantics.

mod key;
mod memory;
mod storage;
mod store;

pub use key::cache_key;
pub use memory::CacheEntry;
pub use storage::SqliteStorage;
pub use store::{CacheStore, CacheStrategy};
