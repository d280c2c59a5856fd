//! Queue module: retry policy and the SQLite / in-memory store implementations.

mod memory;
mod retry;
mod sqlite;

pub use memory::{InMemoryConfigStore, InMemoryJobStore, InMemoryWorkerRegistry};
pub use retry::{MAX_DELAY, RetryPolicy};
pub use sqlite::{SqliteConfigStore, SqliteJobStore, SqliteWorkerRegistry, connect};
