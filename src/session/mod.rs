//! 会话检查点持久化：内存 / SQLite

#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod store;

#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteCheckpointStore;
pub use store::{create_checkpoint_store, Checkpoint, CheckpointStore, MemoryCheckpointStore};
