//! 记忆层：步骤执行日志（只追加，按会话查询）

pub mod record;
pub mod sqlite;
pub mod store;

pub use record::MemoryRecord;
pub use sqlite::SqliteMemoryStore;
pub use store::{InMemoryStore, MemoryError, MemoryStore};
