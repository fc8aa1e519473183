//! Persisted article cache for offline support.
//!
//! This module provides:
//! - An [`ArticleStore`] trait with SQLite and in-memory backends
//! - Atomic full replacement of the stored article set
//! - A reactive snapshot stream so readers never observe a partial write

mod snapshot;
mod storage;

pub use snapshot::PersistedCache;
pub use storage::{ArticleStore, CacheSnapshot, CachedArticle, MemoryStore, SqliteStore, StorageError};
