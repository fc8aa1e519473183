//! Offline-first synchronization: fetch, reconcile with the cache, notify.

mod engine;
mod feed;
mod state;

pub use engine::SyncEngine;
pub use feed::ArticleFeed;
pub use state::{FeedEvent, FeedView, RefreshHandle, RefreshOutcome, SyncState, ViewSource};
