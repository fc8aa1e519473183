//! State machine and event types shared by the engine and its consumers.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::oneshot;

use crate::search::{DisplayArticle, FetchError};

/// Refresh state of the engine.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum SyncState {
  #[default]
  Idle,
  Refreshing,
  /// Transient: the engine settles back to `Idle` right after reporting
  RefreshFailed(FetchError),
}

impl SyncState {
  pub fn is_refreshing(&self) -> bool {
    matches!(self, SyncState::Refreshing)
  }
}

/// Where the currently visible articles came from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ViewSource {
  /// Nothing loaded yet
  #[default]
  Empty,
  /// Persisted cache; `cached_at` is when that snapshot was written
  Cache { cached_at: Option<DateTime<Utc>> },
  /// A successful fetch during this session
  Live { fetched_at: DateTime<Utc> },
}

/// What the presentation layer can read at any instant.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedView {
  pub articles: Arc<Vec<DisplayArticle>>,
  pub source: ViewSource,
}

/// Notifications delivered to registered listeners, in order, from one task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
  /// The visible article list changed
  Updated(FeedView),
  /// A refresh failed; fired once per failed fetch
  RefreshFailed(FetchError),
  StateChanged(SyncState),
  /// Network lost. The notice stays up until `Online`.
  Offline,
  Online,
}

/// Result of a refresh as seen by whoever requested it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshOutcome {
  Refreshed { count: usize },
  Failed(FetchError),
  /// The engine stopped before the refresh finished
  Abandoned,
}

/// Resolves when the refresh it was issued for (or the one it was coalesced
/// into) completes. Dropping it does not cancel anything.
#[derive(Debug)]
pub struct RefreshHandle {
  rx: oneshot::Receiver<RefreshOutcome>,
}

impl RefreshHandle {
  pub(crate) fn new(rx: oneshot::Receiver<RefreshOutcome>) -> Self {
    Self { rx }
  }

  pub async fn wait(self) -> RefreshOutcome {
    self.rx.await.unwrap_or(RefreshOutcome::Abandoned)
  }
}
