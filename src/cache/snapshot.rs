//! Reactive view over an [`ArticleStore`].
//!
//! The visible contents are a single `Arc<CacheSnapshot>` behind a watch
//! channel. Writes commit in the store first and only then swap the pointer,
//! so readers see either the old full set or the new full set.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use tokio::sync::{watch, Mutex};

use super::storage::{ArticleStore, CacheSnapshot, CachedArticle, StorageError};

struct Inner {
  store: Arc<dyn ArticleStore>,
  snapshot: watch::Sender<Arc<CacheSnapshot>>,
  /// Serializes writes so snapshots are published in commit order
  write_lock: Mutex<()>,
}

/// Persisted article cache with snapshot subscriptions.
#[derive(Clone)]
pub struct PersistedCache {
  inner: Arc<Inner>,
}

impl PersistedCache {
  /// Wrap a store, reading its current contents.
  ///
  /// A store that cannot be read starts out empty; the failure is logged and
  /// later writes are still attempted.
  pub async fn open(store: Arc<dyn ArticleStore>) -> Self {
    let reader = Arc::clone(&store);
    let initial = match run_blocking(move || reader.load()).await {
      Ok(snapshot) => {
        tracing::debug!("loaded {} cached articles", snapshot.articles.len());
        snapshot
      }
      Err(e) => {
        tracing::warn!("failed to read article cache, starting empty: {}", e);
        CacheSnapshot::default()
      }
    };

    let (snapshot, _) = watch::channel(Arc::new(initial));

    Self {
      inner: Arc::new(Inner {
        store,
        snapshot,
        write_lock: Mutex::new(()),
      }),
    }
  }

  /// The snapshot visible right now.
  pub fn current(&self) -> Arc<CacheSnapshot> {
    self.inner.snapshot.borrow().clone()
  }

  /// Stream of full snapshots.
  ///
  /// Yields the current snapshot immediately, then again after every change.
  /// A slow subscriber skips intermediate snapshots but never sees a partial
  /// one. Each call starts a fresh stream; the stream ends only when every
  /// handle to the cache is dropped.
  pub fn subscribe(&self) -> BoxStream<'static, Arc<CacheSnapshot>> {
    let mut rx = self.inner.snapshot.subscribe();
    rx.mark_changed();

    stream::unfold(rx, |mut rx| async move {
      rx.changed().await.ok()?;
      let snapshot = rx.borrow_and_update().clone();
      Some((snapshot, rx))
    })
    .boxed()
  }

  /// Atomically replace the stored articles with `items`.
  ///
  /// On failure the previous snapshot stays visible and subscribers are not
  /// notified.
  pub async fn replace_all(&self, items: Vec<CachedArticle>) -> Result<(), StorageError> {
    let _guard = self.inner.write_lock.lock().await;
    let store = Arc::clone(&self.inner.store);
    let count = items.len();

    let snapshot = run_blocking(move || store.replace_all(&items))
      .await
      .inspect_err(|e| tracing::warn!("failed to write {} articles to cache: {}", count, e))?;

    tracing::debug!("cache replaced with {} articles", count);
    self.publish(snapshot);
    Ok(())
  }

  /// Atomically empty the store.
  pub async fn clear(&self) -> Result<(), StorageError> {
    let _guard = self.inner.write_lock.lock().await;
    let store = Arc::clone(&self.inner.store);

    let snapshot = run_blocking(move || store.clear())
      .await
      .inspect_err(|e| tracing::warn!("failed to clear cache: {}", e))?;

    tracing::debug!("cache cleared");
    self.publish(snapshot);
    Ok(())
  }

  fn publish(&self, snapshot: CacheSnapshot) {
    self.inner.snapshot.send_replace(Arc::new(snapshot));
  }
}

/// Run a storage call on the blocking pool.
async fn run_blocking<T, F>(f: F) -> Result<T, StorageError>
where
  T: Send + 'static,
  F: FnOnce() -> Result<T, StorageError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|e| StorageError::Task(e.to_string()))?
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStore, SqliteStore};
  use std::time::Duration;

  fn article(headline: &str) -> CachedArticle {
    CachedArticle {
      headline: Some(headline.to_string()),
      ..Default::default()
    }
  }

  /// Store whose writes always fail.
  struct BrokenStore {
    contents: CacheSnapshot,
  }

  impl ArticleStore for BrokenStore {
    fn load(&self) -> Result<CacheSnapshot, StorageError> {
      Ok(self.contents.clone())
    }

    fn replace_all(&self, _items: &[CachedArticle]) -> Result<CacheSnapshot, StorageError> {
      Err(StorageError::Io(std::io::Error::other("disk full")))
    }

    fn clear(&self) -> Result<CacheSnapshot, StorageError> {
      Err(StorageError::Poisoned)
    }
  }

  /// Store whose reads always fail.
  struct UnreadableStore;

  impl ArticleStore for UnreadableStore {
    fn load(&self) -> Result<CacheSnapshot, StorageError> {
      Err(StorageError::Poisoned)
    }

    fn replace_all(&self, items: &[CachedArticle]) -> Result<CacheSnapshot, StorageError> {
      Ok(CacheSnapshot {
        articles: items.to_vec(),
        cached_at: None,
      })
    }

    fn clear(&self) -> Result<CacheSnapshot, StorageError> {
      Ok(CacheSnapshot::default())
    }
  }

  #[tokio::test]
  async fn test_subscribe_emits_current_immediately() {
    let store = Arc::new(SqliteStore::open_in_memory().unwrap());
    store.replace_all(&[article("seed")]).unwrap();

    let cache = PersistedCache::open(store).await;
    let mut stream = cache.subscribe();

    let first = stream.next().await.unwrap();
    assert_eq!(first.articles[0].headline.as_deref(), Some("seed"));
  }

  #[tokio::test]
  async fn test_subscribe_emits_on_change() {
    let cache = PersistedCache::open(Arc::new(MemoryStore::new())).await;
    let mut stream = cache.subscribe();
    assert!(stream.next().await.unwrap().is_empty());

    cache.replace_all(vec![article("a"), article("b")]).await.unwrap();
    let next = stream.next().await.unwrap();
    assert_eq!(next.articles.len(), 2);

    cache.clear().await.unwrap();
    assert!(stream.next().await.unwrap().is_empty());
  }

  #[tokio::test]
  async fn test_subscribe_is_restartable() {
    let cache = PersistedCache::open(Arc::new(MemoryStore::new())).await;
    cache.replace_all(vec![article("a")]).await.unwrap();

    let mut first = cache.subscribe();
    let mut second = cache.subscribe();
    assert_eq!(first.next().await.unwrap().articles.len(), 1);
    drop(first);
    assert_eq!(second.next().await.unwrap().articles.len(), 1);

    let mut third = cache.subscribe();
    assert_eq!(third.next().await.unwrap().articles.len(), 1);
  }

  #[tokio::test]
  async fn test_failed_write_keeps_snapshot_and_is_silent() {
    let contents = CacheSnapshot {
      articles: vec![article("kept")],
      cached_at: None,
    };
    let cache = PersistedCache::open(Arc::new(BrokenStore { contents })).await;
    let mut stream = cache.subscribe();
    stream.next().await.unwrap();

    assert!(cache.replace_all(vec![article("lost")]).await.is_err());
    assert!(cache.clear().await.is_err());
    assert_eq!(cache.current().articles[0].headline.as_deref(), Some("kept"));

    let pending = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
    assert!(pending.is_err(), "no snapshot should be emitted after a failed write");
  }

  #[tokio::test]
  async fn test_unreadable_store_starts_empty() {
    let cache = PersistedCache::open(Arc::new(UnreadableStore)).await;
    assert!(cache.current().is_empty());

    cache.replace_all(vec![article("x")]).await.unwrap();
    assert_eq!(cache.current().articles.len(), 1);
  }

  #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
  async fn test_readers_never_see_mixed_snapshots() {
    let cache = PersistedCache::open(Arc::new(SqliteStore::open_in_memory().unwrap())).await;

    let reader_cache = cache.clone();
    let reader = tokio::spawn(async move {
      let mut stream = reader_cache.subscribe();
      let mut seen = 0;
      while let Some(snapshot) = stream.next().await {
        let tags: std::collections::HashSet<_> =
          snapshot.articles.iter().map(|a| a.headline.clone()).collect();
        assert!(tags.len() <= 1, "mixed snapshot: {:?}", tags);
        if !snapshot.is_empty() {
          assert_eq!(snapshot.articles.len(), 25);
        }
        seen += 1;
        if snapshot.articles.first().and_then(|a| a.headline.as_deref()) == Some("done") {
          break;
        }
      }
      seen
    });

    let mut writers = Vec::new();
    for round in 0..20 {
      let cache = cache.clone();
      writers.push(tokio::spawn(async move {
        let items = (0..25).map(|_| article(&format!("round-{}", round))).collect();
        cache.replace_all(items).await.unwrap();
      }));
    }
    for writer in writers {
      writer.await.unwrap();
    }
    cache
      .replace_all((0..25).map(|_| article("done")).collect())
      .await
      .unwrap();

    let seen = tokio::time::timeout(Duration::from_secs(5), reader)
      .await
      .unwrap()
      .unwrap();
    assert!(seen >= 1);
  }
}
