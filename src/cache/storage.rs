//! Article storage trait with SQLite and in-memory implementations.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::path::Path;
use std::sync::Mutex;

use crate::search::{DisplayArticle, RemoteArticle};

/// Article row as persisted by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CachedArticle {
  /// Assigned by the store on insert; `None` for rows not yet written
  pub id: Option<i64>,
  pub headline: Option<String>,
  pub abstract_text: Option<String>,
  pub byline: Option<String>,
  pub media_image_url: Option<String>,
}

impl CachedArticle {
  pub fn from_remote(article: &RemoteArticle) -> Self {
    Self {
      id: None,
      headline: article.headline.clone(),
      abstract_text: article.abstract_text.clone(),
      byline: article.byline.clone(),
      media_image_url: article.media_image_url.clone(),
    }
  }
}

impl From<&CachedArticle> for DisplayArticle {
  fn from(article: &CachedArticle) -> Self {
    Self {
      headline: article.headline.clone(),
      abstract_text: article.abstract_text.clone(),
      byline: article.byline.clone(),
      media_image_url: article.media_image_url.clone(),
    }
  }
}

/// Complete contents of the store at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheSnapshot {
  /// Articles in the order they were written
  pub articles: Vec<CachedArticle>,
  /// When the current contents were written; `None` when empty after a clear
  pub cached_at: Option<DateTime<Utc>>,
}

impl CacheSnapshot {
  pub fn is_empty(&self) -> bool {
    self.articles.is_empty()
  }
}

/// Errors from the storage layer. Never fatal to the engine.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),

  #[error("storage lock poisoned")]
  Poisoned,

  #[error("storage task failed: {0}")]
  Task(String),

  #[error("invalid stored timestamp '{0}'")]
  Timestamp(String),
}

/// Trait for article storage backends.
///
/// Calls block; callers on the async side run them on the blocking pool.
/// `replace_all` and `clear` must be atomic and return the committed contents.
pub trait ArticleStore: Send + Sync + 'static {
  /// Read the full current contents.
  fn load(&self) -> Result<CacheSnapshot, StorageError>;

  /// Drop every stored article and insert `items` in order.
  fn replace_all(&self, items: &[CachedArticle]) -> Result<CacheSnapshot, StorageError>;

  /// Drop every stored article.
  fn clear(&self) -> Result<CacheSnapshot, StorageError>;
}

/// Store kept only in memory, used when the database cannot be opened.
#[derive(Default)]
pub struct MemoryStore {
  inner: Mutex<(CacheSnapshot, i64)>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }
}

impl ArticleStore for MemoryStore {
  fn load(&self) -> Result<CacheSnapshot, StorageError> {
    let inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
    Ok(inner.0.clone())
  }

  fn replace_all(&self, items: &[CachedArticle]) -> Result<CacheSnapshot, StorageError> {
    let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
    let mut next_id = inner.1;
    let articles = items
      .iter()
      .map(|item| {
        next_id += 1;
        CachedArticle {
          id: Some(next_id),
          ..item.clone()
        }
      })
      .collect();
    *inner = (
      CacheSnapshot {
        articles,
        cached_at: Some(Utc::now()),
      },
      next_id,
    );
    Ok(inner.0.clone())
  }

  fn clear(&self) -> Result<CacheSnapshot, StorageError> {
    let mut inner = self.inner.lock().map_err(|_| StorageError::Poisoned)?;
    inner.0 = CacheSnapshot::default();
    Ok(inner.0.clone())
  }
}

/// SQLite-based article storage.
pub struct SqliteStore {
  conn: Mutex<Connection>,
}

/// Schema for the article cache.
const CACHE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS articles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    headline TEXT,
    abstract TEXT,
    byline TEXT,
    media_image_url TEXT
);

-- Single-row metadata about the current contents
CREATE TABLE IF NOT EXISTS cache_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

const CACHED_AT_KEY: &str = "cached_at";

impl SqliteStore {
  /// Open or create the database at `path`.
  pub fn open(path: &Path) -> Result<Self, StorageError> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)?;
    }

    let conn = Connection::open(path)?;
    Self::with_connection(conn)
  }

  /// Private in-memory database, mostly for tests.
  pub fn open_in_memory() -> Result<Self, StorageError> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self, StorageError> {
    conn.execute_batch(CACHE_SCHEMA)?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  fn read_snapshot(conn: &Connection) -> Result<CacheSnapshot, StorageError> {
    let mut stmt = conn.prepare(
      "SELECT id, headline, abstract, byline, media_image_url FROM articles ORDER BY id",
    )?;

    let articles = stmt
      .query_map([], |row| {
        Ok(CachedArticle {
          id: Some(row.get(0)?),
          headline: row.get(1)?,
          abstract_text: row.get(2)?,
          byline: row.get(3)?,
          media_image_url: row.get(4)?,
        })
      })?
      .collect::<Result<Vec<_>, _>>()?;

    let cached_at: Option<String> = conn
      .query_row(
        "SELECT value FROM cache_meta WHERE key = ?",
        params![CACHED_AT_KEY],
        |row| row.get(0),
      )
      .optional()?;

    let cached_at = cached_at.map(|s| parse_datetime(&s)).transpose()?;

    Ok(CacheSnapshot {
      articles,
      cached_at,
    })
  }

  fn delete_all(tx: &Transaction<'_>) -> Result<(), StorageError> {
    tx.execute("DELETE FROM articles", [])?;
    tx.execute(
      "DELETE FROM cache_meta WHERE key = ?",
      params![CACHED_AT_KEY],
    )?;
    Ok(())
  }
}

impl ArticleStore for SqliteStore {
  fn load(&self) -> Result<CacheSnapshot, StorageError> {
    let conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
    Self::read_snapshot(&conn)
  }

  fn replace_all(&self, items: &[CachedArticle]) -> Result<CacheSnapshot, StorageError> {
    let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
    let tx = conn.transaction()?;

    Self::delete_all(&tx)?;
    {
      let mut insert = tx.prepare(
        "INSERT INTO articles (headline, abstract, byline, media_image_url) VALUES (?, ?, ?, ?)",
      )?;
      for item in items {
        insert.execute(params![
          item.headline,
          item.abstract_text,
          item.byline,
          item.media_image_url
        ])?;
      }
    }
    tx.execute(
      "INSERT OR REPLACE INTO cache_meta (key, value) VALUES (?, ?)",
      params![CACHED_AT_KEY, Utc::now().to_rfc3339()],
    )?;

    let snapshot = Self::read_snapshot(&tx)?;
    tx.commit()?;

    Ok(snapshot)
  }

  fn clear(&self) -> Result<CacheSnapshot, StorageError> {
    let mut conn = self.conn.lock().map_err(|_| StorageError::Poisoned)?;
    let tx = conn.transaction()?;
    Self::delete_all(&tx)?;
    tx.commit()?;
    Ok(CacheSnapshot::default())
  }
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>, StorageError> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|_| StorageError::Timestamp(s.to_string()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use pretty_assertions::assert_eq;

  fn article(headline: &str) -> CachedArticle {
    CachedArticle {
      headline: Some(headline.to_string()),
      abstract_text: Some(format!("{} abstract", headline)),
      ..Default::default()
    }
  }

  fn headlines(snapshot: &CacheSnapshot) -> Vec<&str> {
    snapshot
      .articles
      .iter()
      .filter_map(|a| a.headline.as_deref())
      .collect()
  }

  #[test]
  fn test_new_store_is_empty() {
    let store = SqliteStore::open_in_memory().unwrap();
    let snapshot = store.load().unwrap();
    assert!(snapshot.is_empty());
    assert_eq!(snapshot.cached_at, None);
  }

  #[test]
  fn test_replace_all_preserves_order_and_assigns_ids() {
    let store = SqliteStore::open_in_memory().unwrap();
    let written = store
      .replace_all(&[article("b"), article("a"), article("c")])
      .unwrap();

    assert_eq!(headlines(&written), vec!["b", "a", "c"]);
    assert!(written.articles.iter().all(|a| a.id.is_some()));
    assert!(written.cached_at.is_some());
    assert_eq!(store.load().unwrap(), written);
  }

  #[test]
  fn test_replace_all_replaces_not_merges() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.replace_all(&[article("old-1"), article("old-2")]).unwrap();
    store.replace_all(&[article("new")]).unwrap();

    assert_eq!(headlines(&store.load().unwrap()), vec!["new"]);
  }

  #[test]
  fn test_replace_with_empty_set() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.replace_all(&[article("x")]).unwrap();
    let snapshot = store.replace_all(&[]).unwrap();

    assert!(snapshot.is_empty());
    assert!(snapshot.cached_at.is_some());
  }

  #[test]
  fn test_clear() {
    let store = SqliteStore::open_in_memory().unwrap();
    store.replace_all(&[article("x")]).unwrap();
    store.clear().unwrap();

    assert_eq!(store.load().unwrap(), CacheSnapshot::default());
  }

  #[test]
  fn test_null_fields_round_trip() {
    let store = SqliteStore::open_in_memory().unwrap();
    let snapshot = store.replace_all(&[CachedArticle::default()]).unwrap();
    assert_eq!(
      CachedArticle {
        id: None,
        ..snapshot.articles[0].clone()
      },
      CachedArticle::default()
    );
  }

  #[test]
  fn test_reopen_from_disk() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested").join("cache.db");

    {
      let store = SqliteStore::open(&path).unwrap();
      store.replace_all(&[article("persisted")]).unwrap();
    }

    let store = SqliteStore::open(&path).unwrap();
    assert_eq!(headlines(&store.load().unwrap()), vec!["persisted"]);
  }

  #[test]
  fn test_memory_store_matches_sqlite_semantics() {
    let store = MemoryStore::new();
    let first = store.replace_all(&[article("a"), article("b")]).unwrap();
    let second = store.replace_all(&[article("c")]).unwrap();

    assert_eq!(headlines(&second), vec!["c"]);
    assert!(second.articles[0].id > first.articles[1].id);
    assert!(store.clear().unwrap().is_empty());
    assert!(store.load().unwrap().is_empty());
  }
}
