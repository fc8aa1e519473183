//! The sync engine actor.
//!
//! One task owns all mutable engine state. Consumer requests, fetch
//! completions, connectivity changes and cache snapshots all arrive at that
//! task and are handled one at a time, so the visible view and every emitted
//! event are serialized.

use chrono::Utc;
use futures::StreamExt;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};

use crate::cache::{CacheSnapshot, CachedArticle, PersistedCache};
use crate::connectivity::{ConnectivityState, Transition};
use crate::search::{ArticleFetcher, DisplayArticle, FetchError, RemoteArticle};
use crate::settings::CachingPreference;

use super::feed::ArticleFeed;
use super::state::{FeedEvent, FeedView, RefreshOutcome, SyncState, ViewSource};

pub(crate) enum Command {
  Refresh(Option<oneshot::Sender<RefreshOutcome>>),
  FetchDone {
    generation: u64,
    result: Result<Vec<RemoteArticle>, FetchError>,
  },
  Connectivity(Transition),
  Stop,
}

pub(crate) type Listener = Arc<dyn Fn(&FeedEvent) + Send + Sync>;

/// State the actor publishes and consumers read.
pub(crate) struct Shared {
  pub(crate) view: watch::Sender<FeedView>,
  pub(crate) state: watch::Sender<SyncState>,
  pub(crate) offline: watch::Sender<bool>,
  /// Flips to `true` once the actor has wound down
  pub(crate) stopped: watch::Sender<bool>,
  pub(crate) listeners: Mutex<Vec<Listener>>,
}

impl Shared {
  fn emit(&self, event: FeedEvent) {
    let listeners: Vec<Listener> = self
      .listeners
      .lock()
      .map(|l| l.clone())
      .unwrap_or_default();
    for listener in listeners {
      listener(&event);
    }
  }
}

struct LiveView {
  articles: Arc<Vec<DisplayArticle>>,
  fetched_at: chrono::DateTime<Utc>,
}

/// Offline-first article sync engine.
pub struct SyncEngine {
  fetcher: Arc<dyn ArticleFetcher>,
  cache: PersistedCache,
  preference: Arc<dyn CachingPreference>,
  shared: Arc<Shared>,
  commands: mpsc::WeakUnboundedSender<Command>,

  /// Bumped for every fetch and on stop; stale completions are dropped
  generation: u64,
  in_flight: Option<u64>,
  waiters: Vec<oneshot::Sender<RefreshOutcome>>,
  cache_snapshot: Arc<CacheSnapshot>,
  /// Result of the latest successful fetch; shadows the cache for the session
  live: Option<LiveView>,
  offline: bool,
}

impl SyncEngine {
  /// Spawn the engine and return the consumer handle.
  ///
  /// The cache's current snapshot is visible immediately, before any fetch.
  pub fn start(
    fetcher: Arc<dyn ArticleFetcher>,
    cache: PersistedCache,
    preference: Arc<dyn CachingPreference>,
  ) -> ArticleFeed {
    let (tx, rx) = mpsc::unbounded_channel();

    let cache_snapshot = cache.current();
    let (view, _) = watch::channel(view_from_cache(&cache_snapshot));
    let (state, _) = watch::channel(SyncState::Idle);
    let (offline, _) = watch::channel(false);
    let (stopped, _) = watch::channel(false);
    let shared = Arc::new(Shared {
      view,
      state,
      offline,
      stopped,
      listeners: Mutex::new(Vec::new()),
    });

    let engine = SyncEngine {
      fetcher,
      cache,
      preference,
      shared: Arc::clone(&shared),
      commands: tx.downgrade(),
      generation: 0,
      in_flight: None,
      waiters: Vec::new(),
      cache_snapshot,
      live: None,
      offline: false,
    };

    let task = tokio::spawn(engine.run(rx));
    tracing::debug!("sync engine started");

    ArticleFeed::new(tx, shared, task)
  }

  async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
    let mut snapshots = self.cache.subscribe();

    loop {
      tokio::select! {
        command = rx.recv() => match command {
          Some(Command::Stop) | None => break,
          Some(command) => self.handle(command).await,
        },
        Some(snapshot) = snapshots.next() => self.apply_cache_snapshot(snapshot),
      }
    }

    // Anything still in flight is now stale.
    self.generation += 1;
    self.in_flight = None;
    for waiter in self.waiters.drain(..) {
      let _ = waiter.send(RefreshOutcome::Abandoned);
    }
    self.shared.stopped.send_replace(true);
    tracing::debug!("sync engine stopped");
  }

  async fn handle(&mut self, command: Command) {
    match command {
      Command::Refresh(waiter) => self.request_refresh(waiter),
      Command::FetchDone { generation, result } => {
        if self.in_flight != Some(generation) {
          tracing::debug!("discarding stale fetch result (generation {})", generation);
          return;
        }
        self.in_flight = None;
        match result {
          Ok(articles) => self.reconcile(articles).await,
          Err(e) => self.fail_refresh(e),
        }
      }
      Command::Connectivity(transition) => self.on_connectivity(transition),
      Command::Stop => {}
    }
  }

  /// Start a fetch unless one is already running, in which case the request
  /// joins it.
  fn request_refresh(&mut self, waiter: Option<oneshot::Sender<RefreshOutcome>>) {
    if let Some(waiter) = waiter {
      self.waiters.push(waiter);
    }

    if let Some(generation) = self.in_flight {
      tracing::debug!("refresh coalesced into in-flight fetch {}", generation);
      return;
    }

    self.generation += 1;
    let generation = self.generation;
    self.in_flight = Some(generation);
    self.set_state(SyncState::Refreshing);

    let fetcher = Arc::clone(&self.fetcher);
    let commands = self.commands.clone();
    tokio::spawn(async move {
      let result = fetcher.fetch().await;
      match commands.upgrade() {
        Some(tx) => {
          let _ = tx.send(Command::FetchDone { generation, result });
        }
        None => tracing::debug!("engine gone, dropping fetch result"),
      }
    });
  }

  async fn reconcile(&mut self, remote: Vec<RemoteArticle>) {
    let count = remote.len();
    tracing::info!("refresh succeeded with {} articles", count);

    self.live = Some(LiveView {
      articles: Arc::new(remote.iter().map(DisplayArticle::from).collect()),
      fetched_at: Utc::now(),
    });
    self.publish_view();

    if self.caching_enabled().await {
      let items = remote.iter().map(CachedArticle::from_remote).collect();
      if let Err(e) = self.cache.replace_all(items).await {
        tracing::warn!("write-through failed, keeping results in memory only: {}", e);
      }
    } else {
      tracing::debug!("caching disabled, skipping write-through");
    }

    self.set_state(SyncState::Idle);
    self.resolve_waiters(RefreshOutcome::Refreshed { count });
  }

  /// Consult the preference on the blocking pool; providers may read files.
  async fn caching_enabled(&self) -> bool {
    let preference = Arc::clone(&self.preference);
    match tokio::task::spawn_blocking(move || preference.cache_enabled()).await {
      Ok(enabled) => enabled,
      Err(e) => {
        tracing::warn!("caching preference check failed, skipping write-through: {}", e);
        false
      }
    }
  }

  fn fail_refresh(&mut self, error: FetchError) {
    tracing::warn!("refresh failed: {}", error);

    self.set_state(SyncState::RefreshFailed(error.clone()));
    self.shared.emit(FeedEvent::RefreshFailed(error.clone()));
    self.set_state(SyncState::Idle);
    self.resolve_waiters(RefreshOutcome::Failed(error));
  }

  fn on_connectivity(&mut self, transition: Transition) {
    match transition.state {
      ConnectivityState::Unavailable => {
        if !self.offline {
          self.offline = true;
          self.shared.offline.send_replace(true);
          self.shared.emit(FeedEvent::Offline);
        }
      }
      ConnectivityState::Available => {
        if self.offline {
          self.offline = false;
          self.shared.offline.send_replace(false);
          self.shared.emit(FeedEvent::Online);
        }
        if transition.is_restored() {
          tracing::info!("network restored, refreshing");
          self.request_refresh(None);
        }
      }
    }
  }

  fn apply_cache_snapshot(&mut self, snapshot: Arc<CacheSnapshot>) {
    if Arc::ptr_eq(&snapshot, &self.cache_snapshot) {
      return;
    }
    tracing::debug!("cache snapshot with {} articles", snapshot.articles.len());
    self.cache_snapshot = snapshot;
    self.publish_view();
  }

  /// Recompute the visible view; emit `Updated` if the article list changed.
  fn publish_view(&self) {
    let next = match &self.live {
      Some(live) => FeedView {
        articles: Arc::clone(&live.articles),
        source: ViewSource::Live {
          fetched_at: live.fetched_at,
        },
      },
      None => view_from_cache(&self.cache_snapshot),
    };

    let mut articles_changed = false;
    self.shared.view.send_if_modified(|current| {
      if *current == next {
        return false;
      }
      articles_changed = current.articles != next.articles;
      *current = next.clone();
      true
    });

    if articles_changed {
      self.shared.emit(FeedEvent::Updated(next));
    }
  }

  fn set_state(&self, state: SyncState) {
    self.shared.state.send_replace(state.clone());
    self.shared.emit(FeedEvent::StateChanged(state));
  }

  fn resolve_waiters(&mut self, outcome: RefreshOutcome) {
    for waiter in self.waiters.drain(..) {
      let _ = waiter.send(outcome.clone());
    }
  }
}

fn view_from_cache(snapshot: &CacheSnapshot) -> FeedView {
  if snapshot.is_empty() && snapshot.cached_at.is_none() {
    return FeedView::default();
  }
  FeedView {
    articles: Arc::new(snapshot.articles.iter().map(DisplayArticle::from).collect()),
    source: ViewSource::Cache {
      cached_at: snapshot.cached_at,
    },
  }
}
