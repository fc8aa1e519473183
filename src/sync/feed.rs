//! Consumer handle for the sync engine.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use crate::connectivity::{ConnectivityMonitor, Transition};
use crate::search::{DisplayArticle, FetchError};

use super::engine::{Command, Shared};
use super::state::{FeedEvent, FeedView, RefreshHandle, SyncState};

/// What the presentation layer holds on to.
///
/// Cheap to clone. The engine stops when `stop` is called or when every
/// handle has been dropped.
#[derive(Clone)]
pub struct ArticleFeed {
  commands: mpsc::UnboundedSender<Command>,
  shared: Arc<Shared>,
  task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ArticleFeed {
  pub(crate) fn new(
    commands: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
  ) -> Self {
    Self {
      commands,
      shared,
      task: Arc::new(Mutex::new(Some(task))),
    }
  }

  /// Articles visible right now. Empty if nothing was ever loaded.
  pub fn current_articles(&self) -> Vec<DisplayArticle> {
    self.shared.view.borrow().articles.as_ref().clone()
  }

  /// Articles plus where they came from.
  pub fn view(&self) -> FeedView {
    self.shared.view.borrow().clone()
  }

  /// Watch the view; every change is observed as a full `FeedView`.
  pub fn watch(&self) -> watch::Receiver<FeedView> {
    self.shared.view.subscribe()
  }

  pub fn state(&self) -> SyncState {
    self.shared.state.borrow().clone()
  }

  /// Whether the offline notice is currently raised.
  pub fn is_offline(&self) -> bool {
    *self.shared.offline.borrow()
  }

  /// Ask for fresh data. Joins the running fetch if there is one.
  pub fn refresh(&self) -> RefreshHandle {
    let (tx, rx) = oneshot::channel();
    if self.commands.send(Command::Refresh(Some(tx))).is_err() {
      tracing::debug!("refresh requested after engine stopped");
    }
    RefreshHandle::new(rx)
  }

  /// Forward a connectivity transition to the engine.
  pub fn connectivity_changed(&self, transition: Transition) {
    let _ = self.commands.send(Command::Connectivity(transition));
  }

  /// Route a monitor's transitions into this engine.
  ///
  /// The monitor only keeps a weak reference, so it does not keep the engine
  /// alive.
  pub fn attach(&self, monitor: &ConnectivityMonitor) {
    let commands = self.commands.downgrade();
    monitor.on_transition(move |transition| {
      if let Some(tx) = commands.upgrade() {
        let _ = tx.send(Command::Connectivity(transition));
      }
    });
  }

  /// Register a listener for every engine event.
  pub fn on_event<F>(&self, callback: F)
  where
    F: Fn(&FeedEvent) + Send + Sync + 'static,
  {
    if let Ok(mut listeners) = self.shared.listeners.lock() {
      listeners.push(Arc::new(callback));
    }
  }

  /// Fires whenever the visible article list changes.
  pub fn on_updated<F>(&self, callback: F)
  where
    F: Fn(&[DisplayArticle]) + Send + Sync + 'static,
  {
    self.on_event(move |event| {
      if let FeedEvent::Updated(view) = event {
        callback(&view.articles);
      }
    });
  }

  /// Fires once per failed fetch.
  pub fn on_refresh_failed<F>(&self, callback: F)
  where
    F: Fn(&FetchError) + Send + Sync + 'static,
  {
    self.on_event(move |event| {
      if let FeedEvent::RefreshFailed(error) = event {
        callback(error);
      }
    });
  }

  /// Stop the engine and wait for it to wind down. In-flight results that
  /// arrive afterwards are discarded. Every clone that calls this waits.
  pub async fn stop(&self) {
    let _ = self.commands.send(Command::Stop);
    let task = self.task.lock().ok().and_then(|mut t| t.take());
    match task {
      Some(task) => {
        if let Err(e) = task.await {
          tracing::warn!("sync engine task ended abnormally: {}", e);
        }
        // Covers a task that died before reaching the end of its loop.
        self.shared.stopped.send_replace(true);
      }
      None => {
        let mut stopped = self.shared.stopped.subscribe();
        let _ = stopped.wait_for(|stopped| *stopped).await;
      }
    }
  }
}
