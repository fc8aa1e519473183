//! Network reachability monitoring.
//!
//! The monitor turns a stream of raw reachability observations (from its own
//! polling probe or reported from outside) into transition events, emitted
//! only when the state actually changes.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
  Available,
  Unavailable,
}

/// A change in reachability.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
  pub state: ConnectivityState,
  /// `None` for the first observation after the monitor is created
  pub previous: Option<ConnectivityState>,
}

impl Transition {
  /// Network came back after having been observed down.
  pub fn is_restored(&self) -> bool {
    self.state == ConnectivityState::Available
      && self.previous == Some(ConnectivityState::Unavailable)
  }
}

/// Something that can tell whether the network is reachable right now.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync + 'static {
  async fn check(&self) -> ConnectivityState;
}

/// Probe that opens (and immediately drops) a TCP connection.
#[derive(Debug, Clone)]
pub struct TcpProbe {
  host: String,
  port: u16,
  timeout: Duration,
}

impl TcpProbe {
  pub fn new(host: impl Into<String>, port: u16, timeout: Duration) -> Self {
    Self {
      host: host.into(),
      port,
      timeout,
    }
  }
}

#[async_trait]
impl ReachabilityProbe for TcpProbe {
  async fn check(&self) -> ConnectivityState {
    let connect = TcpStream::connect((self.host.as_str(), self.port));
    match tokio::time::timeout(self.timeout, connect).await {
      Ok(Ok(_)) => ConnectivityState::Available,
      Ok(Err(e)) => {
        tracing::debug!("probe {}:{} failed: {}", self.host, self.port, e);
        ConnectivityState::Unavailable
      }
      Err(_) => {
        tracing::debug!("probe {}:{} timed out", self.host, self.port);
        ConnectivityState::Unavailable
      }
    }
  }
}

type Listener = Arc<dyn Fn(Transition) + Send + Sync>;

#[derive(Default)]
struct MonitorInner {
  /// Held from the state update through dispatch so listeners see
  /// transitions in the order they were applied
  dispatch: Mutex<()>,
  last: Mutex<Option<ConnectivityState>>,
  listeners: Mutex<Vec<Listener>>,
}

impl MonitorInner {
  fn report(&self, state: ConnectivityState) -> Option<Transition> {
    let _dispatch = self.dispatch.lock().ok()?;
    let transition = {
      let mut last = self.last.lock().ok()?;
      if *last == Some(state) {
        return None;
      }
      let previous = last.replace(state);
      Transition { state, previous }
    };

    tracing::info!("connectivity changed: {:?} -> {:?}", transition.previous, state);

    // Clone out so listeners may register further listeners.
    let listeners: Vec<Listener> = self
      .listeners
      .lock()
      .map(|l| l.clone())
      .unwrap_or_default();
    for listener in listeners {
      listener(transition);
    }
    Some(transition)
  }
}

/// Debounced connectivity monitor with an explicit start/stop lifecycle.
#[derive(Default)]
pub struct ConnectivityMonitor {
  inner: Arc<MonitorInner>,
  task: Mutex<Option<JoinHandle<()>>>,
}

impl ConnectivityMonitor {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register a callback for state changes.
  pub fn on_transition<F>(&self, callback: F)
  where
    F: Fn(Transition) + Send + Sync + 'static,
  {
    if let Ok(mut listeners) = self.inner.listeners.lock() {
      listeners.push(Arc::new(callback));
    }
  }

  /// Last observed state, if any.
  pub fn current(&self) -> Option<ConnectivityState> {
    self.inner.last.lock().ok().and_then(|l| *l)
  }

  /// Feed an observation. Returns the transition if the state changed.
  ///
  /// Concurrent reports are applied one at a time. Listeners must not call
  /// back into `report`.
  pub fn report(&self, state: ConnectivityState) -> Option<Transition> {
    self.inner.report(state)
  }

  /// Start polling `probe` every `interval`. Restarts polling if already running.
  pub fn start<P: ReachabilityProbe>(&self, probe: P, interval: Duration) {
    let inner = Arc::clone(&self.inner);

    let handle = tokio::spawn(async move {
      let mut ticker = tokio::time::interval(interval);
      ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
      loop {
        ticker.tick().await;
        let state = probe.check().await;
        inner.report(state);
      }
    });

    if let Ok(mut task) = self.task.lock() {
      if let Some(previous) = task.replace(handle) {
        previous.abort();
      }
    }
    tracing::debug!("connectivity monitor started ({:?} interval)", interval);
  }

  /// Stop polling. Registered callbacks are kept.
  pub fn stop(&self) {
    if let Ok(mut task) = self.task.lock() {
      if let Some(handle) = task.take() {
        handle.abort();
        tracing::debug!("connectivity monitor stopped");
      }
    }
  }
}

impl Drop for ConnectivityMonitor {
  fn drop(&mut self) {
    self.stop();
  }
}
