//! Backend reachability tracking.
//!
//! [`ConnectionMonitor`] probes the backend's liveness endpoint on a fixed
//! interval and publishes the result. [`ConnectionTracker`] turns that raw
//! flag into what the UI shows: an online indicator, a short "reconnecting"
//! phase after coming back, and a transient notice after every change.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, Notify};
use tokio::time::{interval, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::BackendClient;

/// How long the "reconnecting" flag stays up after coming back online
pub const RECONNECTING_FOR: Duration = Duration::from_secs(1);
/// How long the connection notice stays visible after a change
pub const NOTICE_FOR: Duration = Duration::from_secs(3);

pub trait LivenessProbe: Send + Sync + 'static {
  fn is_reachable(&self) -> impl Future<Output = bool> + Send;
}

impl LivenessProbe for BackendClient {
  async fn is_reachable(&self) -> bool {
    self.ping().await
  }
}

/// Message shown in the connection notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionNotice {
  Offline,
  Reconnecting,
  Restored,
}

impl ConnectionNotice {
  pub fn message(&self) -> &'static str {
    match self {
      ConnectionNotice::Offline => "No connection",
      ConnectionNotice::Reconnecting => "Reconnecting...",
      ConnectionNotice::Restored => "Connection restored",
    }
  }
}

#[derive(Debug, Clone)]
pub struct ConnectionTracker {
  online: bool,
  reconnecting_until: Option<Instant>,
  notice_until: Option<Instant>,
}

impl Default for ConnectionTracker {
  fn default() -> Self {
    Self::new(true)
  }
}

impl ConnectionTracker {
  pub fn new(online: bool) -> Self {
    Self {
      online,
      reconnecting_until: None,
      notice_until: None,
    }
  }

  /// Record a reachability observation. Returns `true` on a transition.
  pub fn observe(&mut self, reachable: bool, now: Instant) -> bool {
    if reachable == self.online {
      return false;
    }

    self.online = reachable;
    self.notice_until = Some(now + NOTICE_FOR);
    self.reconnecting_until = reachable.then_some(now + RECONNECTING_FOR);
    true
  }

  pub fn is_online(&self) -> bool {
    self.online
  }

  pub fn is_reconnecting(&self, now: Instant) -> bool {
    self.online && self.reconnecting_until.is_some_and(|until| now < until)
  }

  /// The notice to display at `now`, if any
  pub fn notice(&self, now: Instant) -> Option<ConnectionNotice> {
    let until = self.notice_until?;
    if now >= until {
      return None;
    }
    Some(if !self.online {
      ConnectionNotice::Offline
    } else if self.is_reconnecting(now) {
      ConnectionNotice::Reconnecting
    } else {
      ConnectionNotice::Restored
    })
  }
}

/// Periodic liveness probe. Dropping the monitor stops it.
pub struct ConnectionMonitor {
  rx: watch::Receiver<bool>,
  recheck: Arc<Notify>,
  cancel: CancellationToken,
}

impl ConnectionMonitor {
  /// Start probing; the first probe runs immediately.
  pub fn spawn<P: LivenessProbe>(probe: Arc<P>, every: Duration) -> Self {
    let (tx, rx) = watch::channel(true);
    let recheck = Arc::new(Notify::new());
    let cancel = CancellationToken::new();

    tokio::spawn(run(probe, every, tx, recheck.clone(), cancel.clone()));

    Self {
      rx,
      recheck,
      cancel,
    }
  }

  /// Probe again without waiting for the next tick.
  pub fn recheck(&self) {
    self.recheck.notify_one();
  }

  /// Receiver for the latest probe result
  pub fn subscribe(&self) -> watch::Receiver<bool> {
    self.rx.clone()
  }

  /// The latest result if it changed since the last call.
  pub fn changed(&mut self) -> Option<bool> {
    match self.rx.has_changed() {
      Ok(true) => Some(*self.rx.borrow_and_update()),
      _ => None,
    }
  }
}

impl Drop for ConnectionMonitor {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

async fn run<P: LivenessProbe>(
  probe: Arc<P>,
  every: Duration,
  tx: watch::Sender<bool>,
  recheck: Arc<Notify>,
  cancel: CancellationToken,
) {
  let mut ticker = interval(every);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ticker.tick() => {}
      _ = recheck.notified() => {}
    }

    let reachable = probe.is_reachable().await;
    let changed = tx.send_if_modified(|current| {
      if *current != reachable {
        *current = reachable;
        true
      } else {
        false
      }
    });
    if changed {
      if reachable {
        tracing::info!("Backend reachable again");
      } else {
        tracing::warn!("Backend unreachable");
      }
    }
  }
}
