//! Background session keepalive.
//!
//! Two timers run for the life of the process: one re-validates the auth
//! session every few minutes, the other checks that the backend still
//! answers, but only while the terminal is unfocused. Focus and network
//! changes are pushed in through a [`KeepaliveHandle`] and trigger an
//! immediate check.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::backend::client::TableQuery;
use crate::backend::BackendClient;
use crate::config::Config;
use crate::retry::RetryPolicy;

/// What the keepalive loop needs from the backend
pub trait KeepaliveTarget: Send + Sync + 'static {
  /// Refresh the session if it expires within `margin`. Returns whether a
  /// usable session exists afterwards.
  fn refresh_if_expiring(&self, margin: chrono::Duration) -> impl Future<Output = bool> + Send;

  /// Minimal authenticated read against the backend
  fn probe(&self) -> impl Future<Output = bool> + Send;
}

impl KeepaliveTarget for BackendClient {
  async fn refresh_if_expiring(&self, margin: chrono::Duration) -> bool {
    self.ensure_fresh_session(margin).await
  }

  async fn probe(&self) -> bool {
    let query = TableQuery::from("system_settings").select("key").limit(1);
    match self.select::<serde_json::Value>(&query).await {
      Ok(_) => true,
      Err(e) => {
        tracing::debug!("Keepalive probe failed: {}", e);
        false
      }
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveSettings {
  pub ping_interval: Duration,
  pub auth_refresh_interval: Duration,
  pub refresh_margin: chrono::Duration,
  pub retry: RetryPolicy,
}

impl Default for KeepaliveSettings {
  fn default() -> Self {
    Self {
      ping_interval: Duration::from_secs(30),
      auth_refresh_interval: Duration::from_secs(4 * 60),
      refresh_margin: chrono::Duration::minutes(5),
      retry: RetryPolicy::default(),
    }
  }
}

impl KeepaliveSettings {
  pub fn from_config(config: &Config) -> Self {
    Self {
      ping_interval: Duration::from_secs(config.keepalive.ping_interval_secs),
      auth_refresh_interval: Duration::from_secs(config.keepalive.auth_refresh_interval_secs),
      refresh_margin: chrono::Duration::seconds(config.keepalive.refresh_margin_secs as i64),
      retry: config.retry_policy(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
  Backgrounded(bool),
  NetworkChanged(bool),
}

/// Control handle for the keepalive task. Dropping it stops the task.
pub struct KeepaliveHandle {
  tx: mpsc::UnboundedSender<Signal>,
  cancel: CancellationToken,
  task: Option<JoinHandle<()>>,
}

impl KeepaliveHandle {
  /// The terminal lost (`true`) or regained (`false`) focus.
  pub fn set_backgrounded(&self, backgrounded: bool) {
    let _ = self.tx.send(Signal::Backgrounded(backgrounded));
  }

  /// Backend reachability flipped.
  pub fn network_changed(&self, online: bool) {
    let _ = self.tx.send(Signal::NetworkChanged(online));
  }

  /// Stop the timers and wait for the task to finish.
  pub async fn shutdown(mut self) {
    self.cancel.cancel();
    if let Some(task) = self.task.take() {
      let _ = task.await;
    }
  }
}

impl Drop for KeepaliveHandle {
  fn drop(&mut self) {
    self.cancel.cancel();
  }
}

/// Start the keepalive loop for `target`.
pub fn spawn<T: KeepaliveTarget>(target: Arc<T>, settings: KeepaliveSettings) -> KeepaliveHandle {
  let (tx, rx) = mpsc::unbounded_channel();
  let cancel = CancellationToken::new();
  let task = tokio::spawn(run(target, settings, rx, cancel.clone()));

  KeepaliveHandle {
    tx,
    cancel,
    task: Some(task),
  }
}

async fn run<T: KeepaliveTarget>(
  target: Arc<T>,
  settings: KeepaliveSettings,
  mut rx: mpsc::UnboundedReceiver<Signal>,
  cancel: CancellationToken,
) {
  tracing::info!(
    ping_secs = settings.ping_interval.as_secs(),
    refresh_secs = settings.auth_refresh_interval.as_secs(),
    "Keepalive started"
  );

  let now = Instant::now();
  let mut ping = interval_at(now + settings.ping_interval, settings.ping_interval);
  ping.set_missed_tick_behavior(MissedTickBehavior::Delay);
  let mut refresh = interval_at(
    now + settings.auth_refresh_interval,
    settings.auth_refresh_interval,
  );
  refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);

  let mut backgrounded = false;

  loop {
    tokio::select! {
      _ = cancel.cancelled() => break,
      _ = ping.tick() => {
        if backgrounded {
          keep_alive(&*target, &settings, &cancel).await;
        }
      }
      _ = refresh.tick() => {
        target.refresh_if_expiring(settings.refresh_margin).await;
      }
      signal = rx.recv() => match signal {
        Some(Signal::Backgrounded(value)) => {
          backgrounded = value;
          tracing::debug!(backgrounded, "Focus changed");
          if !backgrounded {
            check_connection(&*target, &settings).await;
          }
        }
        Some(Signal::NetworkChanged(online)) => {
          if online {
            tracing::info!("Connection restored, checking backend");
          } else {
            tracing::warn!("Connection lost, waiting to reconnect");
          }
          check_connection(&*target, &settings).await;
        }
        None => break,
      },
    }
  }

  tracing::info!("Keepalive stopped");
}

/// Session check followed by a minimal read.
async fn check_connection<T: KeepaliveTarget>(target: &T, settings: &KeepaliveSettings) -> bool {
  if !target.refresh_if_expiring(settings.refresh_margin).await {
    return false;
  }
  target.probe().await
}

async fn keep_alive<T: KeepaliveTarget>(
  target: &T,
  settings: &KeepaliveSettings,
  cancel: &CancellationToken,
) {
  if check_connection(target, settings).await {
    return;
  }

  tracing::info!("Reconnecting to backend");
  let result = settings
    .retry
    .run(cancel, || async {
      if check_connection(target, settings).await {
        Ok(())
      } else {
        Err("backend unreachable")
      }
    })
    .await;
  if let Err(e) = result {
    tracing::warn!("Keepalive gave up: {}", e);
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

  struct FakeTarget {
    refreshes: AtomicU32,
    probes: AtomicU32,
    session: AtomicBool,
    reachable: AtomicBool,
  }

  impl FakeTarget {
    fn new() -> Arc<Self> {
      Arc::new(Self {
        refreshes: AtomicU32::new(0),
        probes: AtomicU32::new(0),
        session: AtomicBool::new(true),
        reachable: AtomicBool::new(true),
      })
    }

    fn refreshes(&self) -> u32 {
      self.refreshes.load(Ordering::SeqCst)
    }

    fn probes(&self) -> u32 {
      self.probes.load(Ordering::SeqCst)
    }
  }

  impl KeepaliveTarget for FakeTarget {
    async fn refresh_if_expiring(&self, _margin: chrono::Duration) -> bool {
      self.refreshes.fetch_add(1, Ordering::SeqCst);
      self.session.load(Ordering::SeqCst)
    }

    async fn probe(&self) -> bool {
      self.probes.fetch_add(1, Ordering::SeqCst);
      self.reachable.load(Ordering::SeqCst)
    }
  }

  async fn wait(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_pings_while_focused() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    wait(3 * 30 + 5).await;
    assert_eq!(target.probes(), 0);
    assert_eq!(target.refreshes(), 0);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_session_refreshed_every_four_minutes() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    wait(4 * 60 + 1).await;
    assert_eq!(target.refreshes(), 1);
    wait(4 * 60).await;
    assert_eq!(target.refreshes(), 2);
    assert_eq!(target.probes(), 0);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_pings_while_backgrounded() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    handle.set_backgrounded(true);
    wait(31).await;
    assert_eq!(target.probes(), 1);
    wait(30).await;
    assert_eq!(target.probes(), 2);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_regaining_focus_checks_immediately() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    handle.set_backgrounded(true);
    wait(1).await;
    handle.set_backgrounded(false);
    wait(1).await;

    assert_eq!(target.refreshes(), 1);
    assert_eq!(target.probes(), 1);

    // back in the foreground, the ping timer is idle again
    wait(60).await;
    assert_eq!(target.probes(), 1);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_network_change_triggers_check() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    handle.network_changed(true);
    wait(1).await;
    assert_eq!(target.refreshes(), 1);
    assert_eq!(target.probes(), 1);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_unreachable_backend_is_retried() {
    let target = FakeTarget::new();
    target.reachable.store(false, Ordering::SeqCst);
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    handle.set_backgrounded(true);
    // first tick at 30s, then retries after 1s and 2s
    wait(30 + 4).await;
    assert_eq!(target.probes(), 4);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_no_session_skips_probe() {
    let target = FakeTarget::new();
    target.session.store(false, Ordering::SeqCst);
    let handle = spawn(target.clone(), KeepaliveSettings::default());

    handle.network_changed(false);
    wait(1).await;
    assert_eq!(target.refreshes(), 1);
    assert_eq!(target.probes(), 0);

    handle.shutdown().await;
  }

  #[tokio::test(start_paused = true)]
  async fn test_drop_stops_timers() {
    let target = FakeTarget::new();
    let handle = spawn(target.clone(), KeepaliveSettings::default());
    drop(handle);

    wait(10 * 60).await;
    assert_eq!(target.refreshes(), 0);
  }
}
