//! Cache layer that orchestrates caching logic with network fetching.

use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::storage::{CacheEntry, CacheStorage};
use super::traits::{CacheResult, FetchOptions};
use crate::retry::RetryPolicy;

/// Cache layer that manages caching logic and network fetching.
///
/// This layer sits between the views and the backend client. Clones share
/// the same storage, so one layer per client instance gives exactly one
/// cache map.
///
/// Every `clear`, `invalidate` and `update` bumps a generation counter. A
/// fetch that started under an older generation still returns its result
/// but does not write it back, so a response that raced a write or a
/// sign-out cannot resurrect the data that was just dropped.
#[derive(Clone)]
pub struct CacheLayer {
  storage: Arc<dyn CacheStorage>,
  generation: Arc<AtomicU64>,
  retry: RetryPolicy,
  /// How long a fetched payload stays fresh unless the caller overrides it
  default_duration: Duration,
  cancel: CancellationToken,
}

impl CacheLayer {
  /// Create a new cache layer with the given storage backend.
  pub fn new(storage: impl CacheStorage + 'static) -> Self {
    Self {
      storage: Arc::new(storage),
      generation: Arc::new(AtomicU64::new(0)),
      retry: RetryPolicy::default(),
      default_duration: Duration::from_secs(5 * 60),
      cancel: CancellationToken::new(),
    }
  }

  pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
    self.retry = retry;
    self
  }

  pub fn with_default_duration(mut self, duration: Duration) -> Self {
    self.default_duration = duration;
    self
  }

  /// Retry waits stop early once this token is cancelled.
  pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
    self.cancel = cancel;
    self
  }

  pub fn retry_policy(&self) -> RetryPolicy {
    self.retry
  }

  /// Fetch with a cache-first strategy.
  ///
  /// 1. Unless forced, a fresh entry is returned without calling `fetcher`
  /// 2. Otherwise `fetcher` runs through the retry policy
  /// 3. A success is stored with expiry `now + duration`, `now` being the
  ///    start of the call, and returned
  /// 4. When every attempt fails, any previous entry is returned as a stale
  ///    fallback; with no entry the last error is returned
  pub async fn fetch<T, E, F, Fut>(
    &self,
    key: &str,
    fetcher: F,
    options: FetchOptions,
  ) -> Result<CacheResult<T>, E>
  where
    T: Serialize + DeserializeOwned,
    E: std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
  {
    let now = Instant::now();
    let generation = self.generation.load(Ordering::SeqCst);
    let cached = self.storage.get(key);

    if !options.force_refresh {
      if let Some(entry) = &cached {
        if entry.is_fresh(now) {
          if let Some(data) = decode::<T>(key, entry) {
            return Ok(CacheResult::from_cache(data, entry.written_at));
          }
        }
      }
    }

    match self.retry.run(&self.cancel, fetcher).await {
      Ok(data) => {
        if self.generation.load(Ordering::SeqCst) == generation {
          let duration = options.duration.unwrap_or(self.default_duration);
          self.store(key, &data, now + duration);
        } else {
          tracing::debug!(key, "Cache changed during fetch, not storing result");
        }
        Ok(CacheResult::from_network(data))
      }
      Err(err) => {
        tracing::warn!(key, error = %err, "Fetch failed");
        // Re-read: a concurrent fetch or an edit may have landed meanwhile.
        // The first read only counts if nothing was dropped since.
        let unchanged = self.generation.load(Ordering::SeqCst) == generation;
        let fallback = self
          .storage
          .get(key)
          .or(cached.filter(|_| unchanged));
        if let Some(entry) = fallback {
          if let Some(data) = decode::<T>(key, &entry) {
            tracing::info!(key, "Using cached data as fallback");
            return Ok(CacheResult::stale(data, entry.written_at));
          }
        }
        Err(err)
      }
    }
  }

  /// Drop every cached entry.
  pub fn clear(&self) {
    self.bump();
    self.storage.clear();
  }

  /// Drop the given entries so the next read goes to the network.
  pub fn invalidate(&self, keys: &[&str]) {
    self.bump();
    for key in keys {
      self.storage.remove(key);
    }
  }

  /// Edit a cached payload in place, keeping its expiry. A payload that no
  /// longer decodes as `T` is dropped instead.
  pub fn update<T, F>(&self, key: &str, edit: F)
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&mut T),
  {
    self.bump();
    let Some(entry) = self.storage.get(key) else {
      return;
    };
    let Some(mut data) = decode::<T>(key, &entry) else {
      self.storage.remove(key);
      return;
    };
    edit(&mut data);
    match serde_json::to_value(&data) {
      Ok(value) => self.storage.put(key, CacheEntry { data: value, ..entry }),
      Err(e) => {
        tracing::warn!(key, "Failed to serialize edited payload: {}", e);
        self.storage.remove(key);
      }
    }
  }

  fn bump(&self) {
    self.generation.fetch_add(1, Ordering::SeqCst);
  }

  fn store<T: Serialize>(&self, key: &str, data: &T, expires_at: Instant) {
    match serde_json::to_value(data) {
      Ok(value) => self.storage.put(
        key,
        CacheEntry {
          data: value,
          written_at: Utc::now(),
          expires_at,
        },
      ),
      Err(e) => tracing::warn!(key, "Failed to serialize payload for cache: {}", e),
    }
  }
}

fn decode<T: DeserializeOwned>(key: &str, entry: &CacheEntry) -> Option<T> {
  match serde_json::from_value(entry.data.clone()) {
    Ok(data) => Some(data),
    Err(e) => {
      tracing::warn!(key, "Cached payload has unexpected shape: {}", e);
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::cache::storage::{MemoryStorage, NoopStorage};
  use crate::cache::traits::CacheSource;
  use std::sync::atomic::{AtomicU32, Ordering};

  #[derive(Default)]
  struct FakeBackend {
    calls: AtomicU32,
    failing: std::sync::atomic::AtomicBool,
  }

  impl FakeBackend {
    async fn users(&self) -> Result<Vec<String>, String> {
      let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
      if self.failing.load(Ordering::SeqCst) {
        Err(format!("timeout #{n}"))
      } else {
        Ok(vec![format!("user-{n}")])
      }
    }

    fn calls(&self) -> u32 {
      self.calls.load(Ordering::SeqCst)
    }

    fn fail(&self, failing: bool) {
      self.failing.store(failing, Ordering::SeqCst);
    }
  }

  fn layer() -> CacheLayer {
    CacheLayer::new(MemoryStorage::new())
  }

  #[tokio::test(start_paused = true)]
  async fn test_fresh_entry_skips_network() {
    let cache = layer();
    let backend = FakeBackend::default();

    let first = cache
      .fetch("dashboard-users", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(first.source, CacheSource::Network);

    tokio::time::advance(Duration::from_secs(4 * 60)).await;

    let second = cache
      .fetch("dashboard-users", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(second.source, CacheSource::CacheFresh);
    assert_eq!(second.data, vec!["user-1".to_string()]);
    assert_eq!(backend.calls(), 1);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expired_entry_fetches_once() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("vehicles", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    tokio::time::advance(Duration::from_secs(5 * 60)).await;

    let result = cache
      .fetch("vehicles", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec!["user-2".to_string()]);
    assert_eq!(backend.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_custom_duration() {
    let cache = layer();
    let backend = FakeBackend::default();
    let options = FetchOptions::default().with_duration(Duration::from_secs(10));

    cache.fetch("k", || backend.users(), options).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    cache.fetch("k", || backend.users(), options).await.unwrap();

    assert_eq!(backend.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_force_refresh_bypasses_fresh_entry() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("user-1", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    let forced = cache
      .fetch("user-1", || backend.users(), FetchOptions::forced())
      .await
      .unwrap();

    assert_eq!(forced.source, CacheSource::Network);
    assert_eq!(backend.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_stale_fallback_after_retries() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("repairs-active", || backend.users(), FetchOptions::default())
      .await
      .unwrap();

    tokio::time::advance(Duration::from_secs(6 * 60)).await;
    backend.fail(true);

    let result = cache
      .fetch("repairs-active", || backend.users(), FetchOptions::default())
      .await
      .unwrap();

    assert!(result.is_stale());
    assert_eq!(result.data, vec!["user-1".to_string()]);
    // one initial success plus three failed attempts
    assert_eq!(backend.calls(), 4);
  }

  #[tokio::test(start_paused = true)]
  async fn test_error_without_entry() {
    let cache = layer();
    let backend = FakeBackend::default();
    backend.fail(true);

    let result = cache
      .fetch("history-repairs", || backend.users(), FetchOptions::forced())
      .await;

    assert_eq!(result.unwrap_err(), "timeout #3");
    assert_eq!(backend.calls(), 3);
  }

  #[tokio::test(start_paused = true)]
  async fn test_keys_are_independent() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("a", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    let b = cache
      .fetch("b", || backend.users(), FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(b.source, CacheSource::Network);
    assert_eq!(backend.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_noop_storage_always_fetches() {
    let cache = CacheLayer::new(NoopStorage);
    let backend = FakeBackend::default();

    cache
      .fetch("k", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    cache
      .fetch("k", || backend.users(), FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(backend.calls(), 2);
  }

  #[tokio::test(start_paused = true)]
  async fn test_separate_layers_do_not_share_entries() {
    let first = layer();
    let second = layer();
    let backend = FakeBackend::default();

    first
      .fetch("k", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    let result = second
      .fetch("k", || backend.users(), FetchOptions::default())
      .await
      .unwrap();

    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test(start_paused = true)]
  async fn test_expiry_counts_from_start_of_fetch() {
    let cache = layer();
    let calls = AtomicU32::new(0);
    let flaky = || {
      let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
      async move {
        if n < 3 {
          Err(format!("timeout #{n}"))
        } else {
          Ok(vec![format!("user-{n}")])
        }
      }
    };
    let options = FetchOptions::default().with_duration(Duration::from_secs(10));

    // two failures wait 1s + 2s before the third attempt succeeds
    let started = Instant::now();
    cache.fetch("k", flaky, options).await.unwrap();
    assert!(started.elapsed() >= Duration::from_secs(3));

    // 8s later the entry is 11s old, so it has expired
    tokio::time::advance(Duration::from_secs(8)).await;
    let backend = FakeBackend::default();
    let result = cache
      .fetch("k", || backend.users(), options)
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test(start_paused = true)]
  async fn test_invalidate_forces_network_read() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("history-repairs", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    cache.invalidate(&["history-repairs", "unknown"]);

    let result = cache
      .fetch("history-repairs", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
    assert_eq!(result.data, vec!["user-2".to_string()]);
  }

  #[tokio::test(start_paused = true)]
  async fn test_update_edits_the_fallback_payload() {
    let cache = layer();
    let backend = FakeBackend::default();

    cache
      .fetch("pending-comments", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    cache.update::<Vec<String>, _>("pending-comments", |users| users.clear());

    backend.fail(true);
    let result = cache
      .fetch("pending-comments", || backend.users(), FetchOptions::forced())
      .await
      .unwrap();
    assert!(result.is_stale());
    assert!(result.data.is_empty());
  }

  #[tokio::test(start_paused = true)]
  async fn test_update_without_entry_is_noop() {
    let cache = layer();
    cache.update::<Vec<String>, _>("pending-comments", |users| users.push("x".to_string()));
    let backend = FakeBackend::default();

    let result = cache
      .fetch("pending-comments", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(result.source, CacheSource::Network);
  }

  #[tokio::test(start_paused = true)]
  async fn test_fetch_racing_a_clear_is_not_stored() {
    let cache = layer();
    let slow = || async {
      tokio::time::sleep(Duration::from_secs(2)).await;
      Ok::<_, String>(vec!["previous-user".to_string()])
    };

    let in_flight = {
      let cache = cache.clone();
      tokio::spawn(async move { cache.fetch("dashboard-users", slow, FetchOptions::default()).await })
    };
    tokio::time::sleep(Duration::from_secs(1)).await;
    cache.clear();

    // the caller still gets its answer
    let result = in_flight.await.unwrap().unwrap();
    assert_eq!(result.data, vec!["previous-user".to_string()]);

    let backend = FakeBackend::default();
    let next = cache
      .fetch("dashboard-users", || backend.users(), FetchOptions::default())
      .await
      .unwrap();
    assert_eq!(next.source, CacheSource::Network);
    assert_eq!(next.data, vec!["user-1".to_string()]);
  }
}
