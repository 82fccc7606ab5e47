//! Cache storage trait and in-memory implementation.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::time::Instant;

/// A single cached payload.
#[derive(Debug, Clone)]
pub struct CacheEntry {
  /// Serialized payload
  pub data: Value,
  /// Wall-clock time the entry was written, for display
  pub written_at: DateTime<Utc>,
  /// Monotonic deadline after which the entry is only usable as a fallback
  pub expires_at: Instant,
}

impl CacheEntry {
  pub fn is_fresh(&self, now: Instant) -> bool {
    now < self.expires_at
  }
}

/// Trait for cache storage backends.
pub trait CacheStorage: Send + Sync {
  /// Get the entry for a key, expired or not.
  fn get(&self, key: &str) -> Option<CacheEntry>;

  /// Store an entry, replacing any previous one. Last write wins.
  fn put(&self, key: &str, entry: CacheEntry);

  fn remove(&self, key: &str);

  /// Drop every entry.
  fn clear(&self);
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn get(&self, _key: &str) -> Option<CacheEntry> {
    None // Always miss
  }

  fn put(&self, _key: &str, _entry: CacheEntry) {}

  fn remove(&self, _key: &str) {}

  fn clear(&self) {}
}

/// Process-local map of entries.
#[derive(Default)]
pub struct MemoryStorage {
  entries: Mutex<HashMap<String, CacheEntry>>,
}

impl MemoryStorage {
  pub fn new() -> Self {
    Self::default()
  }
}

impl CacheStorage for MemoryStorage {
  fn get(&self, key: &str) -> Option<CacheEntry> {
    match self.entries.lock() {
      Ok(entries) => entries.get(key).cloned(),
      Err(e) => {
        tracing::error!(key, "Cache lock poisoned: {}", e);
        None
      }
    }
  }

  fn put(&self, key: &str, entry: CacheEntry) {
    match self.entries.lock() {
      Ok(mut entries) => {
        entries.insert(key.to_string(), entry);
      }
      Err(e) => tracing::error!(key, "Cache lock poisoned: {}", e),
    }
  }

  fn remove(&self, key: &str) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.remove(key);
    }
  }

  fn clear(&self) {
    if let Ok(mut entries) = self.entries.lock() {
      entries.clear();
    }
  }
}
