//! Local key/value store for backend-issued credentials.
//!
//! Only the auth session is persisted here, so that a restart does not
//! require signing in again. Everything else the client knows is held in
//! memory and re-fetched.

use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS kv_store (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

/// SQLite-backed key/value store
pub struct SessionStore {
  conn: Mutex<Connection>,
}

impl SessionStore {
  /// Open or create the store at the default location
  pub fn open() -> Result<Self> {
    let path = Self::default_path()?;

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create data directory: {}", e))?;
    }

    Self::open_at(&path)
  }

  pub fn open_at(path: &Path) -> Result<Self> {
    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open session store at {}: {}", path.display(), e))?;
    Self::with_connection(conn)
  }

  /// Store that disappears with the process, for tests and `--no-persist`
  pub fn in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory session store: {}", e))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(SCHEMA)
      .map_err(|e| eyre!("Failed to run session store migrations: {}", e))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// Get the default database path
  fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("taller").join("session.db"))
  }

  /// Read a value. Failures are logged and read as absent.
  pub fn get(&self, key: &str) -> Option<String> {
    let conn = match self.conn.lock() {
      Ok(conn) => conn,
      Err(e) => {
        tracing::error!("Session store lock poisoned: {}", e);
        return None;
      }
    };

    conn
      .query_row(
        "SELECT value FROM kv_store WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .unwrap_or_else(|e| {
        tracing::error!(key, "Error reading from session store: {}", e);
        None
      })
  }

  pub fn set(&self, key: &str, value: &str) {
    let Ok(conn) = self.conn.lock() else {
      tracing::error!("Session store lock poisoned");
      return;
    };

    if let Err(e) = conn.execute(
      "INSERT OR REPLACE INTO kv_store (key, value, updated_at) VALUES (?, ?, datetime('now'))",
      params![key, value],
    ) {
      tracing::error!(key, "Error writing to session store: {}", e);
    }
  }

  pub fn remove(&self, key: &str) {
    let Ok(conn) = self.conn.lock() else {
      tracing::error!("Session store lock poisoned");
      return;
    };

    if let Err(e) = conn.execute("DELETE FROM kv_store WHERE key = ?", params![key]) {
      tracing::error!(key, "Error removing from session store: {}", e);
    }
  }
}

/// Storage key for the session of a given backend.
///
/// Keys are namespaced by a digest of the backend URL so credentials for
/// different projects never collide.
pub fn session_key(backend_url: &str) -> String {
  let mut hasher = Sha256::new();
  hasher.update(backend_url.trim_end_matches('/').as_bytes());
  let digest = hex::encode(hasher.finalize());
  format!("auth-token-{}", &digest[..16])
}
