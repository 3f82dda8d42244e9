//! SQLite document store with change notification.

use chrono::{DateTime, Utc};
use color_eyre::{eyre::eyre, Result};
use futures::stream::{self, BoxStream, StreamExt};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tracing::debug;

/// A document read back from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument<T> {
  pub key: String,
  pub data: T,
  /// When the document was last written
  pub stored_at: DateTime<Utc>,
}

/// Key-value store of JSON documents backed by SQLite.
///
/// Writes through [`SqliteStore::put`] and [`SqliteStore::remove`] wake every
/// stream returned by [`SqliteStore::watch`] for the same key.
pub struct SqliteStore {
  conn: Mutex<Connection>,
  /// Per-key write counters
  changes: Mutex<HashMap<String, watch::Sender<u64>>>,
}

/// Schema for the document table.
const STORE_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS documents (
    key TEXT PRIMARY KEY,
    data BLOB NOT NULL,
    stored_at TEXT NOT NULL
);
"#;

impl SqliteStore {
  /// Open (or create) a store at `path`.
  pub fn open(path: &Path) -> Result<Self> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create store directory: {}", e))?;
    }

    let conn = Connection::open(path)
      .map_err(|e| eyre!("Failed to open store at {}: {}", path.display(), e))?;

    Self::with_connection(conn)
  }

  /// Open a store at the default location.
  pub fn open_default() -> Result<Self> {
    Self::open(&Self::default_path()?)
  }

  /// Open a private in-memory store.
  pub fn open_in_memory() -> Result<Self> {
    let conn = Connection::open_in_memory()
      .map_err(|e| eyre!("Failed to open in-memory store: {}", e))?;
    Self::with_connection(conn)
  }

  /// Get the default database path.
  pub fn default_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir()
      .or_else(|| dirs::home_dir().map(|p| p.join(".local/share")))
      .ok_or_else(|| eyre!("Could not determine data directory"))?;

    Ok(data_dir.join("boundres").join("store.db"))
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    conn
      .execute_batch(STORE_SCHEMA)
      .map_err(|e| eyre!("Failed to run store migrations: {}", e))?;

    Ok(Self {
      conn: Mutex::new(conn),
      changes: Mutex::new(HashMap::new()),
    })
  }

  fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
    self.conn.lock().map_err(|e| eyre!("Lock poisoned: {}", e))
  }

  /// Store `value` under `key`, replacing any previous document.
  pub fn put<T: Serialize>(&self, key: &str, value: &T) -> Result<()> {
    let data = serde_json::to_vec(value).map_err(|e| eyre!("Failed to serialize document: {}", e))?;
    let stored_at = Utc::now().to_rfc3339();

    self
      .conn()?
      .execute(
        "INSERT OR REPLACE INTO documents (key, data, stored_at) VALUES (?, ?, ?)",
        params![key, data, stored_at],
      )
      .map_err(|e| eyre!("Failed to store document {}: {}", key, e))?;

    debug!(key, bytes = data.len(), "stored document");
    self.notify(key);
    Ok(())
  }

  /// Read the document stored under `key`.
  pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<Option<StoredDocument<T>>> {
    let row: Option<(Vec<u8>, String)> = self
      .conn()?
      .query_row(
        "SELECT data, stored_at FROM documents WHERE key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read document {}: {}", key, e))?;

    match row {
      Some((data, stored_at)) => {
        let data: T = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize document {}: {}", key, e))?;
        Ok(Some(StoredDocument {
          key: key.to_string(),
          data,
          stored_at: parse_datetime(&stored_at)?,
        }))
      }
      None => Ok(None),
    }
  }

  /// Delete the document under `key`. Returns whether one existed.
  pub fn remove(&self, key: &str) -> Result<bool> {
    let removed = self
      .conn()?
      .execute("DELETE FROM documents WHERE key = ?", params![key])
      .map_err(|e| eyre!("Failed to remove document {}: {}", key, e))?;

    if removed > 0 {
      self.notify(key);
    }
    Ok(removed > 0)
  }

  /// Keys of all stored documents, oldest write first.
  pub fn keys(&self) -> Result<Vec<String>> {
    let conn = self.conn()?;
    let mut stmt = conn
      .prepare("SELECT key FROM documents ORDER BY stored_at")
      .map_err(|e| eyre!("Failed to prepare query: {}", e))?;

    let keys = stmt
      .query_map([], |row| row.get(0))
      .map_err(|e| eyre!("Failed to list documents: {}", e))?
      .collect::<rusqlite::Result<Vec<String>>>()
      .map_err(|e| eyre!("Failed to list documents: {}", e))?;

    Ok(keys)
  }

  /// [`SqliteStore::get`] on tokio's blocking pool.
  pub async fn load<T>(self: &Arc<Self>, key: &str) -> Result<Option<StoredDocument<T>>>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let store = Arc::clone(self);
    let key = key.to_string();
    tokio::task::spawn_blocking(move || store.get::<T>(&key))
      .await
      .map_err(|e| eyre!("Store read did not complete: {}", e))?
  }

  /// Observe the document under `key`.
  ///
  /// Emits the current value immediately, then again after every write to
  /// `key`. Writes that land while a read is in progress are coalesced.
  pub fn watch<T>(self: &Arc<Self>, key: &str) -> BoxStream<'static, Result<Option<StoredDocument<T>>>>
  where
    T: DeserializeOwned + Send + 'static,
  {
    let changes = self.subscribe_changes(key);
    let state = (Arc::clone(self), changes, key.to_string(), true);

    stream::unfold(state, |(store, mut changes, key, first)| async move {
      if first {
        changes.borrow_and_update();
      } else if changes.changed().await.is_err() {
        return None;
      }
      let item = store.load::<T>(&key).await;
      Some((item, (store, changes, key, false)))
    })
    .boxed()
  }

  fn subscribe_changes(&self, key: &str) -> watch::Receiver<u64> {
    let mut changes = self
      .changes
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    changes.retain(|_, tx| tx.receiver_count() > 0);
    changes
      .entry(key.to_string())
      .or_insert_with(|| watch::channel(0).0)
      .subscribe()
  }

  fn notify(&self, key: &str) {
    let mut changes = self
      .changes
      .lock()
      .unwrap_or_else(std::sync::PoisonError::into_inner);
    // Keys nobody watches any more are dropped here
    changes.retain(|_, tx| tx.receiver_count() > 0);
    if let Some(tx) = changes.get(key) {
      tx.send_modify(|version| *version += 1);
    }
  }
}

/// Parse a stored RFC 3339 timestamp.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
