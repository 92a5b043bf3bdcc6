//! kbrowse persistence: durable key/value settings and typed configs on top.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::collections::BTreeMap;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use kbrowse_core::{BrowseError, BrowseResult};
use metrics::{counter, histogram};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

/// Durable string storage keyed by string.
pub trait KvStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn put(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// Key under which a kind's column layout is stored.
pub fn column_config_key(resource_type: &str) -> String {
    format!("{}.columnConfig", resource_type)
}

/// Key for per-cluster integration settings, e.g. `prod.opencostConfig`.
pub fn feature_key(cluster: &str, feature: &str) -> String {
    format!("{}.{}Config", cluster, feature)
}

/// SQLite-backed store. Simple, synchronous; settings writes are rare.
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> Result<Self> {
        let path = std::env::var("KBROWSE_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> Result<Self> {
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        Self::init(db)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory().context("opening in-memory sqlite db")?)
    }

    fn init(db: rusqlite::Connection) -> Result<Self> {
        let started = std::time::Instant::now();
        db.execute(
            "CREATE TABLE IF NOT EXISTS settings (
                key   TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL,
                ts    INTEGER NOT NULL
            )",
            [],
        )
        .context("creating settings table")?;
        histogram!("persist_open_ms", started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>> {
        self.db.lock().map_err(|_| anyhow!("settings db mutex poisoned"))
    }
}

impl KvStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let db = self.conn()?;
        let mut stmt = db.prepare("SELECT value FROM settings WHERE key = ?1")?;
        let mut rows = stmt.query([key])?;
        let value = match rows.next()? {
            Some(row) => Some(row.get(0)?),
            None => None,
        };
        Ok(value)
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO settings(key, value, ts) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, ts = excluded.ts",
            (key, value, now_ts()),
        )
        .with_context(|| format!("writing setting {}", key))?;
        histogram!("persist_put_ms", started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total", 1u64);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let db = self.conn()?;
        db.execute("DELETE FROM settings WHERE key = ?1", [key])
            .with_context(|| format!("removing setting {}", key))?;
        Ok(())
    }
}

/// Process-local store for tests and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<BTreeMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KvStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let map = self.map.lock().map_err(|_| anyhow!("memory store mutex poisoned"))?;
        Ok(map.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("memory store mutex poisoned"))?;
        map.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut map = self.map.lock().map_err(|_| anyhow!("memory store mutex poisoned"))?;
        map.remove(key);
        Ok(())
    }
}

/// A JSON value of type `T` stored under one key.
///
/// `load` never fails: a missing key, an unreadable store or a stale payload
/// that no longer parses all fall back to the provided default.
pub struct Config<T> {
    store: Arc<dyn KvStore>,
    key: String,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Config<T> {
    fn clone(&self) -> Self {
        Self { store: Arc::clone(&self.store), key: self.key.clone(), _marker: PhantomData }
    }
}

impl<T: Serialize + DeserializeOwned> Config<T> {
    pub fn new(store: Arc<dyn KvStore>, key: impl Into<String>) -> Self {
        Self { store, key: key.into(), _marker: PhantomData }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn load(&self, default: T) -> T {
        let raw = match self.store.get(&self.key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return default,
            Err(e) => {
                warn!(key = %self.key, error = ?e, "settings read failed; using default");
                return default;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(v) => v,
            Err(e) => {
                warn!(key = %self.key, error = %e, "stored settings do not parse; using default");
                default
            }
        }
    }

    pub fn save(&self, value: &T) -> BrowseResult<()> {
        let raw = serde_json::to_string(value).map_err(|e| BrowseError::Storage(e.to_string()))?;
        self.store.put(&self.key, &raw).map_err(|e| BrowseError::Storage(format!("{:#}", e)))?;
        debug!(key = %self.key, bytes = raw.len(), "settings saved");
        Ok(())
    }

    pub fn clear(&self) -> BrowseResult<()> {
        self.store.remove(&self.key).map_err(|e| BrowseError::Storage(format!("{:#}", e)))
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".kbrowse");
        let _ = std::fs::create_dir_all(&p);
        p.push("kbrowse.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "kbrowse.db".to_string()
}

pub fn now_ts() -> i64 {
    // seconds since epoch
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}
