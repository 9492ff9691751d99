use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, warn};

use crate::models::{Job, Resume};

pub const JOBS_KEY: &str = "jobsearch_jobs";
pub const RESUME_KEY: &str = "jobsearch_resume";

/// Version written into every record envelope. Bare records are version 0.
pub const FORMAT_VERSION: u64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to serialize record '{key}': {source}")]
    Serialize {
        key: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Text key-value persistence. Writes overwrite unconditionally.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
}

// --- SQLite backend ---

pub struct SqliteStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl SqliteStore {
    pub fn open() -> Result<Self, StoreError> {
        Self::open_at(&Self::default_path())
    }

    pub fn open_at(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        let store = Self {
            conn,
            path: Some(path.to_path_buf()),
        };
        store.init()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, StoreError> {
        let store = Self {
            conn: Connection::open_in_memory()?,
            path: None,
        };
        store.init()?;
        Ok(store)
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn default_path() -> PathBuf {
        // XDG data directory, or the working directory when none is available
        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "jobpilot") {
            proj_dirs.data_dir().join("jobpilot.db")
        } else {
            PathBuf::from("jobpilot.db")
        }
    }

    fn init(&self) -> Result<(), StoreError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );
            "#,
        )?;
        Ok(())
    }
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }
}

// --- In-memory backend ---

#[cfg(test)]
pub use memory::MemoryStore;


// --- Record adapter ---

#[derive(Serialize)]
struct Envelope<'a, T> {
    version: u64,
    data: &'a T,
}

/// Reads and writes the `jobs` and `resume` records over a key-value backend.
pub struct StoreAdapter<S> {
    backend: S,
}

impl<S: KeyValueStore> StoreAdapter<S> {
    pub fn new(backend: S) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &S {
        &self.backend
    }

    /// Loads both records. Missing, unreadable or unparseable records fall
    /// back to their empty defaults; nothing here is surfaced as an error.
    pub fn load(&self) -> (Vec<Job>, Resume) {
        let jobs = self.load_record::<Vec<Job>>(JOBS_KEY).unwrap_or_default();
        let resume = self.load_record::<Resume>(RESUME_KEY).unwrap_or_default();
        debug!("Loaded {} job(s) from store", jobs.len());
        (jobs, resume)
    }

    pub fn save_jobs(&self, jobs: &[Job]) -> Result<(), StoreError> {
        self.save_record(JOBS_KEY, &jobs)
    }

    pub fn save_resume(&self, resume: &Resume) -> Result<(), StoreError> {
        self.save_record(RESUME_KEY, resume)
    }

    fn load_record<T: DeserializeOwned>(&self, key: &'static str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read record '{}': {}", key, e);
                return None;
            }
        };
        match decode_record(&raw) {
            Ok(record) => Some(record),
            Err(e) => {
                warn!("Discarding unparseable record '{}': {}", key, e);
                None
            }
        }
    }

    fn save_record<T: Serialize>(&self, key: &'static str, data: &T) -> Result<(), StoreError> {
        let text = serde_json::to_string(&Envelope {
            version: FORMAT_VERSION,
            data,
        })
        .map_err(|source| StoreError::Serialize { key, source })?;
        self.backend.set(key, &text)
    }
}

/// Unwraps a versioned envelope, or treats the whole value as a version 0 record.
fn decode_record<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    let value: Value = serde_json::from_str(raw)?;
    let (version, data) = split_envelope(value);
    if version > FORMAT_VERSION {
        warn!(
            "Record has format version {} (newer than {}), reading best-effort",
            version, FORMAT_VERSION
        );
    }
    serde_json::from_value(data)
}

fn split_envelope(value: Value) -> (u64, Value) {
    match value {
        Value::Object(mut map) if map.len() == 2 && map.contains_key("data") => {
            match map.get("version").and_then(Value::as_u64) {
                Some(version) => {
                    let data = map.remove("data").unwrap_or(Value::Null);
                    (version, data)
                }
                None => (0, Value::Object(map)),
            }
        }
        other => (0, other),
    }
}
