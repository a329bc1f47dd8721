// src/storage.rs
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};
use thiserror::Error;

const DB_FILE_NAME: &str = "liftlog.sqlite";
const APP_DATA_DIR: &str = "liftlog"; // Same dir name as config for consistency
const DB_PATH_ENV_VAR: &str = "LIFTLOG_DB_PATH";

/// Keys of the persisted key-value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, Display, EnumIter, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum StorageKey {
    Draft,
    History,
    Prs,
    Profile,
    CustomWorkouts,
    CustomExercises,
    SchemaVersion,
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Storage backend failed: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to get application data directory")]
    DataDir,
    #[error("I/O error accessing storage file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Stored value for '{key}' could not be parsed: {source}")]
    Malformed {
        key: StorageKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize value for '{key}': {source}")]
    Serialize {
        key: StorageKey,
        #[source]
        source: serde_json::Error,
    },
    #[error("Storage quota exceeded writing '{key}' ({needed} bytes needed, {available} available)")]
    QuotaExceeded {
        key: StorageKey,
        needed: usize,
        available: usize,
    },
    #[error("Storage is unavailable")]
    Unavailable,
}

/// Persistent string-valued key-value space.
pub trait KeyValueStore {
    /// # Errors
    /// Returns `StorageError` if the backend cannot be read.
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError>;

    /// Stores `value` under `key`, replacing any previous value.
    /// # Errors
    /// Returns `StorageError` if the write is rejected.
    fn set(&mut self, key: StorageKey, value: &str) -> Result<(), StorageError>;

    /// Removing an absent key is not an error.
    /// # Errors
    /// Returns `StorageError` if the backend cannot be written.
    fn remove(&mut self, key: StorageKey) -> Result<(), StorageError>;
}

/// Reads and deserializes a JSON value.
/// # Errors
/// `StorageError::Malformed` if the stored text is not a valid `T`.
pub fn read_json<T, S>(store: &S, key: StorageKey) -> Result<Option<T>, StorageError>
where
    T: DeserializeOwned,
    S: KeyValueStore + ?Sized,
{
    store
        .get(key)?
        .map(|raw| serde_json::from_str(&raw).map_err(|source| StorageError::Malformed { key, source }))
        .transpose()
}

/// Serializes `value` as JSON and writes it.
/// # Errors
/// Returns `StorageError` on serialization or backend failure.
pub fn write_json<T, S>(store: &mut S, key: StorageKey, value: &T) -> Result<(), StorageError>
where
    T: Serialize + ?Sized,
    S: KeyValueStore + ?Sized,
{
    let payload =
        serde_json::to_string(value).map_err(|source| StorageError::Serialize { key, source })?;
    store.set(key, &payload)
}

// --- In-memory store ---

/// Volatile store with an optional byte quota, mirroring the limits of
/// browser-style storage.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<StorageKey, String>,
    quota_bytes: Option<usize>,
    unavailable: bool,
    writes: usize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_quota(quota_bytes: usize) -> Self {
        Self {
            quota_bytes: Some(quota_bytes),
            ..Self::default()
        }
    }

    /// Makes every subsequent read and write fail with `StorageError::Unavailable`.
    pub fn set_unavailable(&mut self, unavailable: bool) {
        self.unavailable = unavailable;
    }

    /// Number of successful `set` calls.
    pub const fn write_count(&self) -> usize {
        self.writes
    }

    pub fn used_bytes(&self) -> usize {
        self.values.values().map(String::len).sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        Ok(self.values.get(&key).cloned())
    }

    fn set(&mut self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        if let Some(quota) = self.quota_bytes {
            let others = self.used_bytes() - self.values.get(&key).map_or(0, String::len);
            let available = quota.saturating_sub(others);
            if value.len() > available {
                return Err(StorageError::QuotaExceeded {
                    key,
                    needed: value.len(),
                    available,
                });
            }
        }
        self.values.insert(key, value.to_string());
        self.writes += 1;
        Ok(())
    }

    fn remove(&mut self, key: StorageKey) -> Result<(), StorageError> {
        if self.unavailable {
            return Err(StorageError::Unavailable);
        }
        self.values.remove(&key);
        Ok(())
    }
}

// --- SQLite store ---

/// Gets the path to the SQLite database file within the app's data directory.
/// Creates the directory if it doesn't exist.
/// # Errors
/// Returns `StorageError` if no data directory exists or it cannot be created.
pub fn get_db_path() -> Result<PathBuf, StorageError> {
    if let Ok(path) = std::env::var(DB_PATH_ENV_VAR) {
        return Ok(PathBuf::from(path));
    }
    let data_dir = dirs::data_dir().ok_or(StorageError::DataDir)?;
    let app_dir = data_dir.join(APP_DATA_DIR);
    if !app_dir.exists() {
        std::fs::create_dir_all(&app_dir)?;
    }
    Ok(app_dir.join(DB_FILE_NAME))
}

/// Key-value store persisted in a single SQLite table.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    /// Opens (creating if needed) the database at `path`.
    /// # Errors
    /// Returns `StorageError` if the file cannot be opened or the schema created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    /// # Errors
    /// Returns `StorageError` if the schema cannot be created.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, StorageError> {
        init_db(&conn)?;
        Ok(Self { conn })
    }
}

/// Initializes the key-value table if it doesn't exist.
fn init_db(conn: &Connection) -> Result<(), StorageError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL           -- RFC3339, informational only
        )",
        [],
    )?;
    Ok(())
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: StorageKey) -> Result<Option<String>, StorageError> {
        self.conn
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                params![key.as_ref()],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    fn set(&mut self, key: StorageKey, value: &str) -> Result<(), StorageError> {
        self.conn.execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key.as_ref(), value, Utc::now()],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: StorageKey) -> Result<(), StorageError> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key.as_ref()])?;
        Ok(())
    }
}
