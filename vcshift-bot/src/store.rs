//! Persistent lobby configuration.
//!
//! The whole mapping `lobby channel id → LobbyConfig` is loaded once at
//! startup and rewritten in full after every mutation. Storage failures never
//! take the bot down: a failed load falls back to an empty mapping, a failed
//! save leaves the in-memory copy ahead of the durable one.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension};
use serde::{Deserialize, Deserializer, Serialize};

use crate::orchestrator::MAX_USER_LIMIT;

/// Transfer settings for one lobby channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LobbyConfig {
    /// Name prefix for generated channels.
    pub base_name: String,
    /// Capacity of generated channels, 0..=99; 0 is unlimited.
    #[serde(default, deserialize_with = "clamped_limit")]
    pub user_limit: u32,
}

/// Hand-edited documents may carry out-of-range limits; pull them into 0..=99.
fn clamped_limit<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u32, D::Error> {
    let raw = i64::deserialize(deserializer)?;
    Ok(raw.clamp(0, MAX_USER_LIMIT) as u32)
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("stored mapping is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
}

/// Where the serialized mapping lives.
pub trait StorageBackend: Send + Sync {
    /// Read the stored document. `Ok(None)` means nothing has been stored yet.
    fn read(&self) -> Result<Option<String>, StoreError>;
    /// Replace the stored document.
    fn write(&self, contents: &str) -> Result<(), StoreError>;
}

/// Pretty-printed JSON file.
pub struct JsonFileBackend {
    path: PathBuf,
}

impl JsonFileBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl StorageBackend for JsonFileBackend {
    fn read(&self) -> Result<Option<String>, StoreError> {
        match std::fs::read_to_string(&self.path) {
            Ok(s) => Ok(Some(s)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
        {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&self.path, contents)?;
        Ok(())
    }
}

/// Single-row SQLite table holding the JSON document.
pub struct SqliteBackend {
    db: Mutex<Connection>,
}

impl SqliteBackend {
    /// Open or create the database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let db = Connection::open(path)?;
        db.execute_batch(
            "PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS kv (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );",
        )?;
        Ok(Self { db: Mutex::new(db) })
    }

    /// Open an in-memory database (for testing).
    pub fn in_memory() -> Result<Self, StoreError> {
        Self::open(Path::new(":memory:"))
    }
}

const LOBBIES_KEY: &str = "lobbies";

impl StorageBackend for SqliteBackend {
    fn read(&self) -> Result<Option<String>, StoreError> {
        let db = self.db.lock();
        let value = db
            .query_row(
                "SELECT value FROM kv WHERE key = ?1",
                rusqlite::params![LOBBIES_KEY],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        let db = self.db.lock();
        db.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            rusqlite::params![LOBBIES_KEY, contents],
        )?;
        Ok(())
    }
}

/// In-memory backend for tests. Writes can be made to fail.
#[derive(Default)]
pub struct MemoryBackend {
    contents: Mutex<Option<String>>,
    fail_writes: Mutex<bool>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_contents(contents: impl Into<String>) -> Self {
        Self {
            contents: Mutex::new(Some(contents.into())),
            fail_writes: Mutex::new(false),
        }
    }

    pub fn set_fail_writes(&self, fail: bool) {
        *self.fail_writes.lock() = fail;
    }

    pub fn contents(&self) -> Option<String> {
        self.contents.lock().clone()
    }
}

impl StorageBackend for MemoryBackend {
    fn read(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents.lock().clone())
    }

    fn write(&self, contents: &str) -> Result<(), StoreError> {
        if *self.fail_writes.lock() {
            return Err(std::io::Error::other("write refused").into());
        }
        *self.contents.lock() = Some(contents.to_string());
        Ok(())
    }
}

/// Parse the stored mapping entry by entry. A malformed entry is logged and
/// skipped; only a document that is not a JSON object fails as a whole.
fn parse_document(raw: &str) -> Result<BTreeMap<String, LobbyConfig>, StoreError> {
    let entries: BTreeMap<String, serde_json::Value> = serde_json::from_str(raw)?;
    let mut map = BTreeMap::new();
    for (channel_id, value) in entries {
        match serde_json::from_value::<LobbyConfig>(value) {
            Ok(config) => {
                map.insert(channel_id, config);
            }
            Err(e) => tracing::warn!(lobby = %channel_id, error = %e, "Skipping malformed lobby entry"),
        }
    }
    Ok(map)
}

/// Lobby configurations, cached in memory over a [`StorageBackend`].
pub struct ConfigStore {
    backend: Box<dyn StorageBackend>,
    cache: Mutex<BTreeMap<String, LobbyConfig>>,
}

impl ConfigStore {
    /// Create an empty store over `backend`. Call [`ConfigStore::load`] to read it.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            cache: Mutex::new(BTreeMap::new()),
        }
    }

    /// Create a store and load it in one step.
    pub fn open(backend: Box<dyn StorageBackend>) -> Self {
        let store = Self::new(backend);
        store.load();
        store
    }

    /// Read the persisted mapping into memory.
    ///
    /// A missing document is initialized to `{}` and written back. Read or
    /// parse failures are logged and leave an empty mapping.
    pub fn load(&self) {
        let loaded = match self.backend.read() {
            Ok(Some(raw)) if raw.trim().is_empty() => Ok(BTreeMap::new()),
            Ok(Some(raw)) => parse_document(&raw),
            Ok(None) => {
                let empty = BTreeMap::new();
                if let Err(e) = self.write(&empty) {
                    tracing::error!(error = %e, "Failed to initialize lobby store");
                }
                Ok(empty)
            }
            Err(e) => Err(e),
        };

        let map = match loaded {
            Ok(map) => {
                tracing::info!(lobbies = map.len(), "Lobby store loaded");
                map
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to load lobby store, starting empty");
                BTreeMap::new()
            }
        };
        *self.cache.lock() = map;
    }

    pub fn get(&self, channel_id: &str) -> Option<LobbyConfig> {
        self.cache.lock().get(channel_id).cloned()
    }

    pub fn contains(&self, channel_id: &str) -> bool {
        self.cache.lock().contains_key(channel_id)
    }

    /// Upsert and persist. The in-memory entry stays even if persisting fails.
    pub fn set(&self, channel_id: &str, config: LobbyConfig) {
        let snapshot = {
            let mut cache = self.cache.lock();
            cache.insert(channel_id.to_string(), config);
            cache.clone()
        };
        self.save(&snapshot);
    }

    /// Remove and persist. Returns the removed entry.
    pub fn remove(&self, channel_id: &str) -> Option<LobbyConfig> {
        let (removed, snapshot) = {
            let mut cache = self.cache.lock();
            let removed = cache.remove(channel_id);
            (removed, cache.clone())
        };
        if removed.is_some() {
            self.save(&snapshot);
        }
        removed
    }

    /// Copy of the full mapping.
    pub fn snapshot(&self) -> BTreeMap<String, LobbyConfig> {
        self.cache.lock().clone()
    }

    fn save(&self, map: &BTreeMap<String, LobbyConfig>) {
        if let Err(e) = self.write(map) {
            tracing::error!(error = %e, "Failed to save lobby store; memory and disk have diverged");
        }
    }

    fn write(&self, map: &BTreeMap<String, LobbyConfig>) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(map)?;
        self.backend.write(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    /// Lets a test keep a handle on the backend the store owns.
    struct Shared(Arc<MemoryBackend>);

    impl StorageBackend for Shared {
        fn read(&self) -> Result<Option<String>, StoreError> {
            self.0.read()
        }
        fn write(&self, contents: &str) -> Result<(), StoreError> {
            self.0.write(contents)
        }
    }

    fn room(limit: u32) -> LobbyConfig {
        LobbyConfig {
            base_name: "Room".into(),
            user_limit: limit,
        }
    }

    #[test]
    fn missing_document_is_initialized_empty() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConfigStore::open(Box::new(Shared(backend.clone())));
        assert!(store.snapshot().is_empty());
        assert_eq!(backend.contents().as_deref(), Some("{}"));
    }

    #[test]
    fn corrupt_document_falls_back_to_empty() {
        let store = ConfigStore::open(Box::new(MemoryBackend::with_contents("{not json")));
        assert!(store.snapshot().is_empty());
        assert!(store.get("L1").is_none());
    }

    #[test]
    fn persisted_layout_uses_camel_case() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConfigStore::open(Box::new(Shared(backend.clone())));
        store.set("L1", room(0));

        let raw: serde_json::Value = serde_json::from_str(&backend.contents().unwrap()).unwrap();
        assert_eq!(raw, serde_json::json!({ "L1": { "baseName": "Room", "userLimit": 0 } }));
    }

    #[test]
    fn set_then_reload_round_trips() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConfigStore::open(Box::new(Shared(backend.clone())));
        store.set("L1", room(5));
        drop(store);

        let reopened = ConfigStore::open(Box::new(Shared(backend)));
        assert_eq!(reopened.get("L1"), Some(room(5)));
    }

    #[test]
    fn failed_save_keeps_memory_update() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConfigStore::open(Box::new(Shared(backend.clone())));
        backend.set_fail_writes(true);

        store.set("L1", room(3));
        assert_eq!(store.get("L1"), Some(room(3)));
        assert_eq!(backend.contents().as_deref(), Some("{}"));
    }

    #[test]
    fn remove_persists() {
        let backend = Arc::new(MemoryBackend::new());
        let store = ConfigStore::open(Box::new(Shared(backend.clone())));
        store.set("L1", room(1));
        store.set("L2", room(2));

        assert_eq!(store.remove("L1"), Some(room(1)));
        assert_eq!(store.remove("L1"), None);
        let reopened = ConfigStore::open(Box::new(Shared(backend)));
        assert_eq!(reopened.snapshot().keys().collect::<Vec<_>>(), vec!["L2"]);
    }

    #[test]
    fn bad_entries_are_skipped_one_at_a_time() {
        let doc = r#"{
            "L1": { "baseName": "Room", "userLimit": 5 },
            "L2": { "baseName": "Low", "userLimit": -3 },
            "L3": { "baseName": "High", "userLimit": 250 },
            "L4": { "userLimit": 2 },
            "L5": "nonsense"
        }"#;
        let store = ConfigStore::open(Box::new(MemoryBackend::with_contents(doc)));

        assert_eq!(store.get("L1"), Some(room(5)));
        assert_eq!(store.get("L2").map(|c| c.user_limit), Some(0));
        assert_eq!(store.get("L3").map(|c| c.user_limit), Some(99));
        assert!(store.get("L4").is_none());
        assert!(store.get("L5").is_none());
        assert_eq!(store.snapshot().len(), 3);
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("transfer_channels.json");

        let store = ConfigStore::open(Box::new(JsonFileBackend::new(&path)));
        assert!(path.exists());
        store.set("L1", room(0));

        let reopened = ConfigStore::open(Box::new(JsonFileBackend::new(&path)));
        assert_eq!(reopened.get("L1"), Some(room(0)));
    }

    #[test]
    fn empty_file_reads_as_empty_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("transfer_channels.json");
        std::fs::write(&path, "").unwrap();
        let store = ConfigStore::open(Box::new(JsonFileBackend::new(&path)));
        assert!(store.snapshot().is_empty());
    }

    #[test]
    fn sqlite_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lobbies.db");

        let store = ConfigStore::open(Box::new(SqliteBackend::open(&path).unwrap()));
        store.set("L1", room(7));
        drop(store);

        let reopened = ConfigStore::open(Box::new(SqliteBackend::open(&path).unwrap()));
        assert_eq!(reopened.get("L1"), Some(room(7)));
    }

    #[test]
    fn sqlite_in_memory_starts_empty() {
        let backend = SqliteBackend::in_memory().unwrap();
        assert!(backend.read().unwrap().is_none());
        backend.write("{}").unwrap();
        assert_eq!(backend.read().unwrap().as_deref(), Some("{}"));
    }
}
