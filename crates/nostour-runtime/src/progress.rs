#![forbid(unsafe_code)]

//! Persisted per-tour progress and the global "tours enabled" gate.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                       ProgressStore                           │
//! │   - Typed records: TourProgress, PrivacySettings              │
//! │   - Merge-patch writes, last write wins per key               │
//! │   - Failures logged and degraded, never propagated            │
//! └──────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │                      StorageBackend                           │
//! │   - MemoryStorage: in-memory (testing, private browsing)      │
//! │   - FileStorage: JSON file (requires file-storage)            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Design Invariants
//!
//! 1. **Graceful degradation**: a failing backend reads as "no stored
//!    progress" and a failed write is logged and dropped.
//! 2. **Atomic writes**: file storage uses the write-rename pattern.
//! 3. **Explicit reset only**: a record is created on the first skip or
//!    completion and removed only by [`ProgressStore::reset`] or
//!    [`ProgressStore::reset_all`].
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | `StorageError::Io` | File I/O failure | Logged, read returns `None` |
//! | `StorageError::Serialization` | Malformed JSON | Logged, record treated as absent |
//! | `StorageError::Unavailable` | Storage disabled | Logged, auto-start allowed |

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for per-tour progress records.
pub const TOUR_KEY_PREFIX: &str = "nostour_tour_";

/// Key of the privacy settings record holding the tours gate.
pub const PRIVACY_SETTINGS_KEY: &str = "nostour_privacy_settings";

/// The storage key for a tour's progress record.
#[must_use]
pub fn storage_key(tour_id: &str) -> String {
    format!("{TOUR_KEY_PREFIX}{tour_id}")
}

// ─────────────────────────────────────────────────────────────────────────────
// Error Types
// ─────────────────────────────────────────────────────────────────────────────

/// Errors that can occur during storage operations.
#[derive(Debug)]
pub enum StorageError {
    /// I/O error during file operations.
    Io(std::io::Error),
    /// Serialization or deserialization error.
    Serialization(String),
    /// Storage file is corrupted or invalid format.
    Corruption(String),
    /// Backend is not available (disabled storage, private browsing).
    Unavailable(String),
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageError::Io(e) => write!(f, "I/O error: {e}"),
            StorageError::Serialization(msg) => write!(f, "serialization error: {msg}"),
            StorageError::Corruption(msg) => write!(f, "storage corruption: {msg}"),
            StorageError::Unavailable(msg) => write!(f, "storage unavailable: {msg}"),
        }
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            StorageError::Io(e) => Some(e),
            StorageError::Serialization(_)
            | StorageError::Corruption(_)
            | StorageError::Unavailable(_) => None,
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e)
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialization(e.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// ─────────────────────────────────────────────────────────────────────────────
// Storage Backend Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A string key-value store with `localStorage` semantics.
///
/// Implementations must be thread-safe (`Send + Sync`).
pub trait StorageBackend: Send + Sync {
    /// Human-readable name for logging.
    fn name(&self) -> &str;

    /// Read the value stored under `key`, `None` if absent.
    fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Store `value` under `key`, replacing any previous value.
    fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Remove `key`. Removing an absent key is not an error.
    fn remove(&self, key: &str) -> StorageResult<()>;

    /// All stored keys, in no particular order.
    fn keys(&self) -> StorageResult<Vec<String>>;

    /// Check if the backend is available and functional.
    fn is_available(&self) -> bool {
        true
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Memory Storage (always available)
// ─────────────────────────────────────────────────────────────────────────────

/// In-memory storage backend for testing and ephemeral sessions.
#[derive(Default)]
pub struct MemoryStorage {
    data: RwLock<HashMap<String, String>>,
}

impl MemoryStorage {
    /// Create a new empty memory storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create memory storage pre-populated with raw entries.
    #[must_use]
    pub fn with_entries(entries: HashMap<String, String>) -> Self {
        Self {
            data: RwLock::new(entries),
        }
    }
}

impl StorageBackend for MemoryStorage {
    fn name(&self) -> &str {
        "MemoryStorage"
    }

    fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> StorageResult<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        guard.remove(key);
        Ok(())
    }

    fn keys(&self) -> StorageResult<Vec<String>> {
        let guard = self
            .data
            .read()
            .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
        Ok(guard.keys().cloned().collect())
    }
}

impl fmt::Debug for MemoryStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count = self.data.read().map(|g| g.len()).unwrap_or(0);
        f.debug_struct("MemoryStorage")
            .field("entries", &count)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// File Storage (requires file-storage feature)
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(feature = "file-storage")]
mod file_storage {
    use super::*;
    use std::fs::{self, File};
    use std::io::{BufReader, BufWriter, Write};
    use std::path::{Path, PathBuf};

    /// On-disk layout.
    #[derive(Serialize, Deserialize)]
    struct StoreFile {
        /// Format version for future migrations.
        format_version: u32,
        /// Raw key -> value map, values are JSON documents.
        entries: HashMap<String, String>,
    }

    impl StoreFile {
        const FORMAT_VERSION: u32 = 1;

        fn new() -> Self {
            Self {
                format_version: Self::FORMAT_VERSION,
                entries: HashMap::new(),
            }
        }
    }

    /// File-based storage backend using JSON.
    ///
    /// # File Format
    ///
    /// ```json
    /// {
    ///   "format_version": 1,
    ///   "entries": {
    ///     "nostour_tour_amethyst-chat": "{\"completed\":true,\"skipped\":false,\"lastStep\":0}"
    ///   }
    /// }
    /// ```
    ///
    /// # Atomic Writes
    ///
    /// 1. Write to `{path}.tmp`
    /// 2. Flush and sync
    /// 3. Rename `{path}.tmp` -> `{path}`
    pub struct FileStorage {
        path: PathBuf,
        lock: RwLock<()>,
    }

    impl FileStorage {
        /// Create a file storage at the given path.
        ///
        /// The file does not need to exist; it will be created on first write.
        #[must_use]
        pub fn new(path: impl AsRef<Path>) -> Self {
            Self {
                path: path.as_ref().to_path_buf(),
                lock: RwLock::new(()),
            }
        }

        /// Create storage at the default location for the application.
        ///
        /// Uses `$XDG_STATE_HOME/nostour/{app_name}/progress.json`, falling
        /// back to `~/.local/state` and then the current directory.
        #[must_use]
        pub fn default_for_app(app_name: &str) -> Self {
            let base = dirs_or_fallback();
            Self::new(base.join("nostour").join(app_name).join("progress.json"))
        }

        /// Path of the backing file.
        pub fn path(&self) -> &Path {
            &self.path
        }

        fn temp_path(&self) -> PathBuf {
            let mut tmp = self.path.clone();
            tmp.set_extension("json.tmp");
            tmp
        }

        fn load(&self) -> StorageResult<StoreFile> {
            if !self.path.exists() {
                return Ok(StoreFile::new());
            }
            let reader = BufReader::new(File::open(&self.path)?);
            let file: StoreFile = serde_json::from_reader(reader).map_err(|e| {
                StorageError::Serialization(format!("failed to parse progress file: {e}"))
            })?;
            if file.format_version != StoreFile::FORMAT_VERSION {
                tracing::warn!(
                    stored = file.format_version,
                    expected = StoreFile::FORMAT_VERSION,
                    "progress file format version mismatch, ignoring stored progress"
                );
                return Ok(StoreFile::new());
            }
            Ok(file)
        }

        fn save(&self, file: &StoreFile) -> StorageResult<()> {
            if let Some(parent) = self.path.parent() {
                fs::create_dir_all(parent)?;
            }
            let tmp_path = self.temp_path();
            {
                let mut writer = BufWriter::new(File::create(&tmp_path)?);
                serde_json::to_writer_pretty(&mut writer, file)?;
                writer.flush()?;
                writer.get_ref().sync_all()?;
            }
            fs::rename(&tmp_path, &self.path)?;
            tracing::debug!(
                path = %self.path.display(),
                entries = file.entries.len(),
                "saved progress file"
            );
            Ok(())
        }

        fn modify(&self, f: impl FnOnce(&mut StoreFile)) -> StorageResult<()> {
            let _guard = self
                .lock
                .write()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            let mut file = self.load()?;
            f(&mut file);
            self.save(&file)
        }
    }

    fn dirs_or_fallback() -> PathBuf {
        if let Ok(state_home) = std::env::var("XDG_STATE_HOME") {
            return PathBuf::from(state_home);
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("state");
        }
        PathBuf::from(".")
    }

    impl StorageBackend for FileStorage {
        fn name(&self) -> &str {
            "FileStorage"
        }

        fn get(&self, key: &str) -> StorageResult<Option<String>> {
            let _guard = self
                .lock
                .read()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            Ok(self.load()?.entries.remove(key))
        }

        fn set(&self, key: &str, value: &str) -> StorageResult<()> {
            self.modify(|file| {
                file.entries.insert(key.to_string(), value.to_string());
            })
        }

        fn remove(&self, key: &str) -> StorageResult<()> {
            self.modify(|file| {
                file.entries.remove(key);
            })
        }

        fn keys(&self) -> StorageResult<Vec<String>> {
            let _guard = self
                .lock
                .read()
                .map_err(|_| StorageError::Corruption("lock poisoned".into()))?;
            Ok(self.load()?.entries.into_keys().collect())
        }

        fn is_available(&self) -> bool {
            match self.path.parent() {
                Some(parent) if parent.as_os_str().is_empty() => true,
                Some(parent) => parent.exists() || fs::create_dir_all(parent).is_ok(),
                None => false,
            }
        }
    }

    impl fmt::Debug for FileStorage {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("FileStorage")
                .field("path", &self.path)
                .finish()
        }
    }
}

#[cfg(feature = "file-storage")]
pub use file_storage::FileStorage;

// ─────────────────────────────────────────────────────────────────────────────
// Records
// ─────────────────────────────────────────────────────────────────────────────

/// Persisted progress for one tour.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TourProgress {
    pub completed: bool,
    pub skipped: bool,
    pub last_step: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped_at: Option<DateTime<Utc>>,
}

impl TourProgress {
    /// Whether the tour was finished one way or the other.
    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.completed || self.skipped
    }
}

/// The user's privacy settings, of which only the tours gate matters here.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PrivacySettings {
    pub tours_enabled: bool,
}

impl Default for PrivacySettings {
    fn default() -> Self {
        Self {
            tours_enabled: true,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Progress Store
// ─────────────────────────────────────────────────────────────────────────────

/// Source of completion and skip timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Typed access to tour progress over a [`StorageBackend`].
///
/// Every read failure degrades to the default record and every write failure
/// is logged and dropped, so callers never see a storage error.
pub struct ProgressStore {
    backend: Box<dyn StorageBackend>,
    clock: Clock,
}

impl ProgressStore {
    /// Create a store over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend,
            clock: Arc::new(Utc::now),
        }
    }

    /// Create a store over a fresh [`MemoryStorage`].
    #[must_use]
    pub fn in_memory() -> Self {
        Self::new(Box::new(MemoryStorage::new()))
    }

    /// Replace the timestamp source.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Fn() -> DateTime<Utc> + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// The backend's name.
    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    /// Stored progress for `tour_id`, `None` if absent or unreadable.
    pub fn get_progress(&self, tour_id: &str) -> Option<TourProgress> {
        self.read_json(&storage_key(tour_id))
    }

    /// Whether the tour should start on its own: tours are enabled and the
    /// tour was neither completed nor skipped.
    pub fn should_auto_start(&self, tour_id: &str) -> bool {
        if !self.tours_enabled() {
            return false;
        }
        !self
            .get_progress(tour_id)
            .is_some_and(|progress| progress.is_settled())
    }

    /// Record a completion.
    pub fn mark_completed(&self, tour_id: &str) {
        let now = (self.clock)();
        self.update_progress(tour_id, |progress| {
            progress.completed = true;
            progress.skipped = false;
            progress.completed_at = Some(now);
        });
    }

    /// Record a skip at `step`.
    pub fn mark_skipped(&self, tour_id: &str, step: usize) {
        let now = (self.clock)();
        self.update_progress(tour_id, |progress| {
            progress.completed = false;
            progress.skipped = true;
            progress.last_step = step;
            progress.skipped_at = Some(now);
        });
    }

    /// Forget a tour's progress.
    pub fn reset(&self, tour_id: &str) {
        let key = storage_key(tour_id);
        if let Err(error) = self.backend.remove(&key) {
            tracing::warn!(key = %key, %error, "failed to reset tour progress");
        } else {
            tracing::debug!(tour = tour_id, "tour progress reset");
        }
    }

    /// Forget every tour's progress. The privacy settings are kept.
    pub fn reset_all(&self) {
        let keys = match self.backend.keys() {
            Ok(keys) => keys,
            Err(error) => {
                tracing::warn!(%error, "failed to list stored tours");
                return;
            }
        };
        for key in keys.iter().filter(|k| k.starts_with(TOUR_KEY_PREFIX)) {
            if let Err(error) = self.backend.remove(key) {
                tracing::warn!(key = %key, %error, "failed to reset tour progress");
            }
        }
    }

    /// The global tours gate. Defaults to enabled.
    pub fn tours_enabled(&self) -> bool {
        self.read_json::<PrivacySettings>(PRIVACY_SETTINGS_KEY)
            .unwrap_or_default()
            .tours_enabled
    }

    /// Flip the global tours gate.
    pub fn set_tours_enabled(&self, enabled: bool) {
        let mut settings: PrivacySettings = self.read_json(PRIVACY_SETTINGS_KEY).unwrap_or_default();
        settings.tours_enabled = enabled;
        self.write_json(PRIVACY_SETTINGS_KEY, &settings);
    }

    fn update_progress(&self, tour_id: &str, patch: impl FnOnce(&mut TourProgress)) {
        let key = storage_key(tour_id);
        let mut progress: TourProgress = self.read_json(&key).unwrap_or_default();
        patch(&mut progress);
        self.write_json(&key, &progress);
    }

    fn read_json<T: for<'de> Deserialize<'de>>(&self, key: &str) -> Option<T> {
        let raw = match self.backend.get(key) {
            Ok(raw) => raw?,
            Err(error) => {
                tracing::warn!(
                    backend = self.backend.name(),
                    key,
                    %error,
                    "storage read failed, treating as absent"
                );
                return None;
            }
        };
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(error) => {
                tracing::warn!(key, %error, "stored record is malformed, ignoring it");
                None
            }
        }
    }

    fn write_json<T: Serialize>(&self, key: &str, value: &T) {
        let result = serde_json::to_string(value)
            .map_err(StorageError::from)
            .and_then(|raw| self.backend.set(key, &raw));
        if let Err(error) = result {
            tracing::warn!(
                backend = self.backend.name(),
                key,
                %error,
                "storage write failed, progress not saved"
            );
        }
    }
}

impl fmt::Debug for ProgressStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressStore")
            .field("backend", &self.backend.name())
            .finish()
    }
}
