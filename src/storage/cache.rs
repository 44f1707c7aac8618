//! Load-once cache for the canonical table.
//!
//! An explicit object rather than a process-wide singleton: construct one
//! per profile, share it (or the [`Arc<LoadedTable>`] it hands out) with
//! resolution code, and call [`TableCache::clear`] to force a reload.

use super::parquet::read_parquet;
use crate::config::{BlockingConfig, DATA_DIR_ENV, EngineConfig};
use crate::models::{CanonicalTable, EntityProfile};
use crate::services::BlockingIndex;
use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// A canonical table with its blocking index, ready for resolution.
#[derive(Debug, Clone)]
pub struct LoadedTable {
    /// The table.
    pub table: CanonicalTable,
    /// Blocking index built over `table`.
    pub index: BlockingIndex,
    /// File the table was read from, if any.
    pub path: Option<PathBuf>,
}

impl LoadedTable {
    /// Indexes an in-memory table.
    #[must_use]
    pub fn new(table: CanonicalTable, profile: &EntityProfile, blocking: BlockingConfig) -> Self {
        let index = BlockingIndex::build(&table, profile, blocking);
        Self {
            table,
            index,
            path: None,
        }
    }

    /// Reads and indexes a table file.
    ///
    /// # Errors
    ///
    /// Propagates [`read_parquet`] errors.
    pub fn from_path(path: &Path, profile: &EntityProfile, blocking: BlockingConfig) -> Result<Self> {
        let table = read_parquet(path)?;
        let mut loaded = Self::new(table, profile, blocking);
        loaded.path = Some(path.to_path_buf());
        Ok(loaded)
    }
}

/// Returns the platform data directory for table files.
///
/// # Errors
///
/// Returns an error if the user data directory cannot be determined.
pub fn user_data_dir() -> Result<PathBuf> {
    directories::BaseDirs::new()
        .map(|b| b.data_local_dir().join("entityidentity"))
        .ok_or_else(|| Error::OperationFailed {
            operation: "user_data_dir".to_string(),
            cause: "Could not determine user data directory".to_string(),
        })
}

/// Lazily loads one canonical table and shares it.
///
/// The first [`Self::get`] searches, in order:
///
/// 1. the explicit path from [`Self::with_path`]
/// 2. `<data_dir>/<namespace>.parquet` from the engine configuration
/// 3. `$ENTITYIDENTITY_DATA_DIR/<namespace>.parquet`
/// 4. `<platform data dir>/entityidentity/<namespace>.parquet`
///
/// Concurrent first calls are serialized; later calls return the same
/// [`Arc`] without I/O.
#[derive(Debug)]
pub struct TableCache {
    profile: EntityProfile,
    blocking: BlockingConfig,
    explicit_path: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    loaded: Mutex<Option<Arc<LoadedTable>>>,
}

impl TableCache {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(profile: EntityProfile, config: &EngineConfig) -> Self {
        Self {
            profile,
            blocking: config.blocking,
            explicit_path: None,
            data_dir: config.data_dir.clone(),
            loaded: Mutex::new(None),
        }
    }

    /// Builder method to pin the table file.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.explicit_path = Some(path.into());
        self
    }

    /// The profile tables are indexed under.
    #[must_use]
    pub const fn profile(&self) -> &EntityProfile {
        &self.profile
    }

    /// Locations searched for the table file, in order.
    #[must_use]
    pub fn search_paths(&self) -> Vec<PathBuf> {
        let file_name = self.profile.table_file_name();
        let mut paths = Vec::new();
        if let Some(path) = &self.explicit_path {
            paths.push(path.clone());
        }
        if let Some(dir) = &self.data_dir {
            paths.push(dir.join(&file_name));
        }
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
            paths.push(PathBuf::from(dir).join(&file_name));
        }
        if let Ok(dir) = user_data_dir() {
            paths.push(dir.join(&file_name));
        }
        paths.dedup();
        paths
    }

    /// Finds the table file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataNotFound`] listing every searched location.
    pub fn locate(&self) -> Result<PathBuf> {
        let searched = self.search_paths();
        if let Some(found) = searched.iter().find(|p| p.is_file()) {
            return Ok(found.clone());
        }
        Err(Error::DataNotFound {
            searched,
            remediation: format!(
                "build the '{}' table with `consolidate` and save it with `write_parquet` \
                 to one of these paths, or set {DATA_DIR_ENV} to the directory holding {}",
                self.profile.namespace,
                self.profile.table_file_name()
            ),
        })
    }

    /// Returns the loaded table, loading it on first use.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DataNotFound`] if no table file exists or the file
    /// found cannot be read as a canonical table. A failed load is not
    /// cached.
    pub fn get(&self) -> Result<Arc<LoadedTable>> {
        let mut slot = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(loaded) = slot.as_ref() {
            return Ok(Arc::clone(loaded));
        }

        let path = self.locate()?;
        let start = Instant::now();
        let loaded = LoadedTable::from_path(&path, &self.profile, self.blocking)
            .map(Arc::new)
            .map_err(|e| self.unreadable(&path, &e))?;
        tracing::info!(
            path = %path.display(),
            records = loaded.table.len(),
            elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Loaded canonical table"
        );
        *slot = Some(Arc::clone(&loaded));
        Ok(loaded)
    }

    fn unreadable(&self, path: &Path, cause: &Error) -> Error {
        tracing::warn!(path = %path.display(), error = %cause, "Canonical table is unreadable");
        Error::DataNotFound {
            searched: vec![path.to_path_buf()],
            remediation: format!(
                "the table file exists but cannot be read ({cause}); rebuild the '{}' table \
                 with `consolidate` and save it with `write_parquet`",
                self.profile.namespace
            ),
        }
    }

    /// Installs an already-built table, replacing any cached one.
    pub fn insert(&self, table: CanonicalTable) -> Arc<LoadedTable> {
        let loaded = Arc::new(LoadedTable::new(table, &self.profile, self.blocking));
        let mut slot = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = Some(Arc::clone(&loaded));
        loaded
    }

    /// Returns `true` if a table is cached.
    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.loaded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Drops the cached table; the next [`Self::get`] reloads it.
    ///
    /// Handles returned earlier stay valid.
    pub fn clear(&self) {
        let mut slot = self.loaded.lock().unwrap_or_else(PoisonError::into_inner);
        *slot = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntityId, EntityRecord};
    use crate::storage::write_parquet;
    use std::collections::BTreeMap;

    fn table() -> CanonicalTable {
        CanonicalTable::new(vec![EntityRecord {
            entity_id: EntityId::new("a1"),
            display_name: "Apple Inc".to_string(),
            match_key: "apple".to_string(),
            slug: "apple-inc".to_string(),
            alternate_names: Vec::new(),
            context_fields: BTreeMap::new(),
            external_id: None,
            source: "test".to_string(),
            source_priority: 1,
        }])
        .unwrap()
    }

    #[test]
    fn test_loads_once_and_clears() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.parquet");
        write_parquet(&table(), &path).unwrap();

        let cache = TableCache::new(EntityProfile::company(), &EngineConfig::default()).with_path(&path);
        assert!(!cache.is_loaded());

        let first = cache.get().unwrap();
        let second = cache.get().unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.path.as_deref(), Some(path.as_path()));

        cache.clear();
        assert!(!cache.is_loaded());
        let third = cache.get().unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
        assert_eq!(first.table, third.table);
    }

    #[test]
    fn test_data_dir_from_config() {
        let dir = tempfile::tempdir().unwrap();
        write_parquet(&table(), &dir.path().join("company.parquet")).unwrap();

        let config = EngineConfig::default().with_data_dir(dir.path());
        let cache = TableCache::new(EntityProfile::company(), &config);
        assert_eq!(cache.get().unwrap().table.len(), 1);
    }

    #[test]
    fn test_missing_table_lists_searched_paths() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.parquet");
        let cache = TableCache::new(EntityProfile::company(), &EngineConfig::default()).with_path(&missing);

        let err = cache.get().unwrap_err();
        assert!(matches!(
            &err,
            Error::DataNotFound { searched, remediation }
                if searched.first() == Some(&missing) && remediation.contains("consolidate")
        ));
        assert!(err.to_string().contains("nope.parquet"));
        assert!(!cache.is_loaded());
    }

    #[test]
    fn test_corrupt_table_is_data_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let garbage = dir.path().join("company.parquet");
        std::fs::write(&garbage, b"not a parquet file").unwrap();
        let cache = TableCache::new(EntityProfile::company(), &EngineConfig::default()).with_path(&garbage);

        let err = cache.get().unwrap_err();
        assert!(matches!(
            &err,
            Error::DataNotFound { searched, remediation }
                if searched == &vec![garbage.clone()]
                    && remediation.contains("read_parquet")
                    && remediation.contains("write_parquet")
        ));
        assert!(!cache.is_loaded());
    }

    #[test]
    fn test_insert_replaces_cached_table() {
        let cache = TableCache::new(EntityProfile::company(), &EngineConfig::default());
        let loaded = cache.insert(table());
        assert!(cache.is_loaded());
        assert!(Arc::ptr_eq(&loaded, &cache.get().unwrap()));
    }
}
