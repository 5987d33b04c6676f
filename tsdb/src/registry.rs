//! Registry of open stores, keyed by store name.
//!
//! Every connection that names the same store shares one [`Database`]
//! handle, so writes from one connection are visible to the others without
//! a commit round trip through the file.
//!
//! # Invariants
//!
//! - Each store name maps to exactly one `Database` instance
//! - Stores are never removed once opened (for the lifetime of the registry)
//! - All store names are validated before they touch the filesystem

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::storage::{Database, StoreError};

/// Maximum length of a store name.
const MAX_STORE_NAME_LENGTH: usize = 250;

/// File extension of store files.
pub const STORE_EXTENSION: &str = "dbdb";

/// A store shared between connections.
pub type SharedDatabase = Arc<Mutex<Database>>;

/// Registry of open stores.
pub struct StoreRegistry {
    stores: RwLock<HashMap<String, SharedDatabase>>,
    base_directory: PathBuf,
}

impl StoreRegistry {
    /// Create a registry whose stores live in `base_directory`.
    #[must_use]
    pub fn new(base_directory: PathBuf) -> Self {
        Self {
            stores: RwLock::new(HashMap::new()),
            base_directory,
        }
    }

    #[must_use]
    pub fn base_directory(&self) -> &Path {
        &self.base_directory
    }

    /// Get the store called `name`, opening (and creating) it on first use.
    #[allow(clippy::significant_drop_tightening)] // the write lock must cover the insert
    pub fn get_or_open(&self, name: &str) -> Result<SharedDatabase, RegistryError> {
        validate_store_name(name)?;

        {
            let stores = self.stores.read().map_err(|_| RegistryError::LockPoisoned)?;
            if let Some(db) = stores.get(name) {
                return Ok(Arc::clone(db));
            }
        }

        let mut stores = self.stores.write().map_err(|_| RegistryError::LockPoisoned)?;
        // Another thread may have opened it while we waited.
        if let Some(db) = stores.get(name) {
            return Ok(Arc::clone(db));
        }

        let path = self.base_directory.join(format!("{name}.{STORE_EXTENSION}"));
        let database = Arc::new(Mutex::new(Database::open(&path)?));
        stores.insert(name.to_string(), Arc::clone(&database));

        tracing::info!("Opened store '{name}' at {}", path.display());
        Ok(database)
    }

    /// Number of stores opened so far.
    pub fn len(&self) -> Result<usize, RegistryError> {
        let stores = self.stores.read().map_err(|_| RegistryError::LockPoisoned)?;
        Ok(stores.len())
    }

    pub fn is_empty(&self) -> Result<bool, RegistryError> {
        Ok(self.len()? == 0)
    }
}

/// Error returned by the registry.
#[derive(Debug)]
pub enum RegistryError {
    /// The store name is not acceptable.
    InvalidName(StoreNameError),
    /// A registry or store mutex was poisoned.
    LockPoisoned,
    /// Opening the store failed.
    Store(StoreError),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(e) => write!(f, "{e}"),
            Self::LockPoisoned => write!(f, "store registry lock poisoned"),
            Self::Store(e) => write!(f, "store error: {e}"),
        }
    }
}

impl std::error::Error for RegistryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidName(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::LockPoisoned => None,
        }
    }
}

impl From<StoreNameError> for RegistryError {
    fn from(e: StoreNameError) -> Self {
        Self::InvalidName(e)
    }
}

impl From<StoreError> for RegistryError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

/// Error returned when validating a store name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreNameError {
    /// The name is empty.
    Empty,
    /// The name exceeds the maximum length.
    TooLong,
    /// The name contains invalid characters.
    InvalidCharacters,
}

impl std::fmt::Display for StoreNameError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "store name must not be empty"),
            Self::TooLong => write!(
                f,
                "store name exceeds maximum length of {MAX_STORE_NAME_LENGTH} characters"
            ),
            Self::InvalidCharacters => write!(
                f,
                "store name contains invalid characters; only alphanumeric, hyphens, and underscores are allowed"
            ),
        }
    }
}

impl std::error::Error for StoreNameError {}

/// Validate that a store name is safe to use as a file name.
///
/// Valid names are non-empty, at most 250 characters, and contain only
/// alphanumeric characters, hyphens, and underscores.
///
/// # Examples
///
/// ```
/// use tsdb::registry::validate_store_name;
///
/// assert!(validate_store_name("db0").is_ok());
/// assert!(validate_store_name("").is_err());
/// assert!(validate_store_name("../evil").is_err());
/// ```
pub fn validate_store_name(name: &str) -> Result<(), StoreNameError> {
    if name.is_empty() {
        return Err(StoreNameError::Empty);
    }

    if name.len() > MAX_STORE_NAME_LENGTH {
        return Err(StoreNameError::TooLong);
    }

    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Err(StoreNameError::InvalidCharacters);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_store_name() {
        assert!(validate_store_name("db0").is_ok());
        assert!(validate_store_name("vantage_points-2").is_ok());
        assert_eq!(validate_store_name(""), Err(StoreNameError::Empty));
        assert_eq!(
            validate_store_name(&"a".repeat(MAX_STORE_NAME_LENGTH + 1)),
            Err(StoreNameError::TooLong)
        );
        assert!(validate_store_name(&"a".repeat(MAX_STORE_NAME_LENGTH)).is_ok());
        for bad in ["../evil", "a b", "a.b", "a/b", "a\\b"] {
            assert_eq!(
                validate_store_name(bad),
                Err(StoreNameError::InvalidCharacters),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_get_or_open_creates_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = StoreRegistry::new(temp_dir.path().to_path_buf());

        registry.get_or_open("db0").expect("open");
        assert!(temp_dir.path().join("db0.dbdb").exists());
        assert_eq!(registry.len().expect("len"), 1);
    }

    #[test]
    fn test_get_or_open_returns_same_instance() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = StoreRegistry::new(temp_dir.path().to_path_buf());

        let first = registry.get_or_open("db0").expect("first");
        let second = registry.get_or_open("db0").expect("second");
        let other = registry.get_or_open("db1").expect("other");

        assert!(Arc::ptr_eq(&first, &second));
        assert!(!Arc::ptr_eq(&first, &other));
    }

    #[test]
    fn test_shared_handle_sees_uncommitted_writes() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = StoreRegistry::new(temp_dir.path().to_path_buf());

        let first = registry.get_or_open("db0").expect("first");
        first.lock().expect("lock").set(0.5, "ts-1").expect("set");

        let second = registry.get_or_open("db0").expect("second");
        assert_eq!(second.lock().expect("lock").get(&0.5).expect("get"), "ts-1");
    }

    #[test]
    fn test_invalid_name_is_rejected() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let registry = StoreRegistry::new(temp_dir.path().to_path_buf());

        assert!(matches!(
            registry.get_or_open("../escape"),
            Err(RegistryError::InvalidName(StoreNameError::InvalidCharacters))
        ));
        assert!(registry.is_empty().expect("is_empty"));
    }
}
