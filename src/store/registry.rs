//! Datasets shared between connections
//!
//! Sessions open datasets by file name relative to the data directory. The
//! registry keeps one [`BrickStore`] per name so concurrent sessions share
//! the brick table and the min/max cache.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, RwLock};

use super::{BrickStore, DatasetError, DATASET_EXTENSION};

#[derive(Debug)]
pub struct DatasetRegistry {
    data_dir: PathBuf,
    open: RwLock<HashMap<String, Arc<BrickStore>>>,
}

impl DatasetRegistry {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            open: RwLock::new(HashMap::new()),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Resolve a client-supplied name inside the data directory
    fn resolve(&self, name: &str) -> Result<PathBuf, DatasetError> {
        let relative = Path::new(name);
        let plain = !name.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !plain {
            return Err(DatasetError::Invalid(format!(
                "dataset name {:?} must be a relative path inside the data directory",
                name
            )));
        }
        Ok(self.data_dir.join(relative))
    }

    /// Open `name`, or share the store another session already opened
    pub fn open(&self, name: &str) -> Result<Arc<BrickStore>, DatasetError> {
        if let Some(store) = self.open.read().unwrap_or_else(|e| e.into_inner()).get(name) {
            return Ok(store.clone());
        }

        let path = self.resolve(name)?;
        let store = Arc::new(BrickStore::open(path)?);

        let mut open = self.open.write().unwrap_or_else(|e| e.into_inner());
        Ok(open.entry(name.to_string()).or_insert(store).clone())
    }

    /// Drop the registry's handle when no session holds `store` any more
    ///
    /// Callers pass the handle they are releasing; the store is evicted only
    /// when that handle and the registry's are the last two.
    pub fn close(&self, name: &str, store: Arc<BrickStore>) {
        let mut open = self.open.write().unwrap_or_else(|e| e.into_inner());
        let evict = open
            .get(name)
            .is_some_and(|held| Arc::ptr_eq(held, &store) && Arc::strong_count(&store) <= 2);
        if evict {
            open.remove(name);
            log::debug!("evicted dataset {}", name);
        }
    }

    /// Names of the datasets currently held open, sorted
    pub fn list_open_datasets(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .open
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Dataset files in the data directory, sorted by name
    pub fn list_files(&self) -> Result<Vec<String>, DatasetError> {
        let entries = std::fs::read_dir(&self.data_dir).map_err(|source| DatasetError::Io {
            path: self.data_dir.clone(),
            source,
        })?;

        let mut names: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|e| e.to_str()) == Some(DATASET_EXTENSION)
            })
            .filter_map(|path| path.file_name()?.to_str().map(str::to_string))
            .collect();
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::brick_store::tests::write_test_dataset;

    #[test]
    fn test_open_shares_store() {
        let dir = tempfile::tempdir().unwrap();
        write_test_dataset(&dir.path().join("a.bsds"));
        let registry = DatasetRegistry::new(dir.path());

        let first = registry.open("a.bsds").unwrap();
        let second = registry.open("a.bsds").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.list_open_datasets(), vec!["a.bsds".to_string()]);

        registry.close("a.bsds", first);
        assert_eq!(registry.list_open_datasets().len(), 1);
        registry.close("a.bsds", second);
        assert!(registry.list_open_datasets().is_empty());
    }

    #[test]
    fn test_rejects_escaping_names() {
        let dir = tempfile::tempdir().unwrap();
        let registry = DatasetRegistry::new(dir.path());
        for name in ["", "../a.bsds", "/etc/passwd", "sub/../../a.bsds"] {
            assert!(
                matches!(registry.open(name), Err(DatasetError::Invalid(_))),
                "{name:?} accepted"
            );
        }
        assert!(matches!(registry.open("nope.bsds"), Err(DatasetError::Missing(_))));
    }

    #[test]
    fn test_list_files_filters_and_sorts() {
        let dir = tempfile::tempdir().unwrap();
        write_test_dataset(&dir.path().join("b.bsds"));
        write_test_dataset(&dir.path().join("a.bsds"));
        std::fs::write(dir.path().join("notes.txt"), b"x").unwrap();
        std::fs::create_dir(dir.path().join("dir.bsds")).unwrap();

        let registry = DatasetRegistry::new(dir.path());
        assert_eq!(
            registry.list_files().unwrap(),
            vec!["a.bsds".to_string(), "b.bsds".to_string()]
        );
    }
}
