//! An in-memory backend that simulates remote storage without running any
//! process. Used by tests to count operations and inject failures.

use std::sync::{Mutex, MutexGuard};

use crate::error::{BackendError, BackendOperation};
use crate::state::FileEntry;
use crate::transfer::TransferBackend;
use crate::util::{FnvHashMap, FnvHashSet};

#[derive(Debug, Default)]
struct Storage {
    locations: FnvHashMap<String, Vec<FileEntry>>,
    failing: FnvHashSet<(BackendOperation, String, String)>,
    copies: usize,
    deletes: usize,
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    storage: Mutex<Storage>,
}

/// Counts of mutating operations performed so far.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct OperationCounts {
    pub copies: usize,
    pub deletes: usize,
}

impl OperationCounts {
    pub fn total(&self) -> usize {
        self.copies + self.deletes
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Default::default()
    }

    fn storage(&self) -> MutexGuard<Storage> {
        // a panicking test thread must not hide the state from the others
        self.storage.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates an empty location, so that listing it succeeds.
    pub fn add_location(&self, location: &str) {
        self.storage()
            .locations
            .entry(location.to_owned())
            .or_insert_with(Vec::new);
    }

    /// Stores `entry` at `location`, replacing any file with the same path.
    pub fn put(&self, location: &str, entry: FileEntry) {
        let mut storage = self.storage();
        let files = storage
            .locations
            .entry(location.to_owned())
            .or_insert_with(Vec::new);
        files.retain(|e| e.path != entry.path);
        files.push(entry);
    }

    pub fn remove(&self, location: &str, path: &str) {
        if let Some(files) = self.storage().locations.get_mut(location) {
            files.retain(|e| e.path != path);
        }
    }

    pub fn entry(&self, location: &str, path: &str) -> Option<FileEntry> {
        self.storage()
            .locations
            .get(location)
            .and_then(|files| files.iter().find(|e| e.path == path).cloned())
    }

    pub fn paths(&self, location: &str) -> Vec<String> {
        self.storage()
            .locations
            .get(location)
            .map(|files| files.iter().map(|e| e.path.clone()).collect())
            .unwrap_or_default()
    }

    /// Makes every later `operation` on `location`/`path` fail. For copies the
    /// location is the destination; for listings the path is ignored.
    pub fn fail_on(&self, operation: BackendOperation, location: &str, path: &str) {
        self.storage()
            .failing
            .insert((operation, location.to_owned(), path.to_owned()));
    }

    pub fn clear_failures(&self) {
        self.storage().failing.clear();
    }

    pub fn counts(&self) -> OperationCounts {
        let storage = self.storage();
        OperationCounts {
            copies: storage.copies,
            deletes: storage.deletes,
        }
    }
}

impl Storage {
    fn check(&self, operation: BackendOperation, location: &str, path: &str) -> Result<(), BackendError> {
        if self
            .failing
            .contains(&(operation, location.to_owned(), path.to_owned()))
        {
            return Err(BackendError::new(
                operation,
                location,
                format!("injected failure for {:?}", path),
            ));
        }
        Ok(())
    }
}

impl TransferBackend for MemoryBackend {
    fn list(&self, location: &str) -> Result<Vec<FileEntry>, BackendError> {
        let storage = self.storage();
        storage.check(BackendOperation::List, location, "")?;
        storage.locations.get(location).cloned().ok_or_else(|| {
            BackendError::new(BackendOperation::List, location, "directory not found")
        })
    }

    fn copy(&self, source: &str, path: &str, dest: &str) -> Result<(), BackendError> {
        let mut storage = self.storage();
        storage.check(BackendOperation::Copy, dest, path)?;
        let entry = storage
            .locations
            .get(source)
            .and_then(|files| files.iter().find(|e| e.path == path).cloned())
            .ok_or_else(|| {
                BackendError::new(BackendOperation::Copy, source, format!("{} not found", path))
            })?;
        let files = storage
            .locations
            .entry(dest.to_owned())
            .or_insert_with(Vec::new);
        files.retain(|e| e.path != path);
        files.push(entry);
        storage.copies += 1;
        Ok(())
    }

    fn delete(&self, location: &str, path: &str) -> Result<(), BackendError> {
        let mut storage = self.storage();
        storage.check(BackendOperation::Delete, location, path)?;
        let files = storage.locations.get_mut(location).ok_or_else(|| {
            BackendError::new(BackendOperation::Delete, location, "directory not found")
        })?;
        let before = files.len();
        files.retain(|e| e.path != path);
        if files.len() == before {
            return Err(BackendError::new(
                BackendOperation::Delete,
                location,
                format!("{} not found", path),
            ));
        }
        storage.deletes += 1;
        Ok(())
    }

    fn version(&self) -> Result<String, BackendError> {
        Ok("memory backend\nfor testing".to_owned())
    }
}
