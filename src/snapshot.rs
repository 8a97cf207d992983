use std::path::Path;

use crate::archive;
use crate::config::Ignore;
use crate::error::{BackendError, BackendOperation, SyncError};
use crate::state::FileEntry;
use crate::transfer::TransferBackend;
use crate::util::{FnvHashMap, FnvHashSet};

/// The file metadata of one replica, or of the base when `location` is `None`.
///
/// Entries keep the order the backend listed them in; `index` maps each path
/// to its position.
#[derive(Debug, Clone)]
pub struct Snapshot {
    label: String,
    location: Option<String>,
    entries: Vec<FileEntry>,
    index: FnvHashMap<String, usize>,
}

impl Snapshot {
    /// Builds a snapshot from already filtered entries. Later duplicates of a path are dropped.
    pub fn from_entries(label: &str, location: Option<&str>, entries: Vec<FileEntry>) -> Self {
        let mut snapshot = Snapshot {
            label: label.to_owned(),
            location: location.map(str::to_owned),
            entries: Vec::with_capacity(entries.len()),
            index: FnvHashMap::default(),
        };
        for entry in entries {
            if snapshot.index.contains_key(&entry.path) {
                warn!("Duplicate entry for {:?} in {}", entry.path, snapshot.label);
                continue;
            }
            snapshot.push(entry);
        }
        snapshot
    }

    /// Lists a live location through the backend.
    pub fn load(
        backend: &dyn TransferBackend,
        location: &str,
        label: &str,
        ignore: &Ignore,
    ) -> Result<Self, BackendError> {
        let listing = backend.list(location)?;
        let total = listing.len();
        let entries = filter_entries(listing, ignore);
        debug!(
            "{}: {} of {} listed entries are tracked files",
            label,
            entries.len(),
            total
        );
        Ok(Snapshot::from_entries(label, Some(location), entries))
    }

    /// Reads the persisted base snapshot.
    pub fn load_persisted(path: &Path, ignore: &Ignore) -> Result<Self, SyncError> {
        let entries: Vec<FileEntry> = archive::read_json(path)?;
        Ok(Snapshot::from_entries(
            BASE_LABEL,
            None,
            filter_entries(entries, ignore),
        ))
    }

    pub fn save_persisted(&self, path: &Path) -> Result<(), SyncError> {
        debug!("Writing {} entries of {} to {:?}", self.entries.len(), self.label, path);
        archive::write_json(path, &self.entries)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn location(&self) -> Option<&str> {
        self.location.as_deref()
    }

    pub fn entries(&self) -> &[FileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry_for(&self, path: &str) -> Option<&FileEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Propagates one file from this snapshot to `target`.
    ///
    /// A backed target gets the file through the backend first; the base only
    /// records the entry. The target is left unmodified if the transfer fails.
    pub fn copy_to(
        &self,
        path: &str,
        target: &mut Snapshot,
        backend: &dyn TransferBackend,
    ) -> Result<(), SyncError> {
        let entry = self.entry_for(path).ok_or_else(|| {
            BackendError::new(
                BackendOperation::Copy,
                &self.label,
                format!("{} is not present in {}", path, self.label),
            )
        })?;

        if let Some(dest) = target.location.as_deref() {
            let source = self.location.as_deref().ok_or_else(|| {
                BackendError::new(
                    BackendOperation::Copy,
                    dest,
                    format!("{} has no storage to copy {} from", self.label, path),
                )
            })?;
            backend.copy(source, path, dest)?;
        } else {
            trace!("Recording {:?} from {} in {}", path, self.label, target.label);
        }

        let entry = entry.clone();
        target.remove(path);
        target.push(entry);
        Ok(())
    }

    /// Deletes `path` from the snapshot (and its storage, if backed).
    /// Returns false if there was nothing to delete.
    pub fn delete_if_present(
        &mut self,
        path: &str,
        backend: &dyn TransferBackend,
    ) -> Result<bool, SyncError> {
        if self.entry_for(path).is_none() {
            return Ok(false);
        }
        if let Some(location) = self.location.as_deref() {
            backend.delete(location, path)?;
        }
        self.remove(path);
        Ok(true)
    }

    /// The union of all paths, in order of first appearance.
    pub fn all_paths_across(snapshots: &[&Snapshot]) -> Vec<String> {
        let mut seen = FnvHashSet::default();
        let mut paths = Vec::new();
        for snapshot in snapshots {
            for entry in &snapshot.entries {
                if seen.insert(entry.path.as_str()) {
                    paths.push(entry.path.clone());
                }
            }
        }
        paths
    }

    /// Puts `entry` back without touching storage.
    pub(crate) fn record(&mut self, entry: FileEntry) {
        self.remove(&entry.path);
        self.push(entry);
    }

    fn push(&mut self, entry: FileEntry) {
        self.index.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
    }

    fn remove(&mut self, path: &str) -> Option<FileEntry> {
        let i = self.index.remove(path)?;
        let removed = self.entries.remove(i);
        for entry in &self.entries[i..] {
            if let Some(position) = self.index.get_mut(&entry.path) {
                *position -= 1;
            }
        }
        Some(removed)
    }
}

/// The label of the base snapshot.
pub const BASE_LABEL: &str = "base";

fn filter_entries(entries: Vec<FileEntry>, ignore: &Ignore) -> Vec<FileEntry> {
    entries
        .into_iter()
        .filter(|entry| {
            if entry.is_dir {
                return false;
            }
            if ignore.is_ignored(&entry.path) {
                trace!("Ignoring entry {:?}", entry.path);
                return false;
            }
            true
        })
        .collect()
}
