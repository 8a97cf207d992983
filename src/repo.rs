//! Repository lifecycle and the remote registry.

use std::fs;
use std::path::{Path, PathBuf};

use crate::archive::{Archive, ArchiveLock};
use crate::config::Ignore;
use crate::engine::{list_replicas, SyncState, LOCAL_LABEL};
use crate::error::SyncError;
use crate::propagate::ProgressCallback;
use crate::snapshot::Snapshot;
use crate::state::{status_of, Status};
use crate::transfer::TransferBackend;
use crate::METADATA_DIR;

/// A local directory tree marked by the metadata directory at its root.
#[derive(Debug, Clone)]
pub struct Repository {
    root: PathBuf,
    archive: Archive,
}

#[derive(Debug)]
pub enum InitOutcome {
    Initialized(Repository),
    /// A repository already exists at (or above) the requested directory.
    AlreadyInitialized(PathBuf),
}

/// What adding a remote copied (or would copy) from the local replica.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddRemoteReport {
    pub seeded: Vec<String>,
    pub dry_run: bool,
}

impl Repository {
    /// Walks upward from `start` until a directory containing the metadata
    /// directory is found.
    pub fn find_root(start: &Path) -> Option<PathBuf> {
        let start = fs::canonicalize(start).unwrap_or_else(|_| start.to_path_buf());
        let mut current = Some(start.as_path());
        while let Some(dir) = current {
            if dir.join(METADATA_DIR).is_dir() {
                return Some(dir.to_path_buf());
            }
            current = dir.parent();
        }
        None
    }

    pub fn open(start: &Path) -> Result<Self, SyncError> {
        let root = Repository::find_root(start)
            .ok_or_else(|| SyncError::RepositoryNotFound(start.to_path_buf()))?;
        debug!("Found repository at {:?}", root);
        let archive = Archive::new(root.join(METADATA_DIR));
        Ok(Repository { root, archive })
    }

    /// Creates a repository in `dir`: the current contents become the base
    /// and no remotes are registered.
    pub fn init(dir: &Path, backend: &dyn TransferBackend) -> Result<InitOutcome, SyncError> {
        if let Some(existing) = Repository::find_root(dir) {
            return Ok(InitOutcome::AlreadyInitialized(existing));
        }
        let root = fs::canonicalize(dir)?;
        info!("Initializing repository in {:?}", root);

        let local = Snapshot::load(
            backend,
            &location_of(&root),
            LOCAL_LABEL,
            &Ignore::metadata_only(),
        )?;
        let base = Snapshot::from_entries(
            crate::snapshot::BASE_LABEL,
            None,
            local.entries().to_vec(),
        );

        let archive = Archive::create(root.join(METADATA_DIR))?;
        archive.write_base(&base)?;
        archive.write_remotes(&[])?;
        Ok(InitOutcome::Initialized(Repository { root, archive }))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn archive(&self) -> &Archive {
        &self.archive
    }

    /// The local replica as a backend location.
    pub fn location(&self) -> String {
        location_of(&self.root)
    }

    pub fn ignore(&self) -> Result<Ignore, SyncError> {
        self.archive.read_ignore()
    }

    pub fn lock(&self) -> Result<ArchiveLock, SyncError> {
        self.archive.lock()
    }

    pub fn remotes(&self) -> Result<Vec<String>, SyncError> {
        self.archive.read_remotes()
    }

    /// Lists every replica and loads the base.
    pub fn load_state(&self, backend: &dyn TransferBackend) -> Result<SyncState, SyncError> {
        let ignore = self.ignore()?;
        let remotes = self.remotes()?;
        let base = self.archive.read_base(&ignore)?;
        let replicas = list_replicas(backend, &self.location(), &remotes, &ignore)?;
        Ok(SyncState { replicas, base })
    }

    /// Returns true if the local replica changed since the base.
    pub fn is_dirty(&self, backend: &dyn TransferBackend) -> Result<bool, SyncError> {
        let ignore = self.ignore()?;
        let local = Snapshot::load(backend, &self.location(), LOCAL_LABEL, &ignore)?;
        let base = self.archive.read_base(&ignore)?;
        Ok(has_local_modifications(&local, &base))
    }

    /// Registers a new remote, first copying every local file it lacks.
    ///
    /// The local replica must be in sync with the base: the new remote starts
    /// out from local's current state, so pending local changes would
    /// otherwise be taken as already synced.
    pub fn add_remote<P: ProgressCallback>(
        &self,
        id: &str,
        backend: &dyn TransferBackend,
        dry_run: bool,
        progress: &P,
    ) -> Result<AddRemoteReport, SyncError> {
        let mut remotes = self.remotes()?;
        if remotes.iter().any(|r| r == id) {
            return Err(SyncError::DuplicateRemote(id.to_owned()));
        }

        let ignore = self.ignore()?;
        let local = Snapshot::load(backend, &self.location(), LOCAL_LABEL, &ignore)?;
        let base = self.archive.read_base(&ignore)?;
        if has_local_modifications(&local, &base) {
            return Err(SyncError::DirtyLocalState);
        }

        let mut remote = Snapshot::load(backend, id, id, &ignore)?;
        let mut report = AddRemoteReport {
            seeded: Vec::new(),
            dry_run,
        };
        for entry in local.entries() {
            if remote.entry_for(&entry.path).is_some() {
                continue;
            }
            progress.copying(&entry.path, local.label(), remote.label());
            if !dry_run {
                local.copy_to(&entry.path, &mut remote, backend)?;
            }
            report.seeded.push(entry.path.clone());
        }

        if !dry_run {
            remotes.push(id.to_owned());
            self.archive.write_remotes(&remotes)?;
            info!("Added remote {} ({} files seeded)", id, report.seeded.len());
        }
        Ok(report)
    }

    pub fn remove_remote(&self, id: &str) -> Result<(), SyncError> {
        let mut remotes = self.remotes()?;
        let position = remotes
            .iter()
            .position(|r| r == id)
            .ok_or_else(|| SyncError::UnknownRemote(id.to_owned()))?;
        remotes.remove(position);
        self.archive.write_remotes(&remotes)?;
        info!("Removed remote {}", id);
        Ok(())
    }
}

fn location_of(root: &Path) -> String {
    root.to_string_lossy().into_owned()
}

/// Returns true if any path of the local replica or the base is not up to date.
pub fn has_local_modifications(local: &Snapshot, base: &Snapshot) -> bool {
    Snapshot::all_paths_across(&[local, base])
        .iter()
        .any(|path| status_of(path, local, base) != Status::UpToDate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::FilesystemBackend;

    #[test]
    fn find_root_walks_upward() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a/b/c");
        fs::create_dir_all(&nested).unwrap();
        assert_eq!(Repository::find_root(&nested), None);

        fs::create_dir(dir.path().join("a").join(METADATA_DIR)).unwrap();
        let root = Repository::find_root(&nested).unwrap();
        assert_eq!(root, fs::canonicalize(dir.path().join("a")).unwrap());
    }

    #[test]
    fn open_without_marker_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            Repository::open(dir.path()),
            Err(SyncError::RepositoryNotFound(_))
        ));
    }

    #[test]
    fn init_twice_reports_existing_root() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();

        let repo = match Repository::init(dir.path(), &FilesystemBackend).unwrap() {
            InitOutcome::Initialized(repo) => repo,
            other => panic!("unexpected {:?}", other),
        };
        assert!(repo.remotes().unwrap().is_empty());
        let base = repo.archive().read_base(&Ignore::metadata_only()).unwrap();
        assert!(base.entry_for("a.txt").is_some());
        assert!(!repo.is_dirty(&FilesystemBackend).unwrap());

        let sub = dir.path().join("sub");
        fs::create_dir(&sub).unwrap();
        match Repository::init(&sub, &FilesystemBackend).unwrap() {
            InitOutcome::AlreadyInitialized(root) => assert_eq!(root, repo.root()),
            other => panic!("unexpected {:?}", other),
        }
    }
}
