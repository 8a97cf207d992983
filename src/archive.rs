//! The repository metadata directory and everything persisted inside it.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::Ignore;
use crate::error::SyncError;
use crate::snapshot::Snapshot;

const BASE_FILE: &str = "base-revision.json";
const REMOTES_FILE: &str = "remote-paths.json";
const IGNORE_FILE: &str = "ignore";
const LOCK_FILE: &str = "lock";

#[derive(Debug, Clone)]
pub struct Archive {
    pub directory: PathBuf,
}

impl fmt::Display for Archive {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.directory.display())
    }
}

impl Archive {
    /// Opens an existing metadata directory.
    pub fn new(directory: PathBuf) -> Self {
        Archive { directory }
    }

    /// Creates the metadata directory.
    pub fn create(directory: PathBuf) -> Result<Self, io::Error> {
        fs::create_dir(&directory)?;
        Ok(Archive { directory })
    }

    pub fn base_file(&self) -> PathBuf {
        self.directory.join(BASE_FILE)
    }

    pub fn remotes_file(&self) -> PathBuf {
        self.directory.join(REMOTES_FILE)
    }

    pub fn read_base(&self, ignore: &Ignore) -> Result<Snapshot, SyncError> {
        Snapshot::load_persisted(&self.base_file(), ignore)
    }

    pub fn write_base(&self, base: &Snapshot) -> Result<(), SyncError> {
        base.save_persisted(&self.base_file())
    }

    pub fn read_remotes(&self) -> Result<Vec<String>, SyncError> {
        read_json(&self.remotes_file())
    }

    pub fn write_remotes(&self, remotes: &[String]) -> Result<(), SyncError> {
        debug!("Writing {} remotes to {}", remotes.len(), self);
        write_json(&self.remotes_file(), remotes)
    }

    /// The ignore rules of this repository: the metadata directory plus the
    /// patterns of the optional `ignore` file.
    pub fn read_ignore(&self) -> Result<Ignore, SyncError> {
        let mut ignore = Ignore::metadata_only();
        let path = self.directory.join(IGNORE_FILE);
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(ref e) if e.kind() == io::ErrorKind::NotFound => return Ok(ignore),
            Err(e) => return Err(SyncError::corrupt(path, e)),
        };
        ignore.regexes = Ignore::parse_patterns(&contents).map_err(|e| SyncError::corrupt(&path, e))?;
        debug!("Loaded {} ignore patterns", ignore.regexes.len());
        Ok(ignore)
    }

    /// Takes an exclusive lock on the repository for the lifetime of the returned guard.
    pub fn lock(&self) -> Result<ArchiveLock, SyncError> {
        let path = self.directory.join(LOCK_FILE);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .open(&path)?;
        file.try_lock_exclusive()
            .map_err(|_| SyncError::Locked(path.clone()))?;
        trace!("Locked {:?}", path);
        Ok(ArchiveLock { file, path })
    }
}

/// Releases the repository lock when dropped.
#[derive(Debug)]
pub struct ArchiveLock {
    file: File,
    path: PathBuf,
}

impl Drop for ArchiveLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Couldn't unlock {:?}: {}", self.path, e);
        }
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, SyncError> {
    let contents = fs::read(path).map_err(|e| SyncError::corrupt(path, e))?;
    serde_json::from_slice(&contents).map_err(|e| SyncError::corrupt(path, e))
}

/// Writes pretty-printed JSON through a temporary file, so readers never see
/// a partially written file.
pub(crate) fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), SyncError> {
    let mut temp = path.as_os_str().to_owned();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);

    {
        let mut file = File::create(&temp)?;
        serde_json::to_writer_pretty(&mut file, value)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        file.write_all(b"\n")?;
        file.sync_all()?;
    }
    fs::rename(&temp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn archive() -> (tempfile::TempDir, Archive) {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path().join(crate::METADATA_DIR)).unwrap();
        (dir, archive)
    }

    #[test]
    fn remotes_round_trip() {
        let (_dir, archive) = archive();
        let remotes = vec!["drive:docs".to_owned(), "/mnt/usb/docs".to_owned()];
        archive.write_remotes(&remotes).unwrap();
        assert_eq!(archive.read_remotes().unwrap(), remotes);
        assert!(!archive.directory.join("remote-paths.json.tmp").exists());
    }

    #[test]
    fn missing_registry_is_corrupt_state() {
        let (_dir, archive) = archive();
        assert!(matches!(
            archive.read_remotes(),
            Err(SyncError::CorruptState { .. })
        ));
    }

    #[test]
    fn ignore_file_is_optional() {
        let (_dir, archive) = archive();
        let ignore = archive.read_ignore().unwrap();
        assert!(ignore.regexes.is_empty());
        assert!(ignore.is_ignored(".rcsync/lock"));

        fs::write(archive.directory.join("ignore"), "\\.tmp$\n").unwrap();
        let ignore = archive.read_ignore().unwrap();
        assert!(ignore.is_ignored("build/out.tmp"));
    }

    #[test]
    fn second_lock_fails_until_the_first_is_dropped() {
        let (_dir, archive) = archive();
        let guard = archive.lock().unwrap();
        assert!(matches!(archive.lock(), Err(SyncError::Locked(_))));
        drop(guard);
        assert!(archive.lock().is_ok());
    }
}
