use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, FixedOffset, Utc};
use walkdir::WalkDir;

use crate::error::{BackendError, BackendOperation};
use crate::state::FileEntry;
use crate::transfer::TransferBackend;

/// Treats every location as a directory on a mounted filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemBackend;

fn absolute(location: &str, path: &str) -> PathBuf {
    path.split('/')
        .fold(PathBuf::from(location), |acc, part| acc.join(part))
}

fn relative_path(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = relative.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

impl TransferBackend for FilesystemBackend {
    fn list(&self, location: &str) -> Result<Vec<FileEntry>, BackendError> {
        let fail = |e: &dyn std::fmt::Display| BackendError::new(BackendOperation::List, location, e);
        let root = Path::new(location);
        if !root.is_dir() {
            return Err(fail(&"not a directory"));
        }

        let mut entries = Vec::new();
        for item in WalkDir::new(root).min_depth(1).sort_by(|a, b| a.file_name().cmp(b.file_name())) {
            let item = item.map_err(|e| fail(&e))?;
            let path = match relative_path(root, item.path()) {
                Some(p) => p,
                None => {
                    warn!("Skipping non UTF-8 path {:?}", item.path());
                    continue;
                }
            };
            let metadata = item.metadata().map_err(|e| fail(&e))?;
            let modified = metadata.modified().map_err(|e| fail(&e))?;
            let mod_time: DateTime<FixedOffset> = DateTime::<Utc>::from(modified).into();

            trace!("Found entry {:?}", path);
            let mut entry = FileEntry::new(&path, metadata.len() as i64, mod_time);
            entry.is_dir = metadata.is_dir();
            entries.push(entry);
        }
        Ok(entries)
    }

    fn copy(&self, source: &str, path: &str, dest: &str) -> Result<(), BackendError> {
        let fail = |e: std::io::Error| BackendError::new(BackendOperation::Copy, dest, e);
        let from = absolute(source, path);
        let to = absolute(dest, path);
        if let Some(parent) = to.parent() {
            if !parent.exists() {
                info!("Creating parent directory {:?}", parent);
                fs::create_dir_all(parent).map_err(fail)?;
            }
        }
        info!("Transferring file {:?} to {:?}", from, to);
        fs::copy(&from, &to).map_err(fail)?;

        let modified = fs::metadata(&from).and_then(|m| m.modified()).map_err(fail)?;
        fs::OpenOptions::new()
            .write(true)
            .open(&to)
            .and_then(|file| file.set_modified(modified))
            .map_err(fail)?;
        Ok(())
    }

    fn delete(&self, location: &str, path: &str) -> Result<(), BackendError> {
        let target = absolute(location, path);
        info!("Removing file {:?}", target);
        fs::remove_file(&target)
            .map_err(|e| BackendError::new(BackendOperation::Delete, location, e))
    }

    fn version(&self) -> Result<String, BackendError> {
        Ok(format!("filesystem backend {}", env!("CARGO_PKG_VERSION")))
    }
}
