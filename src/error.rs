use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("no repository found at or above {0:?}")]
    RepositoryNotFound(PathBuf),
    #[error("corrupt repository state in {path:?}: {reason}")]
    CorruptState { path: PathBuf, reason: String },
    #[error(transparent)]
    Backend(#[from] BackendError),
    #[error("there are local modifications, can't add remote (hint: run sync first)")]
    DirtyLocalState,
    #[error("remote already added: {0}")]
    DuplicateRemote(String),
    #[error("no such remote: {0}")]
    UnknownRemote(String),
    /// A conflict was found and the resolution strategy refused to pick a side.
    #[error("unresolved conflict at {0}")]
    UnresolvedConflict(String),
    #[error("repository is locked by another process: {0:?}")]
    Locked(PathBuf),
    #[error("io error: {0}")]
    IoError(#[from] io::Error),
}

impl SyncError {
    pub(crate) fn corrupt<E: fmt::Display>(path: impl Into<PathBuf>, reason: E) -> Self {
        SyncError::CorruptState {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors that only affect the path currently being propagated.
    pub fn is_path_scoped(&self) -> bool {
        matches!(*self, SyncError::Backend(_))
    }
}

/// The backend operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BackendOperation {
    List,
    Copy,
    Delete,
    Version,
}

impl fmt::Display for BackendOperation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            BackendOperation::List => "list",
            BackendOperation::Copy => "copy",
            BackendOperation::Delete => "delete",
            BackendOperation::Version => "version",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
#[error("{operation} failed at {location}: {message}")]
pub struct BackendError {
    pub operation: BackendOperation,
    pub location: String,
    pub message: String,
}

impl BackendError {
    pub fn new<E: fmt::Display>(operation: BackendOperation, location: &str, message: E) -> Self {
        BackendError {
            operation,
            location: location.to_owned(),
            message: message.to_string(),
        }
    }
}
