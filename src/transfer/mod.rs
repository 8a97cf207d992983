//! Transfer backends: the only code that touches replica storage.
//!
//! The engine never reads or writes files itself. It asks a `TransferBackend`
//! to list a location, copy one file between two locations, or delete one
//! file. Locations are opaque strings (`/home/me/docs`, `drive:backup`).

use crate::config::{BackendKind, SyncConfig};
use crate::error::BackendError;
use crate::state::FileEntry;

mod command;
pub mod fs;
pub mod memory;
pub mod rclone;

pub use crate::transfer::command::{Cmd, CommandError};
pub use crate::transfer::fs::FilesystemBackend;
pub use crate::transfer::memory::MemoryBackend;
pub use crate::transfer::rclone::RcloneBackend;

/// Listing, copying and deleting files at named storage locations.
///
/// Implementations must be usable from several threads at once, since remote
/// listings are fetched concurrently.
pub trait TransferBackend: Send + Sync {
    /// Recursively lists every entry below `location`, directories included.
    fn list(&self, location: &str) -> Result<Vec<FileEntry>, BackendError>;

    /// Copies `source/path` to `dest/path`, preserving the modification time.
    fn copy(&self, source: &str, path: &str, dest: &str) -> Result<(), BackendError>;

    /// Deletes `location/path`. Fails if the file does not exist.
    fn delete(&self, location: &str, path: &str) -> Result<(), BackendError>;

    fn version(&self) -> Result<String, BackendError>;
}

/// Builds the backend selected by the configuration.
pub fn backend_for(config: &SyncConfig) -> Box<dyn TransferBackend> {
    match config.backend {
        BackendKind::Rclone => Box::new(RcloneBackend::new(&config.rclone_program)),
        BackendKind::Filesystem => Box::new(FilesystemBackend),
    }
}
