//! N-way file synchronization between a local directory and any number of
//! remote locations, using a persisted base snapshot as the common ancestor.

#[macro_use]
extern crate log;

pub mod archive;
pub mod config;
pub mod detect;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod propagate;
pub mod reconcile;
pub mod repo;
pub mod snapshot;
pub mod state;
pub mod transfer;
pub mod util;

pub use crate::engine::{status, sync, StatusReport, SyncOptions, SyncReport};
pub use crate::error::{BackendError, SyncError};
pub use crate::repo::{InitOutcome, Repository};
pub use crate::snapshot::Snapshot;
pub use crate::state::{FileEntry, Status};

/// Index of a replica within `[local, remote1, remote2, ...]`.
pub type ReplicaIndex = usize;

/// The local directory is always the first replica.
pub const LOCAL: ReplicaIndex = 0;

/// The metadata directory that marks the root of a repository.
pub const METADATA_DIR: &str = ".rcsync";
