use crate::error::SyncError;
use crate::state::Status;

/// Handles progress updates for the propagation step.
pub trait ProgressCallback {
    /// A single replica changed `path` and its version is about to win.
    fn propagating(&self, path: &str, status: Status, from: &str);

    fn copying(&self, path: &str, from: &str, to: &str);

    fn deleting(&self, path: &str, at: &str);

    /// Propagation of `path` was abandoned.
    fn failed(&self, path: &str, error: &SyncError);
}

/// A zero-sized struct with an empty implementation of ProgressCallback
pub struct EmptyProgressCallback;

impl ProgressCallback for EmptyProgressCallback {
    fn propagating(&self, _: &str, _: Status, _: &str) {}
    fn copying(&self, _: &str, _: &str, _: &str) {}
    fn deleting(&self, _: &str, _: &str) {}
    fn failed(&self, _: &str, _: &SyncError) {}
}
