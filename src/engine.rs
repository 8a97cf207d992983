//! The sync/merge engine.
//!
//! Every path known to the local replica, the base or any remote is
//! examined once, in turn. A path changed on exactly one replica is
//! propagated from there; a path changed on several is a conflict handed to
//! the `ConflictResolver`. The base is written after every resolved path, so
//! an interrupted run never leaves it ahead of the replicas.

use std::fmt;
use std::panic;
use std::thread;
use std::time::{Duration, Instant};

use crate::archive::Archive;
use crate::config::Ignore;
use crate::detect::{candidates_for, find_differences, paths_to_check, Candidate, Difference};
use crate::error::{BackendError, SyncError};
use crate::propagate::{propagate, ProgressCallback};
use crate::reconcile::{guess_operation, Conflict, ConflictResolver, Operation, Resolution};
use crate::snapshot::Snapshot;
use crate::state::Status;
use crate::transfer::TransferBackend;

/// The label of the local replica.
pub const LOCAL_LABEL: &str = "local";

/// The replicas (`[local, remotes...]`) and the base of one invocation.
#[derive(Debug)]
pub struct SyncState {
    pub replicas: Vec<Snapshot>,
    pub base: Snapshot,
}

/// Lists the local replica and every remote. Remote listings run concurrently.
pub fn list_replicas(
    backend: &dyn TransferBackend,
    local: &str,
    remotes: &[String],
    ignore: &Ignore,
) -> Result<Vec<Snapshot>, BackendError> {
    thread::scope(|scope| -> Result<Vec<Snapshot>, BackendError> {
        let handles: Vec<_> = remotes
            .iter()
            .map(|remote| scope.spawn(move || Snapshot::load(backend, remote, remote, ignore)))
            .collect();

        let mut replicas = Vec::with_capacity(remotes.len() + 1);
        replicas.push(Snapshot::load(backend, local, LOCAL_LABEL, ignore)?);
        for handle in handles {
            let remote = handle.join().unwrap_or_else(|e| panic::resume_unwind(e))?;
            replicas.push(remote);
        }
        Ok(replicas)
    })
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SyncOptions {
    /// Report what would happen without copying, deleting or writing the base.
    pub dry_run: bool,
}

/// A path whose propagation failed. Other paths were still processed.
#[derive(Debug)]
pub struct PathFailure {
    pub path: String,
    pub error: SyncError,
}

#[derive(Debug, Default)]
pub struct SyncReport {
    pub examined: usize,
    /// Paths propagated from a single winner (planned ones in a dry run).
    pub propagated: usize,
    pub copies: usize,
    pub deletions: usize,
    pub conflicts_resolved: usize,
    /// Conflicts left for the next sync.
    pub unresolved: Vec<Conflict>,
    pub failures: Vec<PathFailure>,
    pub elapsed: Duration,
}

impl SyncReport {
    /// Returns true if no path failed.
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Converges every replica and the base.
pub fn sync<R, P>(
    state: &mut SyncState,
    archive: &Archive,
    backend: &dyn TransferBackend,
    resolver: &mut R,
    options: &SyncOptions,
    progress: &P,
) -> Result<SyncReport, SyncError>
where
    R: ConflictResolver + ?Sized,
    P: ProgressCallback,
{
    let started = Instant::now();
    let mut report = SyncReport::default();

    for path in paths_to_check(&state.replicas, &state.base) {
        report.examined += 1;
        let difference = Difference {
            candidates: candidates_for(&path, &state.replicas, &state.base),
            path,
        };

        let master = match guess_operation(&difference, &state.replicas) {
            Operation::InSync => continue,
            Operation::PropagateFromMaster(candidate) => candidate,
            Operation::ChangedOnMultipleReplicas(conflict) => {
                if options.dry_run {
                    report.unresolved.push(conflict);
                    continue;
                }
                match choose(resolver, &conflict)? {
                    Some(candidate) => {
                        report.conflicts_resolved += 1;
                        candidate
                    }
                    None => {
                        report.unresolved.push(conflict);
                        continue;
                    }
                }
            }
        };

        let path = difference.path;
        progress.propagating(&path, master.status, state.replicas[master.replica].label());
        if options.dry_run {
            report.propagated += 1;
            continue;
        }

        match propagate(
            &path,
            master.replica,
            &mut state.replicas,
            &mut state.base,
            archive,
            backend,
            progress,
        ) {
            Ok(done) => {
                report.propagated += 1;
                report.copies += done.copies;
                report.deletions += done.deletions;
            }
            Err(error) if error.is_path_scoped() => {
                error!("Couldn't propagate {:?}: {}", path, error);
                progress.failed(&path, &error);
                report.failures.push(PathFailure { path, error });
            }
            Err(error) => return Err(error),
        }
    }

    report.elapsed = started.elapsed();
    info!(
        "Sync finished: {} paths, {} propagated, {} unresolved, {} failed",
        report.examined,
        report.propagated,
        report.unresolved.len(),
        report.failures.len()
    );
    Ok(report)
}

fn choose<R>(resolver: &mut R, conflict: &Conflict) -> Result<Option<Candidate>, SyncError>
where
    R: ConflictResolver + ?Sized,
{
    match resolver.resolve(conflict)? {
        Resolution::Skip => Ok(None),
        Resolution::Choose(number) => match conflict.choice(number) {
            Some(choice) => {
                info!("Conflict at {:?} resolved in favour of {}", conflict.path, choice.label);
                Ok(Some(Candidate {
                    replica: choice.replica,
                    status: choice.status,
                }))
            }
            None => {
                warn!("No choice {} for {:?}, skipping", number, conflict.path);
                Ok(None)
            }
        },
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatusOptions {
    /// Also list paths that are in sync.
    pub all: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusMarker {
    Changed(Status),
    Conflict,
    InSync,
}

impl StatusMarker {
    pub fn display_char(self) -> char {
        match self {
            StatusMarker::Changed(status) => status.display_char(),
            StatusMarker::Conflict => 'C',
            StatusMarker::InSync => Status::UpToDate.display_char(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusLine {
    pub marker: StatusMarker,
    pub path: String,
}

impl fmt::Display for StatusLine {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "  {} {}", self.marker.display_char(), self.path)
    }
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub lines: Vec<StatusLine>,
    pub total_files: usize,
    /// Paths changed on at least one replica.
    pub changed_files: usize,
    pub elapsed: Duration,
}

/// Reports what `sync` would do, without changing anything.
pub fn status(state: &SyncState, options: &StatusOptions) -> StatusReport {
    let started = Instant::now();
    let detection = find_differences(&state.replicas, &state.base);
    let mut lines = Vec::new();

    if options.all {
        let mut changed = detection.differences.iter().peekable();
        for path in paths_to_check(&state.replicas, &state.base) {
            match changed.peek() {
                Some(difference) if difference.path == path => {
                    lines.push(line_for(difference));
                    changed.next();
                }
                _ => lines.push(StatusLine {
                    marker: StatusMarker::InSync,
                    path,
                }),
            }
        }
    } else {
        lines.extend(detection.differences.iter().map(line_for));
    }

    StatusReport {
        lines,
        total_files: detection.statistics.total_paths,
        changed_files: detection.differences.len(),
        elapsed: started.elapsed(),
    }
}

fn line_for(difference: &Difference) -> StatusLine {
    let marker = if difference.is_conflict() {
        StatusMarker::Conflict
    } else {
        StatusMarker::Changed(difference.candidates[0].status)
    };
    StatusLine {
        marker,
        path: difference.path.clone(),
    }
}
