use crate::archive::Archive;
use crate::error::SyncError;
use crate::snapshot::Snapshot;
use crate::transfer::TransferBackend;
use crate::{ReplicaIndex, LOCAL};

mod progress;
pub use crate::propagate::progress::{EmptyProgressCallback, ProgressCallback};

/// What propagating a single path did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Propagated {
    pub copies: usize,
    pub deletions: usize,
}

/// Propagates the version of `path` held by `master` to every other replica
/// and to the base, then writes the base to disk.
///
/// Copies always go through the local replica: the master's file is first
/// downloaded into local (unless local is the master) and local then uploads
/// it to each remaining remote. If `master` has no entry the path was deleted
/// there and is removed everywhere.
///
/// On error the base is left as it was for this path and is not written.
pub fn propagate<P>(
    path: &str,
    master: ReplicaIndex,
    replicas: &mut [Snapshot],
    base: &mut Snapshot,
    archive: &Archive,
    backend: &dyn TransferBackend,
    progress: &P,
) -> Result<Propagated, SyncError>
where
    P: ProgressCallback,
{
    let result = if replicas[master].entry_for(path).is_some() {
        copy_everywhere(path, master, replicas, base, backend, progress)
    } else {
        delete_everywhere(path, replicas, base, backend, progress)
    };
    let propagated = result?;

    info!("Updating {:?} in {}", path, archive);
    archive.write_base(base)?;
    Ok(propagated)
}

fn copy_everywhere<P>(
    path: &str,
    master: ReplicaIndex,
    replicas: &mut [Snapshot],
    base: &mut Snapshot,
    backend: &dyn TransferBackend,
    progress: &P,
) -> Result<Propagated, SyncError>
where
    P: ProgressCallback,
{
    let mut propagated = Propagated::default();

    if master != LOCAL {
        copy_between(replicas, master, LOCAL, path, backend, progress)?;
        propagated.copies += 1;
    }

    for remote in LOCAL + 1..replicas.len() {
        // skip the master
        if remote == master {
            continue;
        }
        copy_between(replicas, LOCAL, remote, path, backend, progress)?;
        propagated.copies += 1;
    }

    replicas[master].copy_to(path, base, backend)?;
    Ok(propagated)
}

fn delete_everywhere<P>(
    path: &str,
    replicas: &mut [Snapshot],
    base: &mut Snapshot,
    backend: &dyn TransferBackend,
    progress: &P,
) -> Result<Propagated, SyncError>
where
    P: ProgressCallback,
{
    let previous = base.entry_for(path).cloned();
    let mut propagated = Propagated::default();

    base.delete_if_present(path, backend)?;
    for replica in replicas.iter_mut() {
        if replica.entry_for(path).is_none() {
            continue;
        }
        progress.deleting(path, replica.label());
        if let Err(e) = replica.delete_if_present(path, backend) {
            // the path is not resolved, so the base must keep describing it
            if let Some(entry) = previous {
                base.record(entry);
            }
            return Err(e);
        }
        propagated.deletions += 1;
    }
    Ok(propagated)
}

fn copy_between<P>(
    replicas: &mut [Snapshot],
    from: ReplicaIndex,
    to: ReplicaIndex,
    path: &str,
    backend: &dyn TransferBackend,
    progress: &P,
) -> Result<(), SyncError>
where
    P: ProgressCallback,
{
    let (source, target) = if from < to {
        let (head, tail) = replicas.split_at_mut(to);
        (&head[from], &mut tail[0])
    } else {
        let (head, tail) = replicas.split_at_mut(from);
        (&tail[0], &mut head[to])
    };
    progress.copying(path, source.label(), target.label());
    source.copy_to(path, target, backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Ignore;
    use crate::error::BackendOperation;
    use crate::state::FileEntry;
    use crate::transfer::MemoryBackend;
    use chrono::DateTime;

    fn entry(path: &str, secs: u32) -> FileEntry {
        let time = DateTime::parse_from_rfc3339(&format!("2021-06-01T12:00:{:02}Z", secs)).unwrap();
        FileEntry::new(path, 1, time)
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        archive: Archive,
        backend: MemoryBackend,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive::create(dir.path().join(crate::METADATA_DIR)).unwrap();
        Fixture {
            _dir: dir,
            archive,
            backend: MemoryBackend::new(),
        }
    }

    fn load(f: &Fixture, locations: &[&str]) -> Vec<Snapshot> {
        locations
            .iter()
            .map(|l| Snapshot::load(&f.backend, l, l, &Ignore::nothing()).unwrap())
            .collect()
    }

    #[test]
    fn remote_master_goes_through_local() {
        let f = fixture();
        f.backend.put("local", entry("a", 0));
        f.backend.put("r1", entry("a", 0));
        f.backend.put("r2", entry("a", 30));
        let mut replicas = load(&f, &["local", "r1", "r2"]);
        let mut base = Snapshot::from_entries("base", None, vec![entry("a", 0)]);

        let done = propagate("a", 2, &mut replicas, &mut base, &f.archive, &f.backend, &EmptyProgressCallback).unwrap();

        assert_eq!(done, Propagated { copies: 2, deletions: 0 });
        for location in &["local", "r1", "r2"] {
            assert_eq!(f.backend.entry(location, "a"), Some(entry("a", 30)));
        }
        assert_eq!(base.entry_for("a"), Some(&entry("a", 30)));
        let persisted = f.archive.read_base(&Ignore::nothing()).unwrap();
        assert_eq!(persisted.entry_for("a"), Some(&entry("a", 30)));
    }

    #[test]
    fn failed_delete_keeps_base_entry_and_skips_write() {
        let f = fixture();
        f.backend.add_location("local");
        f.backend.put("r1", entry("g", 0));
        f.backend.fail_on(BackendOperation::Delete, "r1", "g");
        let mut replicas = load(&f, &["local", "r1"]);
        let mut base = Snapshot::from_entries("base", None, vec![entry("g", 0)]);

        let result = propagate("g", 0, &mut replicas, &mut base, &f.archive, &f.backend, &EmptyProgressCallback);

        assert!(matches!(result, Err(SyncError::Backend(_))));
        assert_eq!(base.entry_for("g"), Some(&entry("g", 0)));
        assert!(!f.archive.base_file().exists());
    }
}
