use crate::snapshot::Snapshot;
use crate::state::{status_of, Status};
use crate::{ReplicaIndex, LOCAL};

/// A replica whose copy of a path diverged from the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub replica: ReplicaIndex,
    pub status: Status,
}

/// Returns the replicas whose status for `path` is new, modified or deleted,
/// in replica order.
pub fn candidates_for(path: &str, replicas: &[Snapshot], base: &Snapshot) -> Vec<Candidate> {
    replicas
        .iter()
        .enumerate()
        .filter_map(|(replica, snapshot)| {
            let status = status_of(path, snapshot, base);
            trace!("{:?} is {} at {}", path, status, snapshot.label());
            if status.is_change() {
                Some(Candidate { replica, status })
            } else {
                None
            }
        })
        .collect()
}

/// A path that changed since the base on at least one replica.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Difference {
    pub path: String,
    pub candidates: Vec<Candidate>,
}

impl Difference {
    /// More than one replica changed the path.
    pub fn is_conflict(&self) -> bool {
        self.candidates.len() > 1
    }
}

/// The result of update detection
#[derive(Debug, Clone, Default)]
pub struct DetectionResult {
    pub differences: Vec<Difference>,
    pub statistics: DetectionStatistics,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectionStatistics {
    /// Every path known to any replica or the base.
    pub total_paths: usize,
    /// Paths without a single candidate.
    pub in_sync: usize,
}

/// Every path to examine, in the order `[local, base, remotes...]`.
pub fn paths_to_check(replicas: &[Snapshot], base: &Snapshot) -> Vec<String> {
    let mut order: Vec<&Snapshot> = Vec::with_capacity(replicas.len() + 1);
    if let Some(local) = replicas.get(LOCAL) {
        order.push(local);
    }
    order.push(base);
    order.extend(replicas.iter().skip(LOCAL + 1));
    Snapshot::all_paths_across(&order)
}

/// Detects all differences between the replicas and the base, without
/// touching anything.
pub fn find_differences(replicas: &[Snapshot], base: &Snapshot) -> DetectionResult {
    let mut result = DetectionResult::default();
    for path in paths_to_check(replicas, base) {
        result.statistics.total_paths += 1;
        let candidates = candidates_for(&path, replicas, base);
        if candidates.is_empty() {
            result.statistics.in_sync += 1;
        } else {
            debug!("Difference at {:?}: {} candidates", path, candidates.len());
            result.differences.push(Difference { path, candidates });
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::FileEntry;
    use chrono::DateTime;

    fn entry(path: &str, secs: u32) -> FileEntry {
        let time = DateTime::parse_from_rfc3339(&format!("2021-06-01T12:00:{:02}Z", secs)).unwrap();
        FileEntry::new(path, 1, time)
    }

    fn snap(label: &str, entries: Vec<FileEntry>) -> Snapshot {
        Snapshot::from_entries(label, Some(label), entries)
    }

    #[test]
    fn up_to_date_replicas_have_no_candidates() {
        let base = Snapshot::from_entries("base", None, vec![entry("a", 0)]);
        let replicas = vec![snap("local", vec![entry("a", 0)]), snap("r1", vec![entry("a", 0)])];
        assert!(candidates_for("a", &replicas, &base).is_empty());
    }

    #[test]
    fn missing_is_never_a_candidate() {
        let base = Snapshot::from_entries("base", None, vec![]);
        let replicas = vec![snap("local", vec![]), snap("r1", vec![entry("a", 0)])];
        assert_eq!(
            candidates_for("a", &replicas, &base),
            vec![Candidate {
                replica: 1,
                status: Status::New
            }]
        );
    }

    #[test]
    fn modified_and_deleted_conflict() {
        let base = Snapshot::from_entries("base", None, vec![entry("a", 0)]);
        let replicas = vec![snap("local", vec![entry("a", 10)]), snap("r1", vec![])];
        let candidates = candidates_for("a", &replicas, &base);
        let statuses: Vec<_> = candidates.iter().map(|c| (c.replica, c.status)).collect();
        assert_eq!(statuses, vec![(0, Status::Modified), (1, Status::Deleted)]);
    }

    #[test]
    fn find_differences_counts_paths() {
        let base = Snapshot::from_entries("base", None, vec![entry("same", 0), entry("gone", 0)]);
        let replicas = vec![
            snap("local", vec![entry("same", 0), entry("gone", 0), entry("new", 0)]),
            snap("r1", vec![entry("same", 0), entry("remote-only", 0)]),
        ];

        let result = find_differences(&replicas, &base);
        assert_eq!(
            result.statistics,
            DetectionStatistics {
                total_paths: 4,
                in_sync: 1
            }
        );
        let paths: Vec<_> = result.differences.iter().map(|d| d.path.as_str()).collect();
        assert_eq!(paths, vec!["gone", "new", "remote-only"]);
        assert!(result.differences.iter().all(|d| !d.is_conflict()));
    }
}
