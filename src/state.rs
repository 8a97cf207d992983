use std::fmt;

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::snapshot::Snapshot;

/// Two modification times closer than this are considered equal. Absorbs the
/// precision lost between storage backends and clock sources.
pub const MOD_TIME_TOLERANCE_MS: i64 = 1000;

/// Mirrors the state of one file within a snapshot.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileEntry {
    /// Relative path, always slash separated.
    pub path: String,
    pub size: i64,
    pub mod_time: DateTime<FixedOffset>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_dir: bool,
    /// Backend-specific fields (`Name`, `MimeType`, ...) kept as-is.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl FileEntry {
    pub fn new(path: &str, size: i64, mod_time: DateTime<FixedOffset>) -> Self {
        FileEntry {
            path: path.to_owned(),
            size,
            mod_time,
            is_dir: false,
            extra: Map::new(),
        }
    }

    /// Returns true if the modification times differ by more than the tolerance.
    pub fn modified_since(&self, other: &FileEntry) -> bool {
        let delta = self.mod_time.signed_duration_since(other.mod_time);
        delta.num_milliseconds().abs() > MOD_TIME_TOLERANCE_MS
    }
}

/// How a replica's copy of a path relates to the base.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Status {
    New,
    Missing,
    Deleted,
    Modified,
    UpToDate,
}

const STATUS_CHARS: [(Status, char); 5] = [
    (Status::New, 'N'),
    (Status::Missing, 'X'),
    (Status::Deleted, 'D'),
    (Status::Modified, 'M'),
    (Status::UpToDate, '-'),
];

impl Status {
    /// The single character shown by `status`.
    pub fn display_char(self) -> char {
        STATUS_CHARS
            .iter()
            .find(|&&(status, _)| status == self)
            .map(|&(_, c)| c)
            .unwrap_or('?')
    }

    pub fn name(self) -> &'static str {
        match self {
            Status::New => "new",
            Status::Missing => "missing",
            Status::Deleted => "deleted",
            Status::Modified => "modified",
            Status::UpToDate => "up-to-date",
        }
    }

    /// Returns true if the replica diverged from the base and must be propagated.
    pub fn is_change(self) -> bool {
        match self {
            Status::New | Status::Modified | Status::Deleted => true,
            Status::Missing | Status::UpToDate => false,
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Classifies `path` in `snapshot` against the base snapshot.
pub fn status_of(path: &str, snapshot: &Snapshot, base: &Snapshot) -> Status {
    match (snapshot.entry_for(path), base.entry_for(path)) {
        (Some(_), None) => Status::New,
        (None, Some(_)) => Status::Deleted,
        (None, None) => Status::Missing,
        (Some(current), Some(previous)) => {
            if current.modified_since(previous) {
                Status::Modified
            } else {
                Status::UpToDate
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(secs: i64, millis: u32) -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339(&format!(
            "2020-01-01T00:00:{:02}.{:03}+00:00",
            secs, millis
        ))
        .unwrap()
    }

    fn snapshot(entries: Vec<FileEntry>) -> Snapshot {
        Snapshot::from_entries("test", None, entries)
    }

    #[test]
    fn classifies_all_five_statuses() {
        let base = snapshot(vec![
            FileEntry::new("same", 1, at(10, 0)),
            FileEntry::new("changed", 1, at(10, 0)),
            FileEntry::new("gone", 1, at(10, 0)),
        ]);
        let replica = snapshot(vec![
            FileEntry::new("same", 1, at(10, 900)),
            FileEntry::new("changed", 1, at(12, 0)),
            FileEntry::new("fresh", 1, at(10, 0)),
        ]);

        assert_eq!(status_of("same", &replica, &base), Status::UpToDate);
        assert_eq!(status_of("changed", &replica, &base), Status::Modified);
        assert_eq!(status_of("gone", &replica, &base), Status::Deleted);
        assert_eq!(status_of("fresh", &replica, &base), Status::New);
        assert_eq!(status_of("nowhere", &replica, &base), Status::Missing);
    }

    #[test]
    fn tolerance_boundary_is_exclusive() {
        let a = FileEntry::new("f", 1, at(10, 0));
        let exactly = FileEntry::new("f", 1, at(11, 0));
        let over = FileEntry::new("f", 1, at(11, 1));
        assert!(!exactly.modified_since(&a));
        assert!(over.modified_since(&a));
        assert!(a.modified_since(&over));
    }

    #[test]
    fn display_chars() {
        let chars: String = [
            Status::New,
            Status::Missing,
            Status::Deleted,
            Status::Modified,
            Status::UpToDate,
        ]
        .iter()
        .map(|s| s.display_char())
        .collect();
        assert_eq!(chars, "NXDM-");
    }

    #[test]
    fn extra_backend_fields_survive_a_round_trip() {
        let json = r#"{"Path":"a/b.txt","Name":"b.txt","Size":5,"MimeType":"text/plain","ModTime":"2017-05-31T16:15:57.034468261+01:00","IsDir":false}"#;
        let entry: FileEntry = serde_json::from_str(json).unwrap();
        assert_eq!(entry.path, "a/b.txt");
        assert_eq!(entry.size, 5);
        assert!(!entry.is_dir);
        assert_eq!(entry.extra.get("MimeType"), Some(&Value::from("text/plain")));

        let written = serde_json::to_value(&entry).unwrap();
        assert_eq!(written["Name"], Value::from("b.txt"));
        assert_eq!(written["Path"], Value::from("a/b.txt"));
        assert!(written.get("IsDir").is_none());
    }
}
