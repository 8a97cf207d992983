use std::path::Path;

use regex::Regex;

use crate::METADATA_DIR;

/// How replicas are reached. Ignore rules live with the repository.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub backend: BackendKind,
    /// The rclone executable used by `BackendKind::Rclone`.
    pub rclone_program: String,
}

/// Which transfer backend talks to the replicas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Rclone,
    Filesystem,
}

impl Default for SyncConfig {
    fn default() -> Self {
        SyncConfig {
            backend: BackendKind::Rclone,
            rclone_program: "rclone".to_owned(),
        }
    }
}

/// Determines which files are left out of every snapshot.
#[derive(Debug, Clone)]
pub struct Ignore {
    pub regexes: Vec<Regex>,
    pub paths: Vec<String>,
}

impl Ignore {
    /// An `Ignore` struct that ignores nothing
    pub fn nothing() -> Self {
        Ignore {
            regexes: Vec::new(),
            paths: Vec::new(),
        }
    }

    /// Ignores the repository metadata directory, which must never be synced.
    pub fn metadata_only() -> Self {
        Ignore {
            regexes: Vec::new(),
            paths: vec![METADATA_DIR.to_owned()],
        }
    }

    /// Parses the contents of an ignore file: one regex per line, `#` starts a comment line.
    pub fn parse_patterns(contents: &str) -> Result<Vec<Regex>, regex::Error> {
        contents
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .map(Regex::new)
            .collect()
    }

    /// checks if the relative path is on the ignore list
    pub fn is_ignored(&self, path: &str) -> bool {
        if self
            .paths
            .iter()
            .any(|ignore| Path::new(path).starts_with(ignore))
        {
            return true;
        }
        self.regexes.iter().any(|ignore| ignore.is_match(path))
    }
}
