//! Deciding which replica wins a path.
//!
//! `guess_operation` is pure: it only looks at the candidates. When several
//! replicas changed the same path, a `ConflictResolver` picks a side (or
//! none), which keeps interactive prompting out of the sync loop.

use std::fmt;

use crate::detect::{Candidate, Difference};
use crate::error::SyncError;
use crate::prompt::LinePrompt;
use crate::snapshot::Snapshot;
use crate::state::{FileEntry, Status};
use crate::ReplicaIndex;

/// The result of reconciliation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// nothing changed since the base
    InSync,
    /// exactly one replica changed, it wins
    PropagateFromMaster(Candidate),
    /// the path changed on multiple replicas and we don't know which one is correct
    ChangedOnMultipleReplicas(Conflict),
}

/// Determines which replica (if any) holds the most up-to-date version of the path.
pub fn guess_operation(difference: &Difference, replicas: &[Snapshot]) -> Operation {
    match difference.candidates.len() {
        0 => Operation::InSync,
        1 => Operation::PropagateFromMaster(difference.candidates[0]),
        _ => Operation::ChangedOnMultipleReplicas(Conflict::new(difference, replicas)),
    }
}

/// One side of a conflict, numbered from 1 in replica order.
#[derive(Debug, Clone, PartialEq)]
pub struct Choice {
    pub number: usize,
    pub replica: ReplicaIndex,
    pub label: String,
    pub status: Status,
    /// The replica's entry, `None` if it deleted the path.
    pub entry: Option<FileEntry>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Conflict {
    pub path: String,
    pub choices: Vec<Choice>,
}

impl Conflict {
    pub fn new(difference: &Difference, replicas: &[Snapshot]) -> Self {
        let choices = difference
            .candidates
            .iter()
            .enumerate()
            .map(|(i, candidate)| {
                let snapshot = &replicas[candidate.replica];
                Choice {
                    number: i + 1,
                    replica: candidate.replica,
                    label: snapshot.label().to_owned(),
                    status: candidate.status,
                    entry: snapshot.entry_for(&difference.path).cloned(),
                }
            })
            .collect();
        Conflict {
            path: difference.path.clone(),
            choices,
        }
    }

    pub fn choice(&self, number: usize) -> Option<&Choice> {
        self.choices.iter().find(|c| c.number == number)
    }
}

impl fmt::Display for Conflict {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "Conflict: {}", self.path)?;
        for choice in &self.choices {
            writeln!(f, "  {}) {} at {}", choice.number, choice.status, choice.label)?;
        }
        Ok(())
    }
}

/// What to do with a conflicting path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Propagate the choice with this number.
    Choose(usize),
    /// Leave the path alone; it is offered again on the next sync.
    Skip,
}

pub trait ConflictResolver {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError>;
}

/// Asks the user to pick a number, `0` (or anything unusable) skips.
pub struct Interactive<P: LinePrompt> {
    prompt: P,
}

impl<P: LinePrompt> Interactive<P> {
    pub fn new(prompt: P) -> Self {
        Interactive { prompt }
    }
}

impl<P: LinePrompt> ConflictResolver for Interactive<P> {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        let question = format!(
            "{}Which version wins? [1-{}, 0 to skip]: ",
            conflict,
            conflict.choices.len()
        );
        let answer = self.prompt.ask(&question)?;
        Ok(match answer.trim().parse::<usize>() {
            Ok(number) if conflict.choice(number).is_some() => Resolution::Choose(number),
            Ok(0) => Resolution::Skip,
            _ => {
                warn!("Ignoring answer {:?}, skipping {}", answer, conflict.path);
                Resolution::Skip
            }
        })
    }
}

/// Leaves every conflict for later.
#[derive(Debug, Default)]
pub struct SkipConflicts;

impl ConflictResolver for SkipConflicts {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        info!("Skipping conflict at {}", conflict.path);
        Ok(Resolution::Skip)
    }
}

/// Aborts the sync on the first conflict.
#[derive(Debug, Default)]
pub struct FailOnConflict;

impl ConflictResolver for FailOnConflict {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        Err(SyncError::UnresolvedConflict(conflict.path.clone()))
    }
}

/// Picks the most recently modified version. A present file beats a
/// deletion, ties go to the lowest number.
#[derive(Debug, Default)]
pub struct NewestWins;

impl ConflictResolver for NewestWins {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        let mut best: Option<&Choice> = None;
        for choice in &conflict.choices {
            best = match (best, &choice.entry) {
                (None, _) => Some(choice),
                (Some(current), Some(entry)) => match current.entry {
                    None => Some(choice),
                    Some(ref newest) if entry.mod_time > newest.mod_time => Some(choice),
                    Some(_) => Some(current),
                },
                (Some(current), None) => Some(current),
            };
        }
        Ok(best.map_or(Resolution::Skip, |c| Resolution::Choose(c.number)))
    }
}

/// Always picks the replica with the given label, skips if it didn't change.
#[derive(Debug, Clone)]
pub struct PreferReplica {
    pub label: String,
}

impl ConflictResolver for PreferReplica {
    fn resolve(&mut self, conflict: &Conflict) -> Result<Resolution, SyncError> {
        Ok(conflict
            .choices
            .iter()
            .find(|c| c.label == self.label)
            .map_or(Resolution::Skip, |c| Resolution::Choose(c.number)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::candidates_for;
    use chrono::DateTime;
    use std::collections::VecDeque;
    use std::io;

    struct Answers(VecDeque<&'static str>);

    impl LinePrompt for Answers {
        fn ask(&mut self, _: &str) -> io::Result<String> {
            Ok(self.0.pop_front().unwrap_or("").to_owned())
        }
    }

    fn entry(path: &str, secs: u32) -> FileEntry {
        let time = DateTime::parse_from_rfc3339(&format!("2021-06-01T12:00:{:02}Z", secs)).unwrap();
        FileEntry::new(path, 1, time)
    }

    /// base has `h` at 0s, local modified it at 10s, r1 at 20s, r2 deleted it
    fn conflict() -> Conflict {
        let base = Snapshot::from_entries("base", None, vec![entry("h", 0)]);
        let replicas = vec![
            Snapshot::from_entries("local", Some("/l"), vec![entry("h", 10)]),
            Snapshot::from_entries("r1", Some("r1:"), vec![entry("h", 20)]),
            Snapshot::from_entries("r2", Some("r2:"), vec![]),
        ];
        let difference = Difference {
            path: "h".to_owned(),
            candidates: candidates_for("h", &replicas, &base),
        };
        match guess_operation(&difference, &replicas) {
            Operation::ChangedOnMultipleReplicas(conflict) => conflict,
            other => panic!("expected a conflict, got {:?}", other),
        }
    }

    #[test]
    fn choices_are_numbered_in_replica_order() {
        let conflict = conflict();
        let described: Vec<_> = conflict
            .choices
            .iter()
            .map(|c| (c.number, c.label.as_str(), c.status))
            .collect();
        assert_eq!(
            described,
            vec![
                (1, "local", Status::Modified),
                (2, "r1", Status::Modified),
                (3, "r2", Status::Deleted)
            ]
        );
        assert_eq!(
            conflict.to_string(),
            "Conflict: h\n  1) modified at local\n  2) modified at r1\n  3) deleted at r2\n"
        );
    }

    #[test]
    fn single_candidate_propagates() {
        let base = Snapshot::from_entries("base", None, vec![]);
        let replicas = vec![Snapshot::from_entries("local", Some("/l"), vec![entry("f", 0)])];
        let difference = Difference {
            path: "f".to_owned(),
            candidates: candidates_for("f", &replicas, &base),
        };
        assert_eq!(
            guess_operation(&difference, &replicas),
            Operation::PropagateFromMaster(Candidate {
                replica: 0,
                status: Status::New
            })
        );
    }

    #[test]
    fn interactive_accepts_valid_numbers_only() {
        let conflict = conflict();
        let mut resolver = Interactive::new(Answers(vec!["2", "0", "7", "two", ""].into()));
        assert_eq!(resolver.resolve(&conflict).unwrap(), Resolution::Choose(2));
        for _ in 0..4 {
            assert_eq!(resolver.resolve(&conflict).unwrap(), Resolution::Skip);
        }
    }

    #[test]
    fn newest_wins_prefers_latest_present_file() {
        assert_eq!(NewestWins.resolve(&conflict()).unwrap(), Resolution::Choose(2));
    }

    #[test]
    fn prefer_replica_and_fail() {
        let conflict = conflict();
        let mut prefer = PreferReplica {
            label: "r2".to_owned(),
        };
        assert_eq!(prefer.resolve(&conflict).unwrap(), Resolution::Choose(3));
        prefer.label = "elsewhere".to_owned();
        assert_eq!(prefer.resolve(&conflict).unwrap(), Resolution::Skip);
        assert!(matches!(
            FailOnConflict.resolve(&conflict),
            Err(SyncError::UnresolvedConflict(ref p)) if p == "h"
        ));
    }
}
