// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Progress reporting.
//!
//! The walker never prints anything on its own. Instead it hands each notable
//! event to a [`Reporter`]. The default [`TracingReporter`] turns events into
//! log records, while [`EventLog`] simply records them for later inspection.

use crate::{reconcile::Reconciliation, walk::skip::SkipMode};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    ops::AddAssign,
    path::{Path, PathBuf},
};
use tracing::{debug, info, trace};

/// Counters collected over a run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    /// Manifests written.
    pub updated: usize,

    /// Manifests that were already up to date.
    pub no_op: usize,

    /// Written manifests whose shared entries changed order.
    pub reordered: usize,

    /// Entries added across all manifests.
    pub added: usize,

    /// Entries removed across all manifests.
    pub removed: usize,
}

impl Stats {
    /// Stats of a single written manifest.
    pub fn updated(reconciliation: &Reconciliation) -> Self {
        Self {
            updated: 1,
            reordered: usize::from(reconciliation.reordered),
            added: reconciliation.added.len(),
            removed: reconciliation.removed.len(),
            ..Default::default()
        }
    }

    /// Stats of a single untouched manifest.
    pub fn no_op() -> Self {
        Self {
            no_op: 1,
            ..Default::default()
        }
    }
}

impl AddAssign for Stats {
    fn add_assign(&mut self, other: Self) {
        self.updated += other.updated;
        self.no_op += other.no_op;
        self.reordered += other.reordered;
        self.added += other.added;
        self.removed += other.removed;
    }
}

impl Display for Stats {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(
            fmt,
            "updated={} no-op={} reordered={} added={} removed={}",
            self.updated, self.no_op, self.reordered, self.added, self.removed
        )
    }
}

/// Why an entry was left out of a resource list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Matched by a `.gitignore` rule.
    Gitignore,

    /// Matched by a user skip pattern.
    Pattern { mode: SkipMode, pattern: String },
}

impl Display for SkipReason {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        match self {
            Self::Gitignore => fmt.write_str("gitignore"),
            Self::Pattern { .. } => fmt.write_str("pattern"),
        }
    }
}

/// Receiver of walk events.
pub trait Reporter {
    /// Walk of a base directory started.
    fn base(&mut self, path: &Path);

    /// Directory visited.
    fn directory(&mut self, path: &Path);

    /// Entry left out. The path is relative to the base directory.
    fn skipped(&mut self, path: &str, reason: &SkipReason);

    /// Manifest written.
    fn updated(&mut self, path: &Path, reconciliation: &Reconciliation);

    /// Manifest already up to date.
    fn no_op(&mut self, path: &Path);

    /// Manifest of directory held back by a subtree skip rule.
    fn frozen(&mut self, path: &Path);

    /// Run finished.
    fn summary(&mut self, stats: &Stats);
}

/// Report events as log records.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn base(&mut self, path: &Path) {
        info!("sync {:?}", path.display());
    }

    fn directory(&mut self, path: &Path) {
        debug!("visit {:?}", path.display());
    }

    fn skipped(&mut self, path: &str, reason: &SkipReason) {
        match reason {
            SkipReason::Gitignore => info!(reason = %reason, "skip {path:?}"),
            SkipReason::Pattern { mode, pattern } => {
                info!(reason = %reason, mode = %mode, pattern = %pattern, "skip {path:?}")
            }
        }
    }

    fn updated(&mut self, path: &Path, reconciliation: &Reconciliation) {
        let change = reconciliation
            .change_tag()
            .unwrap_or_else(|| "format".into());
        info!(change = %change, "update {:?}", path.display());

        info!("before:\n{}", snapshot('-', &reconciliation.before));
        info!("after:\n{}", snapshot('+', &reconciliation.entries));
    }

    fn no_op(&mut self, path: &Path) {
        info!("no-op {:?}", path.display());
    }

    fn frozen(&mut self, path: &Path) {
        trace!("skip-update {:?}", path.display());
    }

    fn summary(&mut self, stats: &Stats) {
        info!("summary {stats}");
    }
}

fn snapshot(sign: char, entries: &[String]) -> String {
    let mut text = String::from("resources:");
    for entry in entries {
        text.push_str(&format!("\n{sign} - {entry}"));
    }

    text
}

/// Recorded walk event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Base(PathBuf),
    Directory(PathBuf),
    Skipped { path: String, reason: SkipReason },
    Updated { path: PathBuf, reconciliation: Reconciliation },
    NoOp(PathBuf),
    Frozen(PathBuf),
    Summary(Stats),
}

/// Record every event in order.
#[derive(Debug, Default, Clone)]
pub struct EventLog {
    events: Vec<Event>,
}

impl EventLog {
    /// Construct empty event log.
    pub fn new() -> Self {
        Self::default()
    }

    /// Recorded events in order of arrival.
    pub fn events(&self) -> &[Event] {
        self.events.as_slice()
    }

    /// Paths of skip events with their reasons.
    pub fn skipped_entries(&self) -> Vec<(&str, &SkipReason)> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Skipped { path, reason } => Some((path.as_str(), reason)),
                _ => None,
            })
            .collect()
    }

    /// Paths of manifests that were written.
    pub fn updated_paths(&self) -> Vec<&Path> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Updated { path, .. } => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }

    /// Directories that were visited.
    pub fn directories(&self) -> Vec<&Path> {
        self.events
            .iter()
            .filter_map(|event| match event {
                Event::Directory(path) => Some(path.as_path()),
                _ => None,
            })
            .collect()
    }
}

impl Reporter for EventLog {
    fn base(&mut self, path: &Path) {
        self.events.push(Event::Base(path.to_path_buf()));
    }

    fn directory(&mut self, path: &Path) {
        self.events.push(Event::Directory(path.to_path_buf()));
    }

    fn skipped(&mut self, path: &str, reason: &SkipReason) {
        self.events.push(Event::Skipped {
            path: path.to_owned(),
            reason: reason.clone(),
        });
    }

    fn updated(&mut self, path: &Path, reconciliation: &Reconciliation) {
        self.events.push(Event::Updated {
            path: path.to_path_buf(),
            reconciliation: reconciliation.clone(),
        });
    }

    fn no_op(&mut self, path: &Path) {
        self.events.push(Event::NoOp(path.to_path_buf()));
    }

    fn frozen(&mut self, path: &Path) {
        self.events.push(Event::Frozen(path.to_path_buf()));
    }

    fn summary(&mut self, stats: &Stats) {
        self.events.push(Event::Summary(*stats));
    }
}
