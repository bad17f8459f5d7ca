// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Resource list reconciliation.
//!
//! Reconciliation takes the entries currently declared in a manifest and the
//! entries discovered on disk, and computes the canonical list the manifest
//! should declare instead. The canonical list is built from three groups:
//!
//! - __remote__ entries, i.e., URL references. These are never discovered on
//!   disk, so they are carried over from the existing list.
//! - __dirs__, the subdirectories discovered on disk.
//! - __files__, the YAML files discovered on disk.
//!
//! Each group is sorted on its own, and the groups are concatenated in the
//! configured [`ResourceOrder`](crate::config::ResourceOrder). Local entries
//! that vanished from disk simply drop out of the list.
//!
//! A manifest only needs a rewrite when the canonical list differs from the
//! existing one, either in membership or in order.

use crate::config::{Options, ResourceGroup};

use std::{
    collections::{HashMap, HashSet},
    hash::Hash,
};

const REMOTE_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Check if entry refers to a remote resource.
///
/// Purely lexical. The reference is never validated nor resolved.
pub fn is_remote(entry: &str) -> bool {
    REMOTE_SCHEMES
        .iter()
        .any(|scheme| entry.starts_with(scheme))
}

/// Build the canonical resource list.
///
/// Discovered directories and files are deduplicated and sorted on their own.
/// Remote entries come from `existing` only.
pub fn merge(
    existing: &[String],
    dirs: &[String],
    files: &[String],
    options: &Options,
) -> Vec<String> {
    let mut dirs = decorate_dirs(dedup_preserve(dirs.iter().cloned()), options);
    dirs.sort();
    let mut files = dedup_preserve(files.iter().cloned());
    files.sort();

    let mut remote = existing
        .iter()
        .filter(|entry| is_remote(entry))
        .cloned()
        .collect::<Vec<_>>();
    remote.sort();

    let mut merged = Vec::with_capacity(remote.len() + dirs.len() + files.len());
    for group in options.order.groups() {
        match group {
            ResourceGroup::Remote => merged.extend(remote.iter().cloned()),
            ResourceGroup::Dirs => merged.extend(dirs.iter().cloned()),
            ResourceGroup::Files => merged.extend(files.iter().cloned()),
        }
    }

    dedup_preserve(merged)
}

/// Added and removed entries between two lists.
///
/// Treats both lists as multisets. Removed entries keep the order they had in
/// `old`.
pub fn diff(old: &[String], new: &[String]) -> (Vec<String>, Vec<String>) {
    let mut counts: HashMap<&str, usize> = HashMap::with_capacity(old.len());
    for entry in old {
        *counts.entry(entry.as_str()).or_default() += 1;
    }

    let mut added = Vec::new();
    for entry in new {
        match counts.get_mut(entry.as_str()) {
            Some(count) if *count > 0 => *count -= 1,
            _ => added.push(entry.clone()),
        }
    }

    let mut removed = Vec::new();
    for entry in old {
        if let Some(count) = counts.get_mut(entry.as_str()) {
            if *count > 0 {
                *count -= 1;
                removed.push(entry.clone());
            }
        }
    }

    (added, removed)
}

/// Check if entries shared by both lists changed their relative order.
///
/// Walks `new`, and tracks the position each shared entry had in `old`. Any
/// step backwards means the order changed. Entries only present in one of
/// the lists do not count.
pub fn order_changed(old: &[String], new: &[String]) -> bool {
    let mut positions: HashMap<&str, Vec<usize>> = HashMap::with_capacity(old.len());
    for (index, entry) in old.iter().enumerate() {
        positions.entry(entry.as_str()).or_default().push(index);
    }

    // INVARIANT: Duplicates consume the positions of `old` in order.
    let mut consumed: HashMap<&str, usize> = HashMap::with_capacity(positions.len());
    let mut previous: Option<usize> = None;
    for entry in new {
        let Some(list) = positions.get(entry.as_str()) else {
            continue;
        };
        let used = consumed.entry(entry.as_str()).or_default();
        let Some(&position) = list.get(*used) else {
            continue;
        };
        *used += 1;

        if previous.is_some_and(|previous| previous > position) {
            return true;
        }
        previous = Some(position);
    }

    false
}

/// Keep only the first occurrence of each item.
pub fn dedup_preserve<T>(items: impl IntoIterator<Item = T>) -> Vec<T>
where
    T: Eq + Hash + Clone,
{
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn decorate_dirs(dirs: Vec<String>, options: &Options) -> Vec<String> {
    dirs.into_iter()
        .map(|dir| {
            let mut dir = dir;
            if options.dir_prefix && !dir.starts_with("./") {
                dir.insert_str(0, "./");
            }
            if options.dir_slash && !dir.ends_with('/') {
                dir.push('/');
            }
            dir
        })
        .collect()
}

/// Outcome of reconciling one manifest.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    /// Entries the manifest declared before.
    pub before: Vec<String>,

    /// Canonical entries the manifest should declare.
    pub entries: Vec<String>,

    /// Entries in `entries` but not in `before`.
    pub added: Vec<String>,

    /// Entries in `before` but not in `entries`.
    pub removed: Vec<String>,

    /// Shared entries changed their relative order.
    pub reordered: bool,
}

impl Reconciliation {
    /// Reconcile existing entries with discovered directories and files.
    pub fn compute(
        existing: &[String],
        dirs: &[String],
        files: &[String],
        options: &Options,
    ) -> Self {
        let entries = merge(existing, dirs, files, options);
        if entries == existing {
            return Self {
                before: existing.to_vec(),
                entries,
                ..Default::default()
            };
        }

        let (added, removed) = diff(existing, &entries);
        let reordered = order_changed(existing, &entries);

        Self {
            before: existing.to_vec(),
            entries,
            added,
            removed,
            reordered,
        }
    }

    /// Check if the manifest can stay as it is.
    pub fn is_noop(&self) -> bool {
        self.entries == self.before
    }

    /// Summarize the kind of change, e.g., `order+added`.
    ///
    /// Returns `None` when nothing but formatting would change.
    pub fn change_tag(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.reordered {
            parts.push("order");
        }
        if !self.added.is_empty() {
            parts.push("added");
        }
        if !self.removed.is_empty() {
            parts.push("removed");
        }

        (!parts.is_empty()).then(|| parts.join("+"))
    }
}
