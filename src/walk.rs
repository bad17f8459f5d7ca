// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Directory tree walking.
//!
//! The walker visits a base directory and everything below it, depth first.
//! For each visited directory it:
//!
//! 1. Loads the `.gitignore` rules of the directory on top of the rules of
//!    its ancestors.
//! 2. Sorts every entry into an [`EntryDecision`], collecting listed
//!    directories and YAML files.
//! 3. Reconciles the manifest of the directory with what was collected.
//! 4. Recurses into child directories, unless a skip rule says otherwise.
//!
//! Entries are always processed in file name order, so repeated runs over
//! the same tree yield the same manifests and the same event sequence.

pub mod gitignore;
pub mod skip;

use crate::{
    config::Options,
    manifest::{is_manifest_name, Manifest},
    path::relative_slash,
    reconcile::Reconciliation,
    report::{Reporter, SkipReason, Stats},
    walk::{
        gitignore::IgnoreStack,
        skip::{SkipMode, SkipRules},
    },
};

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tracing::{debug, instrument};
use walkdir::WalkDir;

/// Shared cancellation flag.
///
/// Checked before each directory is visited. Clones share the same flag.
#[derive(Debug, Default, Clone)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Construct new uncancelled token.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Check if cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// How the walker treats a listed directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recursion {
    /// Visit directory and reconcile its manifest.
    Descend,

    /// Visit directory, but leave its own manifest alone.
    Frozen,

    /// Never visit directory.
    Listed,
}

/// Outcome for a single directory entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryDecision {
    /// Reserved name, dot entry, or not a YAML file.
    Ineligible,

    /// Matched by `.gitignore` rules.
    Ignored,

    /// Matched by a skip rule that drops the entry.
    Excluded(SkipReason),

    /// Listed as directory resource.
    Directory {
        recursion: Recursion,
        reason: Option<SkipReason>,
    },

    /// Listed as file resource.
    File,
}

/// Check if file name carries a YAML extension.
pub fn is_yaml(name: &str) -> bool {
    let name = name.to_lowercase();
    name.ends_with(".yaml") || name.ends_with(".yml")
}

#[derive(Debug, Default)]
struct Scan {
    dirs: Vec<String>,
    files: Vec<String>,
    children: Vec<(String, Recursion)>,
}

/// Walk directory trees, and keep their manifests in sync.
pub struct Walker<'a, R: Reporter> {
    options: &'a Options,
    skip: SkipRules,
    ignores: IgnoreStack,
    reporter: &'a mut R,
    cancel: CancelToken,
}

impl<'a, R: Reporter> Walker<'a, R> {
    /// Construct new walker.
    pub fn new(options: &'a Options, reporter: &'a mut R) -> Self {
        Self {
            options,
            skip: SkipRules::compile(options.skip.iter().cloned()),
            ignores: IgnoreStack::new(options.gitignore),
            reporter,
            cancel: CancelToken::new(),
        }
    }

    /// Observe `cancel` while walking.
    pub fn with_cancel(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Walk tree rooted at `base`.
    ///
    /// # Errors
    ///
    /// - Return [`WalkError::Cancelled`] if cancellation was requested.
    /// - Return [`WalkError::ReadDir`] if a directory cannot be listed.
    /// - Return [`WalkError::Ignore`] if a `.gitignore` cannot be read.
    /// - Return [`WalkError::Manifest`] if a manifest cannot be loaded or
    ///   saved.
    pub fn walk(&mut self, base: impl AsRef<Path>) -> Result<Stats> {
        let base = base.as_ref();
        self.reporter.base(base);
        self.ignores = IgnoreStack::new(self.options.gitignore);
        self.walk_dir(base, base, None, false)
    }

    /// Decide what to do with entry at `path` inside `dir`.
    pub fn decide(&self, dir: &Path, path: &Path, relative: &str, is_dir: bool) -> EntryDecision {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy())
            .unwrap_or_default();

        if is_manifest_name(&name) {
            return EntryDecision::Ineligible;
        }

        if !self.options.include_dot && name.starts_with('.') {
            return EntryDecision::Ineligible;
        }

        if self.ignores.is_ignored(dir, path, is_dir) {
            return EntryDecision::Ignored;
        }

        if let Some(rule) = self.skip.first_match(relative, is_dir) {
            let reason = SkipReason::Pattern {
                mode: rule.mode(),
                pattern: rule.raw().to_owned(),
            };

            return match (is_dir, rule.mode()) {
                (true, SkipMode::Children) => EntryDecision::Directory {
                    recursion: Recursion::Listed,
                    reason: Some(reason),
                },
                (true, SkipMode::Subtree) => EntryDecision::Directory {
                    recursion: Recursion::Frozen,
                    reason: Some(reason),
                },
                _ => EntryDecision::Excluded(reason),
            };
        }

        if is_dir {
            EntryDecision::Directory {
                recursion: Recursion::Descend,
                reason: None,
            }
        } else if is_yaml(&name) {
            EntryDecision::File
        } else {
            EntryDecision::Ineligible
        }
    }

    #[instrument(skip(self, base, parent), level = "debug")]
    fn walk_dir(
        &mut self,
        base: &Path,
        dir: &Path,
        parent: Option<&Path>,
        frozen: bool,
    ) -> Result<Stats> {
        if self.cancel.is_cancelled() {
            return Err(WalkError::Cancelled);
        }

        self.reporter.directory(dir);
        self.ignores.enter(dir, parent)?;

        let scan = self.scan(base, dir)?;
        let mut stats = self.reconcile_dir(dir, &scan, frozen)?;

        for (name, recursion) in &scan.children {
            if *recursion == Recursion::Listed {
                continue;
            }

            let child = dir.join(name);
            stats += self.walk_dir(base, &child, Some(dir), *recursion == Recursion::Frozen)?;
        }

        Ok(stats)
    }

    fn scan(&mut self, base: &Path, dir: &Path) -> Result<Scan> {
        let mut scan = Scan::default();
        let listing = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name();

        for entry in listing {
            let entry = entry.map_err(|err| WalkError::ReadDir {
                source: err,
                dir_path: dir.to_path_buf(),
            })?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let is_dir = entry.file_type().is_dir();
            let relative = relative_slash(base, entry.path());

            match self.decide(dir, entry.path(), &relative, is_dir) {
                EntryDecision::Ineligible => {}
                EntryDecision::Ignored => self.reporter.skipped(&relative, &SkipReason::Gitignore),
                EntryDecision::Excluded(reason) => self.reporter.skipped(&relative, &reason),
                EntryDecision::Directory { recursion, reason } => {
                    if let Some(reason) = reason {
                        self.reporter.skipped(&relative, &reason);
                    }
                    scan.dirs.push(name.clone());
                    scan.children.push((name, recursion));
                }
                EntryDecision::File => scan.files.push(name),
            }
        }

        debug!(
            "found {} directories and {} files in {:?}",
            scan.dirs.len(),
            scan.files.len(),
            dir.display()
        );

        Ok(scan)
    }

    fn reconcile_dir(&mut self, dir: &Path, scan: &Scan, frozen: bool) -> Result<Stats> {
        if frozen {
            self.reporter.frozen(dir);
            return Ok(Stats::default());
        }

        let (manifest_path, exists) = Manifest::locate(dir)?;
        let manifest = Manifest::load(manifest_path, exists)?;
        let reconciliation =
            Reconciliation::compute(manifest.entries(), &scan.dirs, &scan.files, self.options);

        if reconciliation.is_noop() {
            self.reporter.no_op(manifest.path());
            return Ok(Stats::no_op());
        }

        manifest.save(&reconciliation.entries)?;
        self.reporter.updated(manifest.path(), &reconciliation);

        Ok(Stats::updated(&reconciliation))
    }
}

/// Walk every base directory in turn, then report the summary.
///
/// Each base directory is walked on its own, starting with fresh ignore
/// rules.
///
/// # Errors
///
/// - Return any [`WalkError`] of the first base directory that fails.
pub fn run<R: Reporter>(
    options: &Options,
    bases: &[PathBuf],
    reporter: &mut R,
    cancel: &CancelToken,
) -> Result<Stats> {
    let mut total = Stats::default();
    for base in bases {
        total += Walker::new(options, reporter)
            .with_cancel(cancel.clone())
            .walk(base)?;
    }

    reporter.summary(&total);
    Ok(total)
}

/// Walk error types.
#[derive(Debug, thiserror::Error)]
pub enum WalkError {
    /// Directory cannot be listed.
    #[error("failed to read directory at {:?}", dir_path.display())]
    ReadDir {
        #[source]
        source: walkdir::Error,
        dir_path: PathBuf,
    },

    /// Ignore rules cannot be loaded.
    #[error(transparent)]
    Ignore(#[from] crate::walk::gitignore::IgnoreError),

    /// Manifest cannot be loaded or saved.
    #[error(transparent)]
    Manifest(#[from] crate::manifest::ManifestError),

    /// Cancellation was requested.
    #[error("walk cancelled")]
    Cancelled,
}

/// Friendly result alias :3
pub type Result<T, E = WalkError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{Event, EventLog};
    use simple_test_case::test_case;
    use std::fs::{create_dir_all, read_to_string, write};
    use tempfile::tempdir;

    #[test_case("app.yaml", true; "lower yaml")]
    #[test_case("APP.YML", true; "upper yml")]
    #[test_case("app.json", false; "json")]
    #[test_case("yaml", false; "bare name")]
    #[test]
    fn detect_yaml(name: &str, expect: bool) {
        assert_eq!(is_yaml(name), expect);
    }

    #[test]
    fn decide_entries() -> anyhow::Result<()> {
        let root = tempdir()?;
        write(root.path().join(".gitignore"), "ignored.yaml\n")?;

        let options = Options {
            skip: vec!["frozen/**".into(), "listed/*".into(), "drop".into()],
            ..Default::default()
        };
        let mut log = EventLog::new();
        let mut walker = Walker::new(&options, &mut log);
        walker.ignores.enter(root.path(), None)?;

        let dir = root.path();
        let decide = |name: &str, is_dir: bool| walker.decide(dir, &dir.join(name), name, is_dir);

        assert_eq!(decide("kustomization.yml", false), EntryDecision::Ineligible);
        assert_eq!(decide(".hidden.yaml", false), EntryDecision::Ineligible);
        assert_eq!(decide("notes.txt", false), EntryDecision::Ineligible);
        assert_eq!(decide("ignored.yaml", false), EntryDecision::Ignored);
        assert_eq!(decide("app.yaml", false), EntryDecision::File);
        assert_eq!(
            decide("apps", true),
            EntryDecision::Directory {
                recursion: Recursion::Descend,
                reason: None,
            }
        );
        assert_eq!(
            decide("frozen", true),
            EntryDecision::Directory {
                recursion: Recursion::Frozen,
                reason: Some(SkipReason::Pattern {
                    mode: SkipMode::Subtree,
                    pattern: "frozen/**".into(),
                }),
            }
        );
        assert_eq!(
            decide("listed", true),
            EntryDecision::Directory {
                recursion: Recursion::Listed,
                reason: Some(SkipReason::Pattern {
                    mode: SkipMode::Children,
                    pattern: "listed/*".into(),
                }),
            }
        );
        assert_eq!(
            decide("drop", true),
            EntryDecision::Excluded(SkipReason::Pattern {
                mode: SkipMode::Exact,
                pattern: "drop".into(),
            })
        );

        Ok(())
    }

    #[test]
    fn include_dot_entries() -> anyhow::Result<()> {
        let root = tempdir()?;
        let options = Options {
            include_dot: true,
            ..Default::default()
        };
        let mut log = EventLog::new();
        let walker = Walker::new(&options, &mut log);

        let path = root.path().join(".config.yaml");
        assert_eq!(
            walker.decide(root.path(), &path, ".config.yaml", false),
            EntryDecision::File
        );

        Ok(())
    }

    #[test]
    fn walk_reconciles_before_children() -> anyhow::Result<()> {
        let root = tempdir()?;
        create_dir_all(root.path().join("apps/web"))?;
        write(root.path().join("apps/web/deploy.yaml"), "kind: Deployment\n")?;

        let options = Options::default();
        let mut log = EventLog::new();
        let stats = Walker::new(&options, &mut log).walk(root.path())?;

        assert_eq!(
            stats,
            Stats {
                updated: 3,
                added: 3,
                ..Default::default()
            }
        );
        assert_eq!(
            log.updated_paths(),
            vec![
                root.path().join("kustomization.yaml"),
                root.path().join("apps/kustomization.yaml"),
                root.path().join("apps/web/kustomization.yaml"),
            ]
        );

        let manifest = read_to_string(root.path().join("apps/kustomization.yaml"))?;
        assert!(manifest.contains("  - web/\n"));

        Ok(())
    }

    #[test]
    fn children_skip_stops_descent() -> anyhow::Result<()> {
        let root = tempdir()?;
        create_dir_all(root.path().join("vendor/lib"))?;
        write(root.path().join("vendor/lib/a.yaml"), "")?;

        let options = Options {
            skip: vec!["vendor/*".into()],
            ..Default::default()
        };
        let mut log = EventLog::new();
        Walker::new(&options, &mut log).walk(root.path())?;

        assert_eq!(log.directories(), vec![root.path()]);
        assert!(!root.path().join("vendor/kustomization.yaml").exists());
        assert_eq!(log.skipped_entries().len(), 1);

        Ok(())
    }

    #[test]
    fn empty_directory_is_noop() -> anyhow::Result<()> {
        let root = tempdir()?;
        let options = Options::default();
        let mut log = EventLog::new();
        let stats = Walker::new(&options, &mut log).walk(root.path())?;

        assert_eq!(stats, Stats::no_op());
        assert!(!root.path().join("kustomization.yaml").exists());

        Ok(())
    }

    #[test]
    fn cancelled_walk_touches_nothing() -> anyhow::Result<()> {
        let root = tempdir()?;
        write(root.path().join("app.yaml"), "")?;

        let cancel = CancelToken::new();
        cancel.cancel();
        let options = Options::default();
        let mut log = EventLog::new();
        let result = run(&options, &[root.path().to_path_buf()], &mut log, &cancel);

        assert!(matches!(result, Err(WalkError::Cancelled)));
        assert!(!root.path().join("kustomization.yaml").exists());
        assert_eq!(log.events(), [Event::Base(root.path().to_path_buf())]);

        Ok(())
    }

    #[test]
    fn missing_base_is_an_error() {
        let options = Options::default();
        let mut log = EventLog::new();
        let result = Walker::new(&options, &mut log).walk("/definitely/not/here");
        assert!(matches!(result, Err(WalkError::ReadDir { .. })));
    }
}
