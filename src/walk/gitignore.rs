// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Hierarchical `.gitignore` handling.
//!
//! Every directory visited by the walker may carry its own `.gitignore` file.
//! Rules of a directory apply to everything below it, so a path is ignored
//! when the rules of its own directory, or the rules of _any_ ancestor
//! directory up to the base of the walk, say so. Closer rules are checked
//! first.
//!
//! # Rule Syntax
//!
//! Only a small subset of gitignore syntax is understood:
//!
//! - Blank lines and lines starting with `#` are skipped.
//! - A trailing `/` restricts the rule to directories.
//! - Rules containing any of `*?[]` are shell globs matched against the path
//!   relative to the directory that owns the rule. Wildcards never cross `/`,
//!   so `**` reads the same as `*`. Classes are negated with `[^..]` or `[!..]`.
//! - Everything else must equal the relative path exactly.
//!
//! There is no negation. Once any level ignores a path, nothing can bring it
//! back. A rule that fails to compile as a glob simply never matches.

use crate::path::to_slash;

use glob::{MatchOptions, Pattern};
use std::{
    collections::HashMap,
    fs::read,
    io::ErrorKind,
    path::{Path, PathBuf},
};
use tracing::trace;

/// Name of the rule file loaded from each directory.
pub const IGNORE_FILE: &str = ".gitignore";

const GLOB_CHARS: &[char] = &['*', '?', '[', ']'];

pub(crate) const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Compile shell glob where wildcards stay inside a single path segment.
///
/// Runs of `*` collapse into one, and `[^` opens a negated class just like
/// `[!` does.
pub(crate) fn shell_pattern(raw: &str) -> Option<Pattern> {
    let mut pattern = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '*' => {
                while chars.next_if_eq(&'*').is_some() {}
                pattern.push('*');
            }
            '[' => {
                pattern.push('[');
                if chars.next_if_eq(&'^').is_some() {
                    pattern.push('!');
                }
            }
            _ => pattern.push(ch),
        }
    }

    Pattern::new(&pattern).ok()
}

/// Single ignore rule.
#[derive(Debug, Clone)]
pub struct IgnoreRule {
    raw: String,
    dir_only: bool,
    kind: RuleKind,
}

#[derive(Debug, Clone)]
enum RuleKind {
    AnyDir,
    Exact(String),
    Glob(Option<Pattern>),
}

impl IgnoreRule {
    /// Compile a single rule line.
    ///
    /// Returns `None` for blank lines and comments.
    pub fn parse(line: impl AsRef<str>) -> Option<Self> {
        let line = line.as_ref().trim();
        if line.is_empty() || line.starts_with('#') {
            return None;
        }

        let (pattern, dir_only) = match line.strip_suffix('/') {
            Some(pattern) => (pattern, true),
            None => (line, false),
        };

        let kind = if pattern.is_empty() {
            RuleKind::AnyDir
        } else if pattern.contains(GLOB_CHARS) {
            RuleKind::Glob(shell_pattern(pattern))
        } else {
            RuleKind::Exact(pattern.to_owned())
        };

        Some(Self {
            raw: line.to_owned(),
            dir_only,
            kind,
        })
    }

    /// Rule as written in the rule file.
    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// Match slash-separated path relative to the owning directory.
    pub fn matches(&self, relative: &str, is_dir: bool) -> bool {
        if self.dir_only && !is_dir {
            return false;
        }

        match &self.kind {
            RuleKind::AnyDir => true,
            RuleKind::Exact(pattern) => relative == pattern,
            RuleKind::Glob(Some(pattern)) => pattern.matches_with(relative, GLOB_OPTIONS),
            RuleKind::Glob(None) => false,
        }
    }
}

/// Rules of one directory, plus handle to the rules of its parent.
///
/// The parent handle is only a key into the [`IgnoreStack`] that owns every
/// matcher of a walk.
#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    dir: PathBuf,
    parent: Option<PathBuf>,
    rules: Vec<IgnoreRule>,
}

impl IgnoreMatcher {
    /// Construct matcher from rule file content.
    pub fn new(dir: impl Into<PathBuf>, parent: Option<PathBuf>, content: &str) -> Self {
        Self {
            dir: dir.into(),
            parent,
            rules: content.lines().filter_map(IgnoreRule::parse).collect(),
        }
    }

    /// Load matcher from the rule file of `dir`.
    ///
    /// A missing rule file results in a matcher without rules.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::ReadIgnoreFile`] if the rule file exists but
    ///   cannot be read.
    pub fn load(dir: impl Into<PathBuf>, parent: Option<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        let ignore_path = dir.join(IGNORE_FILE);
        let content = match read(&ignore_path) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(IgnoreError::ReadIgnoreFile {
                    source: err,
                    ignore_path,
                })
            }
        };

        Ok(Self::new(dir, parent, &content))
    }

    /// Directory owning the rules.
    pub fn dir(&self) -> &Path {
        self.dir.as_path()
    }

    /// Loaded rules in file order.
    pub fn rules(&self) -> &[IgnoreRule] {
        self.rules.as_slice()
    }

    /// Match path against the rules of this directory only.
    pub fn matches(&self, path: &Path, is_dir: bool) -> bool {
        let Ok(relative) = path.strip_prefix(&self.dir) else {
            return false;
        };
        let relative = to_slash(relative);

        self.rules
            .iter()
            .any(|rule| rule.matches(relative.as_str(), is_dir))
    }
}

/// Memoized chain of ignore matchers for one walk.
///
/// Matchers are keyed by directory. A matcher refers to its parent by key, so
/// the stack stays the sole owner of every matcher.
#[derive(Debug, Default)]
pub struct IgnoreStack {
    enabled: bool,
    matchers: HashMap<PathBuf, IgnoreMatcher>,
}

impl IgnoreStack {
    /// Construct new ignore stack.
    ///
    /// A disabled stack never reads rule files and never ignores anything.
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            matchers: HashMap::new(),
        }
    }

    /// Load matcher for `dir` below `parent`, reusing it if already loaded.
    ///
    /// # Errors
    ///
    /// - Return [`IgnoreError::ReadIgnoreFile`] if the rule file of `dir`
    ///   cannot be read.
    pub fn enter(&mut self, dir: &Path, parent: Option<&Path>) -> Result<()> {
        if !self.enabled || self.matchers.contains_key(dir) {
            return Ok(());
        }

        let matcher = IgnoreMatcher::load(dir, parent.map(Path::to_path_buf))?;
        trace!(
            "loaded {} ignore rules for {:?}",
            matcher.rules().len(),
            dir.display()
        );
        self.matchers.insert(dir.to_path_buf(), matcher);

        Ok(())
    }

    /// Check if `path` is ignored by the matcher of `dir` or its ancestors.
    pub fn is_ignored(&self, dir: &Path, path: &Path, is_dir: bool) -> bool {
        if !self.enabled {
            return false;
        }

        let mut current = self.matchers.get(dir);
        while let Some(matcher) = current {
            if matcher.matches(path, is_dir) {
                return true;
            }

            current = matcher
                .parent
                .as_deref()
                .and_then(|parent| self.matchers.get(parent));
        }

        false
    }
}

/// Ignore rule error types.
#[derive(Debug, thiserror::Error)]
pub enum IgnoreError {
    /// Rule file exists but cannot be read from.
    #[error("failed to read ignore file at {:?}", ignore_path.display())]
    ReadIgnoreFile {
        #[source]
        source: std::io::Error,
        ignore_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = IgnoreError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use simple_test_case::test_case;
    use std::fs::{create_dir, write};
    use tempfile::tempdir;

    #[test_case("app.yaml", "app.yaml", false, true; "exact match")]
    #[test_case("app.yaml", "other.yaml", false, false; "exact mismatch")]
    #[test_case("app.yaml", "sub/app.yaml", false, false; "exact is not recursive")]
    #[test_case("config/", "config", true, true; "dir rule on dir")]
    #[test_case("config/", "config", false, false; "dir rule on file")]
    #[test_case("config/", "config/file", true, false; "dir rule on nested path")]
    #[test_case("/", "anything", true, true; "bare slash matches every dir")]
    #[test_case("docs/*.md", "docs/guide.md", false, true; "glob match")]
    #[test_case("docs/*.md", "src/guide.md", false, false; "glob mismatch")]
    #[test_case("*.md", "docs/guide.md", false, false; "glob does not cross slash")]
    #[test_case("[invalid", "[invalid", false, false; "malformed glob never matches")]
    #[test_case("docs/**.md", "docs/guide.md", false, true; "double star stays in segment")]
    #[test_case("**/guide.md", "docs/nested/guide.md", false, false; "double star does not cross slash")]
    #[test_case("[^a]*.md", "b.md", false, true; "caret class negation")]
    #[test_case("[^a]*.md", "a.md", false, false; "caret class excludes")]
    #[test]
    fn rule_matches(rule: &str, path: &str, is_dir: bool, expect: bool) {
        let rule = IgnoreRule::parse(rule).unwrap();
        assert_eq!(rule.matches(path, is_dir), expect);
    }

    #[test]
    fn parse_skips_comments_and_blank_lines() {
        let matcher = IgnoreMatcher::new(
            "/deploy",
            None,
            indoc! {"
                #comment

                # another comment
                  spaced.yaml
                \t#ignored
                keep.yaml
            "},
        );

        let rules = matcher.rules().iter().map(IgnoreRule::raw).collect::<Vec<_>>();
        assert_eq!(rules, vec!["spaced.yaml", "keep.yaml"]);
    }

    #[test]
    fn malformed_rule_does_not_affect_others() {
        let matcher = IgnoreMatcher::new("/deploy", None, "[broken\nsecret.txt\n");
        assert!(matcher.matches(Path::new("/deploy/secret.txt"), false));
        assert!(!matcher.matches(Path::new("/deploy/[broken"), false));
    }

    #[test]
    fn load_missing_file_yields_empty_matcher() -> anyhow::Result<()> {
        let root = tempdir()?;
        let matcher = IgnoreMatcher::load(root.path(), None)?;
        assert!(matcher.rules().is_empty());

        Ok(())
    }

    #[test]
    fn stack_inherits_parent_rules() -> anyhow::Result<()> {
        let root = tempdir()?;
        let child = root.path().join("child");
        create_dir(&child)?;
        write(root.path().join(IGNORE_FILE), "child/cache.tmp\nsubdir/\n")?;
        write(child.join(IGNORE_FILE), "child.txt\n")?;

        let mut stack = IgnoreStack::new(true);
        stack.enter(root.path(), None)?;
        stack.enter(&child, Some(root.path()))?;

        assert!(stack.is_ignored(root.path(), &root.path().join("subdir"), true));
        assert!(stack.is_ignored(&child, &child.join("cache.tmp"), false));
        assert!(stack.is_ignored(&child, &child.join("child.txt"), false));
        assert!(!stack.is_ignored(root.path(), &root.path().join("child.txt"), false));
        assert!(!stack.is_ignored(&child, &child.join("other.txt"), false));

        Ok(())
    }

    #[test]
    fn stack_memoizes_matchers() -> anyhow::Result<()> {
        let root = tempdir()?;
        let mut stack = IgnoreStack::new(true);
        stack.enter(root.path(), None)?;

        // Rules written after the first load are not picked up again.
        write(root.path().join(IGNORE_FILE), "late.yaml\n")?;
        stack.enter(root.path(), None)?;
        assert!(!stack.is_ignored(root.path(), &root.path().join("late.yaml"), false));

        Ok(())
    }

    #[test]
    fn disabled_stack_ignores_nothing() -> anyhow::Result<()> {
        let root = tempdir()?;
        write(root.path().join(IGNORE_FILE), "secret.txt\n")?;

        let mut stack = IgnoreStack::new(false);
        stack.enter(root.path(), None)?;
        assert!(!stack.is_ignored(root.path(), &root.path().join("secret.txt"), false));

        Ok(())
    }
}
