// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! User supplied skip patterns.
//!
//! Skip patterns let the user hold back parts of the tree from the managed
//! resource lists. All patterns are matched against the slash-separated path
//! relative to the base directory of the walk. Each pattern compiles to
//! exactly one [`SkipRule`], whose [`SkipMode`] is picked by its shape:
//!
//! | pattern       | mode                  | effect on a directory                           |
//! |---------------|-----------------------|-------------------------------------------------|
//! | `apps/base/**`| [`SkipMode::Subtree`] | stays listed, its own manifest is left alone    |
//! | `apps/base/*` | [`SkipMode::Children`]| stays listed, nothing below it is visited       |
//! | `*.tmp.yaml`  | [`SkipMode::Glob`]    | dropped                                         |
//! | `vendor`      | [`SkipMode::Exact`]   | dropped                                         |
//!
//! Glob rules follow the same syntax as `.gitignore` globs, see
//! [`crate::walk::gitignore`]. Wildcards never cross `/`, so `apps/**/x.yaml`
//! only matches one directory level. Only a trailing `/**` means [`SkipMode::Subtree`].
//!
//! Files matched by any rule are always dropped. Rules are tried in the order
//! they were configured, and the first rule that matches wins.

use crate::walk::gitignore::{shell_pattern, GLOB_OPTIONS};

use glob::Pattern;
use std::fmt::{Display, Formatter, Result as FmtResult};

const GLOB_CHARS: &[char] = &['*', '?', '[', ']'];

/// How a skip rule treats its match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SkipMode {
    /// Literal path, or literal final segment.
    Exact,

    /// Shell glob over the path, or over the final segment.
    Glob,

    /// Directory stays listed but is never descended into.
    Children,

    /// Directory stays listed and is descended into, but its own manifest is
    /// never touched.
    Subtree,
}

impl Display for SkipMode {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Self::Exact => "exact",
            Self::Glob => "glob",
            Self::Children => "children",
            Self::Subtree => "subtree",
        };
        fmt.write_str(name)
    }
}

/// Compiled skip pattern.
#[derive(Debug, Clone)]
pub struct SkipRule {
    raw: String,
    mode: SkipMode,
    value: String,
    glob: Option<Pattern>,
}

impl SkipRule {
    /// Compile a single skip pattern.
    pub fn compile(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let canonical = raw.trim_end_matches('/');

        let (mode, value) = if let Some(prefix) = canonical.strip_suffix("/**") {
            (SkipMode::Subtree, prefix.to_owned())
        } else if let Some(prefix) = raw.strip_suffix("/*") {
            (SkipMode::Children, prefix.to_owned())
        } else if raw.contains(GLOB_CHARS) {
            (SkipMode::Glob, raw.clone())
        } else {
            (SkipMode::Exact, raw.strip_suffix('/').unwrap_or(&raw).to_owned())
        };

        // INVARIANT: A glob that fails to compile never matches.
        let glob = match mode {
            SkipMode::Glob => shell_pattern(&value),
            _ => None,
        };

        Self {
            raw,
            mode,
            value,
            glob,
        }
    }

    /// Pattern as configured.
    pub fn raw(&self) -> &str {
        self.raw.as_str()
    }

    /// Matching semantics of the rule.
    pub fn mode(&self) -> SkipMode {
        self.mode
    }

    /// Normalized value the rule matches against.
    pub fn value(&self) -> &str {
        self.value.as_str()
    }

    /// Match slash-separated path relative to the base directory.
    pub fn matches(&self, relative: &str, is_dir: bool) -> bool {
        let bare = !self.value.contains('/');
        match self.mode {
            SkipMode::Subtree => relative == self.value,
            SkipMode::Children => {
                (is_dir && relative == self.value) || is_direct_child(relative, &self.value)
            }
            SkipMode::Exact => {
                relative == self.value || (bare && file_name(relative) == self.value)
            }
            SkipMode::Glob => self.glob.as_ref().is_some_and(|glob| {
                glob.matches_with(relative, GLOB_OPTIONS)
                    || (bare && glob.matches_with(file_name(relative), GLOB_OPTIONS))
            }),
        }
    }
}

/// Ordered set of skip rules.
#[derive(Debug, Clone, Default)]
pub struct SkipRules {
    rules: Vec<SkipRule>,
}

impl SkipRules {
    /// Compile every pattern, keeping configuration order.
    pub fn compile(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            rules: patterns.into_iter().map(SkipRule::compile).collect(),
        }
    }

    /// First rule matching `relative`, if any.
    pub fn first_match(&self, relative: &str, is_dir: bool) -> Option<&SkipRule> {
        self.rules
            .iter()
            .find(|rule| rule.matches(relative, is_dir))
    }

    /// Compiled rules in configuration order.
    pub fn rules(&self) -> &[SkipRule] {
        self.rules.as_slice()
    }
}

fn file_name(relative: &str) -> &str {
    relative.rsplit('/').next().unwrap_or(relative)
}

fn is_direct_child(relative: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return !relative.contains('/');
    }

    relative
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .is_some_and(|rest| !rest.is_empty() && !rest.contains('/'))
}
