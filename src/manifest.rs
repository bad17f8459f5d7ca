// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Kustomization manifest handling.
//!
//! A manifest is a YAML document that declares, among other things, a
//! `resources` list. Only that list is managed here. Everything else in the
//! document is treated as opaque text, and is written back byte for byte.
//!
//! # Layout
//!
//! The source text of a manifest is split into spans:
//!
//! 1. __head__, everything before the `resources` key.
//! 2. __key__, the `resources:` key line, plus any trailing comment.
//!    Comment lines between the key and a flow list on the next line stay
//!    right below the key.
//! 3. __nodes__, the source text of each list item. Comments placed right
//!    above an item travel with it.
//! 4. __tail__, everything after the last list item.
//!
//! Rendering swaps out the nodes while keeping every other span as is. An
//! item that already existed reuses its original text, so quoting and
//! comments survive a reorder. New lines use the line ending of the source.
//!
//! The YAML itself is validated through [`serde_yaml`] before any of this
//! happens. Content that cannot be handled safely is rejected as a whole,
//! because silently discarding hand written content is never acceptable.

use std::{
    collections::HashMap,
    fs::{metadata, read_to_string, Permissions},
    io::{ErrorKind, Write},
    iter::once,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde_yaml::Value;
use tempfile::NamedTempFile;
use tracing::{debug, instrument};

/// Preferred manifest file name.
pub const CANONICAL_NAME: &str = "kustomization.yaml";

/// Alternate manifest file name, kept when already present.
pub const ALTERNATE_NAME: &str = "kustomization.yml";

/// Top-level key holding the managed list.
pub const MANAGED_KEY: &str = "resources";

const API_VERSION: &str = "kustomize.config.k8s.io/v1beta1";
const KIND: &str = "Kustomization";
const DEFAULT_INDENT: &str = "  ";
const DOCUMENT_MARKER: &str = "---";
const DOCUMENT_END: &str = "...";
const NULL_LITERALS: [&str; 4] = ["~", "null", "Null", "NULL"];

static MANAGED_KEY_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^(?:resources|"resources"|'resources')[ \t]*:(?P<rest>[ \t].*)?$"#)
        .expect("invalid managed key regex")
});

/// Check if file name is reserved for manifests.
pub fn is_manifest_name(name: &str) -> bool {
    name == CANONICAL_NAME || name == ALTERNATE_NAME
}

/// Loaded manifest document.
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    exists: bool,
    has_marker: bool,
    head: String,
    key_prefix: String,
    key_comment: String,
    lead: String,
    indent: String,
    newline: &'static str,
    nodes: Vec<String>,
    index: HashMap<String, usize>,
    entries: Vec<String>,
    tail: String,
}

impl Manifest {
    /// Find manifest path of `dir`.
    ///
    /// Prefers [`CANONICAL_NAME`], then [`ALTERNATE_NAME`]. Candidates that
    /// turn out to be directories are passed over. If neither exists, the
    /// canonical path is returned, marked as absent.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Inspect`] if a candidate cannot be inspected
    ///   for any reason other than not existing.
    pub fn locate(dir: impl AsRef<Path>) -> Result<(PathBuf, bool)> {
        let dir = dir.as_ref();
        for name in [CANONICAL_NAME, ALTERNATE_NAME] {
            let manifest_path = dir.join(name);
            match metadata(&manifest_path) {
                Ok(meta) if meta.is_dir() => continue,
                Ok(_) => return Ok((manifest_path, true)),
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(ManifestError::Inspect {
                        source: err,
                        manifest_path,
                    })
                }
            }
        }

        Ok((dir.join(CANONICAL_NAME), false))
    }

    /// Load manifest from `path`.
    ///
    /// An absent manifest starts out as an empty document.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Read`] if existing manifest cannot be read.
    /// - Return any error of [`Manifest::parse`].
    #[instrument(skip(path), level = "debug")]
    pub fn load(path: impl Into<PathBuf>, exists: bool) -> Result<Self> {
        let path = path.into();
        let content = if exists {
            read_to_string(&path).map_err(|err| ManifestError::Read {
                source: err,
                manifest_path: path.clone(),
            })?
        } else {
            String::new()
        };

        let manifest = Self::parse(path, exists, &content)?;
        debug!(
            "loaded {} entries from {:?}",
            manifest.entries.len(),
            manifest.path.display()
        );

        Ok(manifest)
    }

    /// Parse manifest from source text.
    ///
    /// The header keys `apiVersion` and `kind` are synthesized in front of the
    /// first top-level key when the document has neither of them. A missing
    /// `resources` key is appended to the end of the document, in front of
    /// any trailing `...` document end marker.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Parse`] if content is not valid YAML.
    /// - Return [`ManifestError::NotMapping`] if the document is not a mapping.
    /// - Return [`ManifestError::NotAList`] if `resources` is not a list.
    /// - Return [`ManifestError::UnsupportedEntry`] if a list item is not a
    ///   scalar.
    /// - Return [`ManifestError::UnsupportedLayout`] if the source text cannot
    ///   be split without losing content.
    pub fn parse(path: impl Into<PathBuf>, exists: bool, content: &str) -> Result<Self> {
        let path = path.into();
        let parsed = ParsedValues::extract(&path, content)?;

        let newline = if content.contains("\r\n") { "\r\n" } else { "\n" };
        let mut text = content.to_owned();
        if !text.is_empty() && !text.ends_with('\n') {
            text.push_str(newline);
        }
        let lines = text.split_inclusive('\n').collect::<Vec<_>>();

        let layout_error = |reason: &'static str| ManifestError::UnsupportedLayout {
            manifest_path: path.clone(),
            reason,
        };

        let first = lines
            .iter()
            .map(|line| classify(line))
            .find(|kind| !matches!(kind, LineKind::Blank | LineKind::Comment | LineKind::Directive));
        let has_marker = first == Some(LineKind::Marker);
        if lines
            .iter()
            .find(|line| classify(line) == LineKind::Key)
            .is_some_and(|line| line.starts_with('{'))
        {
            return Err(layout_error("flow style document"));
        }

        let key_line = match parsed.raw_entries {
            Some(_) => Some(
                lines
                    .iter()
                    .position(|line| {
                        classify(line) == LineKind::Key && MANAGED_KEY_LINE.is_match(body(line))
                    })
                    .ok_or_else(|| layout_error("resources key is not a plain block key"))?,
            ),
            None => None,
        };

        let mut manifest = Self {
            path: path.clone(),
            exists,
            has_marker,
            head: String::new(),
            key_prefix: format!("{MANAGED_KEY}:"),
            key_comment: String::new(),
            lead: String::new(),
            indent: DEFAULT_INDENT.to_owned(),
            newline,
            nodes: Vec::new(),
            index: HashMap::new(),
            entries: Vec::new(),
            tail: String::new(),
        };

        let raw_entries = parsed.raw_entries.unwrap_or_default();
        match key_line {
            Some(key) => {
                manifest.head = lines[..key].concat();
                let line = body(lines[key]);

                // INVARIANT: Key line already matched, so captures always exist.
                let rest = MANAGED_KEY_LINE
                    .captures(line)
                    .and_then(|caps| caps.name("rest"))
                    .map(|rest| (rest.start(), rest.as_str()));
                let (prefix_end, rest) = rest.unwrap_or((line.len(), ""));
                manifest.key_prefix = line[..prefix_end].to_owned();

                let value = rest.trim();
                let region_end = if value.is_empty() || value.starts_with('#') {
                    if !value.is_empty() {
                        manifest.key_comment = rest.to_owned();
                    }

                    let next = (key + 1..lines.len())
                        .find(|&line| !matches!(classify(lines[line]), LineKind::Blank | LineKind::Comment));
                    let nested = next
                        .filter(|&line| classify(lines[line]) == LineKind::Indented)
                        .map(|line| (line, body(lines[line]).trim_start()))
                        .filter(|(_, first)| first.starts_with('[') || is_null_literal(first));

                    match nested {
                        Some((line, first)) => {
                            manifest.lead = lines[key + 1..line].concat();
                            let (end, after) = if first.starts_with('[') {
                                close_flow(&lines, line, first)
                                    .ok_or_else(|| layout_error("unterminated flow list"))?
                            } else {
                                (line, first)
                            };
                            manifest.keep_comment(trailing_comment(after));
                            end + 1
                        }
                        None => {
                            let region = scan_block(&lines, key + 1).map_err(layout_error)?;
                            if let Some(indent) = region.indent {
                                manifest.indent = indent.to_owned();
                            }
                            manifest.nodes = region.nodes;
                            region.end
                        }
                    }
                } else if value.starts_with('[') {
                    let (end, after) = close_flow(&lines, key, rest)
                        .ok_or_else(|| layout_error("unterminated flow list"))?;
                    manifest.keep_comment(trailing_comment(after));
                    end + 1
                } else if is_null_literal(value) {
                    manifest.keep_comment(trailing_comment(rest));
                    key + 1
                } else {
                    return Err(layout_error("resources value must be a plain list"));
                };

                if !manifest.nodes.is_empty() && manifest.nodes.len() != raw_entries.len() {
                    return Err(layout_error("list items do not line up with parsed values"));
                }
                manifest.tail = lines[region_end..].concat();
            }
            None => {
                let end = document_end(&lines);
                manifest.head = lines[..end].concat();
                manifest.tail = lines[end..].concat();
            }
        }

        if !parsed.has_header {
            manifest.head = insert_header(&manifest.head, newline);
        }

        for (position, entry) in raw_entries.into_iter().enumerate() {
            if manifest.index.contains_key(&entry) {
                continue;
            }
            manifest.index.insert(entry.clone(), position);
            manifest.entries.push(entry);
        }

        // INVARIANT: Flow and null layouts carry no node text to reuse.
        if manifest.nodes.is_empty() {
            manifest.index.clear();
        }

        Ok(manifest)
    }

    /// Path of manifest file.
    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    /// Check if manifest file existed when loaded.
    pub fn exists(&self) -> bool {
        self.exists
    }

    /// Existing entries in first occurrence order.
    pub fn entries(&self) -> &[String] {
        self.entries.as_slice()
    }

    /// Render document with `entries` as the new managed list.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Serialize`] if new entry cannot be rendered
    ///   as a YAML scalar.
    pub fn render(&self, entries: &[String]) -> Result<String> {
        let mut output = String::with_capacity(self.head.len() + self.tail.len() + 64);
        if !self.has_marker {
            output.push_str(DOCUMENT_MARKER);
            output.push_str(self.newline);
        }
        output.push_str(&self.head);

        output.push_str(&self.key_prefix);
        if entries.is_empty() {
            output.push_str(" []");
        }
        output.push_str(&self.key_comment);
        output.push_str(self.newline);
        output.push_str(&self.lead);

        for entry in entries {
            match self.index.get(entry) {
                Some(&position) => output.push_str(&self.nodes[position]),
                None => output.push_str(&self.render_item(entry)?),
            }
        }

        output.push_str(&self.tail);
        Ok(output)
    }

    /// Render and atomically write manifest with `entries` as managed list.
    ///
    /// Writes into a temporary file next to the manifest first, then renames
    /// it over the manifest. Permissions of an existing manifest are kept.
    ///
    /// # Errors
    ///
    /// - Return [`ManifestError::Serialize`] if rendering fails.
    /// - Return [`ManifestError::Write`] if temporary file cannot be written,
    ///   or cannot replace the manifest.
    #[instrument(skip(self, entries), level = "debug")]
    pub fn save(&self, entries: &[String]) -> Result<()> {
        let rendered = self.render(entries)?;
        let write_error = |err: std::io::Error| ManifestError::Write {
            source: err,
            manifest_path: self.path.clone(),
        };

        let dir = self
            .path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(write_error)?;
        file.write_all(rendered.as_bytes()).map_err(write_error)?;
        file.as_file().sync_all().map_err(write_error)?;

        let permissions = if self.exists {
            Some(metadata(&self.path).map_err(write_error)?.permissions())
        } else {
            default_permissions()
        };
        if let Some(permissions) = permissions {
            file.as_file()
                .set_permissions(permissions)
                .map_err(write_error)?;
        }

        file.persist(&self.path)
            .map_err(|err| write_error(err.error))?;
        debug!("wrote {} entries to {:?}", entries.len(), self.path.display());

        Ok(())
    }

    fn render_item(&self, entry: &str) -> Result<String> {
        let scalar = serde_yaml::to_string(entry).map_err(|err| ManifestError::Serialize {
            source: err,
            manifest_path: self.path.clone(),
        })?;

        Ok(format!("{}- {}{}", self.indent, scalar.trim_end(), self.newline))
    }

    /// Keep comment that trailed a flow or null value.
    ///
    /// The key line holds at most one comment. A second one goes on its own
    /// line right below the key.
    fn keep_comment(&mut self, comment: &str) {
        if comment.is_empty() {
            return;
        }

        if self.key_comment.is_empty() {
            self.key_comment = comment.to_owned();
        } else {
            self.lead.push_str(&self.indent);
            self.lead.push_str(comment.trim_start());
            self.lead.push_str(self.newline);
        }
    }
}

#[cfg(unix)]
fn default_permissions() -> Option<Permissions> {
    use std::os::unix::fs::PermissionsExt;

    Some(Permissions::from_mode(0o644))
}

#[cfg(not(unix))]
fn default_permissions() -> Option<Permissions> {
    None
}

/// Values of interest pulled out of the parsed document.
struct ParsedValues {
    has_header: bool,
    raw_entries: Option<Vec<String>>,
}

impl ParsedValues {
    fn extract(path: &Path, content: &str) -> Result<Self> {
        let empty = Self {
            has_header: false,
            raw_entries: None,
        };
        if content.lines().all(|line| {
            matches!(
                classify(line),
                LineKind::Blank | LineKind::Comment | LineKind::Marker | LineKind::Directive
            )
        }) {
            return Ok(empty);
        }

        let value: Value = serde_yaml::from_str(content).map_err(|err| ManifestError::Parse {
            source: err,
            manifest_path: path.to_path_buf(),
        })?;
        let mapping = match value {
            Value::Null => return Ok(empty),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ManifestError::NotMapping {
                    manifest_path: path.to_path_buf(),
                })
            }
        };

        let has_header = mapping.contains_key("apiVersion") || mapping.contains_key("kind");
        let raw_entries = match mapping.get(MANAGED_KEY) {
            None => None,
            Some(Value::Null) => Some(Vec::new()),
            Some(Value::Sequence(items)) => Some(
                items
                    .iter()
                    .enumerate()
                    .map(|(index, item)| match item {
                        Value::String(value) => Ok(value.clone()),
                        Value::Number(value) => Ok(value.to_string()),
                        Value::Bool(value) => Ok(value.to_string()),
                        _ => Err(ManifestError::UnsupportedEntry {
                            manifest_path: path.to_path_buf(),
                            index,
                        }),
                    })
                    .collect::<Result<Vec<_>>>()?,
            ),
            Some(_) => {
                return Err(ManifestError::NotAList {
                    manifest_path: path.to_path_buf(),
                })
            }
        };

        Ok(Self {
            has_header,
            raw_entries,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Blank,
    Comment,
    Marker,
    Directive,
    Indented,
    Item,
    Key,
}

fn body(line: &str) -> &str {
    line.trim_end_matches(['\n', '\r'])
}

fn classify(line: &str) -> LineKind {
    let body = body(line);
    let trimmed = body.trim_start();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if trimmed.starts_with('#') {
        return LineKind::Comment;
    }
    if trimmed.len() != body.len() {
        return LineKind::Indented;
    }
    if body == DOCUMENT_MARKER || body.starts_with("--- ") || body == DOCUMENT_END {
        return LineKind::Marker;
    }
    if body.starts_with('%') {
        return LineKind::Directive;
    }
    if is_item(body) {
        return LineKind::Item;
    }

    LineKind::Key
}

fn is_item(text: &str) -> bool {
    text == "-" || text.starts_with("- ") || text.starts_with("-\t")
}

fn is_null_literal(value: &str) -> bool {
    let value = value.split(" #").next().unwrap_or(value).trim();
    NULL_LITERALS.contains(&value)
}

/// Trailing comment of `text`, along with the whitespace in front of it.
fn trailing_comment(text: &str) -> &str {
    let mut previous = ' ';
    for (index, ch) in text.char_indices() {
        if ch == '#' && previous.is_whitespace() {
            let start = text[..index].trim_end().len();
            return text[start..].trim_end();
        }
        previous = ch;
    }

    ""
}

/// Line where content of the managed key may be appended.
///
/// That is the end of the document, or the trailing `...` marker if there
/// is one. Blank and comment lines after the marker stay behind it.
fn document_end(lines: &[&str]) -> usize {
    let trailing = lines
        .iter()
        .rev()
        .take_while(|line| matches!(classify(line), LineKind::Blank | LineKind::Comment))
        .count();

    match (lines.len() - trailing).checked_sub(1) {
        Some(last) if body(lines[last]) == DOCUMENT_END => last,
        _ => lines.len(),
    }
}

fn insert_header(head: &str, newline: &str) -> String {
    let header = format!("apiVersion: {API_VERSION}{newline}kind: {KIND}{newline}");
    let mut offset = 0;
    for line in head.split_inclusive('\n') {
        if classify(line) == LineKind::Key {
            let mut result = String::with_capacity(head.len() + header.len());
            result.push_str(&head[..offset]);
            result.push_str(&header);
            result.push_str(&head[offset..]);
            return result;
        }
        offset += line.len();
    }

    format!("{head}{header}")
}

struct BlockRegion<'a> {
    nodes: Vec<String>,
    indent: Option<&'a str>,
    end: usize,
}

/// Collect block list items starting at line `start`.
///
/// Blank and comment lines are held back, and become part of the next item.
/// Those trailing the final item belong to whatever follows the list.
fn scan_block<'a>(lines: &[&'a str], start: usize) -> std::result::Result<BlockRegion<'a>, &'static str> {
    let mut region = BlockRegion {
        nodes: Vec::new(),
        indent: None,
        end: start,
    };
    let mut pending = String::new();

    for (offset, line) in lines[start..].iter().enumerate() {
        match classify(line) {
            LineKind::Blank | LineKind::Comment => pending.push_str(line),
            LineKind::Indented | LineKind::Item => {
                let content = body(line);
                let trimmed = content.trim_start();
                let indent = &content[..content.len() - trimmed.len()];
                let starts_item = is_item(trimmed) && region.indent.is_none_or(|expect| expect == indent);

                if starts_item {
                    region.indent.get_or_insert(indent);
                    let mut node = std::mem::take(&mut pending);
                    node.push_str(line);
                    region.nodes.push(node);
                } else {
                    let Some(node) = region.nodes.last_mut() else {
                        return Err("resources value must be a plain list");
                    };
                    node.push_str(&std::mem::take(&mut pending));
                    node.push_str(line);
                }
                region.end = start + offset + 1;
            }
            _ => break,
        }
    }

    Ok(region)
}

/// Find line that closes flow list opened on line `start`.
///
/// Returns that line, and whatever follows the closing bracket on it.
fn close_flow<'a>(lines: &[&'a str], start: usize, first: &'a str) -> Option<(usize, &'a str)> {
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    let rest = lines[start + 1..].iter().map(|&line| body(line));

    for (offset, text) in once(first).chain(rest).enumerate() {
        let mut previous = ' ';
        for (index, ch) in text.char_indices() {
            match quote {
                Some(open) if ch == open => quote = None,
                Some(_) => {}
                None => match ch {
                    '\'' | '"' => quote = Some(ch),
                    '#' if previous.is_whitespace() => break,
                    '[' | '{' => depth += 1,
                    ']' | '}' => {
                        depth = depth.saturating_sub(1);
                        if depth == 0 {
                            return Some((start + offset, &text[index + ch.len_utf8()..]));
                        }
                    }
                    _ => {}
                },
            }
            previous = ch;
        }
    }

    None
}

/// Manifest error types.
#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    /// Candidate manifest path cannot be inspected.
    #[error("failed to inspect manifest at {:?}", manifest_path.display())]
    Inspect {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Existing manifest cannot be read.
    #[error("failed to read manifest at {:?}", manifest_path.display())]
    Read {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },

    /// Manifest is not valid YAML.
    #[error("failed to parse manifest at {:?}", manifest_path.display())]
    Parse {
        #[source]
        source: serde_yaml::Error,
        manifest_path: PathBuf,
    },

    /// Top level of manifest is not a mapping.
    #[error("manifest at {:?} is not a mapping", manifest_path.display())]
    NotMapping { manifest_path: PathBuf },

    /// Managed key holds something other than a list.
    #[error("resources of manifest at {:?} is not a list", manifest_path.display())]
    NotAList { manifest_path: PathBuf },

    /// List item is not a scalar.
    #[error("resources item {index} of manifest at {:?} is not a scalar", manifest_path.display())]
    UnsupportedEntry { manifest_path: PathBuf, index: usize },

    /// Source text cannot be split safely.
    #[error("cannot rewrite manifest at {:?}: {reason}", manifest_path.display())]
    UnsupportedLayout {
        manifest_path: PathBuf,
        reason: &'static str,
    },

    /// New list item cannot be rendered.
    #[error("failed to render entry for manifest at {:?}", manifest_path.display())]
    Serialize {
        #[source]
        source: serde_yaml::Error,
        manifest_path: PathBuf,
    },

    /// Manifest cannot be written.
    #[error("failed to write manifest at {:?}", manifest_path.display())]
    Write {
        #[source]
        source: std::io::Error,
        manifest_path: PathBuf,
    },
}

/// Friendly result alias :3
pub type Result<T, E = ManifestError> = std::result::Result<T, E>;
