// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Path resolution utilities.
//!
//! Determine relevent path information for external files that need to be
//! interacted with, and render walked paths the way they show up in reports
//! and skip patterns.

use std::path::{Component, Path, PathBuf};

/// Determine default absolute path to configuration file.
///
/// Uses XDG Base Directory path `$XDG_CONFIG_HOME/karma/config.toml` as the
/// default absolute path for the configuration file. Does not check if the
/// path returned actually exists.
///
/// # Errors
///
/// - Return [`NoConfigDir`] if configuration directory cannot be determined.
///
/// # See Also
///
/// - [XDG Base Directory](https://wiki.archlinux.org/title/XDG_Base_Directory)
pub fn default_config_path() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|path| path.join("karma").join("config.toml"))
        .ok_or(NoConfigDir)
}

/// Render path as slash-separated string.
///
/// Skip patterns and ignore rules are always written with `/`, no matter the
/// platform.
pub fn to_slash(path: impl AsRef<Path>) -> String {
    path.as_ref()
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Slash-separated path of `full` relative to `base`.
///
/// Falls back to the file name of `full` when it is not below `base`, or when
/// both point at the same directory.
pub fn relative_slash(base: impl AsRef<Path>, full: impl AsRef<Path>) -> String {
    let full = full.as_ref();
    let relative = full
        .strip_prefix(base.as_ref())
        .map(to_slash)
        .unwrap_or_default();

    if relative.is_empty() {
        return full
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
    }

    relative
}

/// No way to determine user's configuration directory.
///
/// # See Also
///
/// - [`dirs::config_dir`](https://docs.rs/dirs/latest/dirs/fn.config_dir.html)
#[derive(Clone, Debug, thiserror::Error)]
#[error("cannot determine absolute path to user's configuration directory")]
pub struct NoConfigDir;

/// Friendly result alias :3
pub type Result<T, E = NoConfigDir> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn relative_slash_nested() {
        let base = Path::new("/deploy/base");
        let full = base.join("nested").join("file.yaml");
        assert_eq!(relative_slash(base, full), "nested/file.yaml");
    }

    #[test]
    fn relative_slash_falls_back_to_file_name() {
        let base = Path::new("/deploy/base");
        assert_eq!(relative_slash(base, base), "base");
        assert_eq!(relative_slash(base, "/elsewhere/app.yaml"), "app.yaml");
    }

    #[test]
    fn to_slash_skips_root_and_current_dir() {
        assert_eq!(to_slash(Path::new("./apps/web")), "apps/web");
        assert_eq!(to_slash(Path::new("/apps/web")), "apps/web");
    }
}
