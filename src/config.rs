// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Karma runs off a single resolved [`Options`] value that is built once per
//! run and handed down to the walker. Options come from two places: an
//! optional TOML configuration file, and the command line. The command line
//! always wins.
//!
//! # Configuration File Layout
//!
//! ```toml
//! [settings]
//! skip = ["vendor", "apps/*"]
//! gitignore = true
//! include_dot = false
//! dir_slash = true
//! dir_prefix = false
//! order = ["remote", "dirs", "files"]
//! base_dirs = ["$HOME/deploy/clusters"]
//! ```
//!
//! Every field is optional. Missing fields fall back to the defaults of
//! [`Options`].

use serde::{Deserialize, Serialize};
use std::{
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
};

/// Group of entries inside the managed resource list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceGroup {
    /// Remote references, e.g., `https://github.com/org/repo//base`.
    Remote,

    /// Subdirectories discovered on disk.
    Dirs,

    /// YAML files discovered on disk.
    Files,
}

impl ResourceGroup {
    /// All groups in their default order.
    pub const DEFAULT_ORDER: [ResourceGroup; 3] = [Self::Remote, Self::Dirs, Self::Files];

    /// Name of the group as written in configuration.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Dirs => "dirs",
            Self::Files => "files",
        }
    }
}

impl FromStr for ResourceGroup {
    type Err = ConfigError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        match name.trim().to_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "dirs" => Ok(Self::Dirs),
            "files" => Ok(Self::Files),
            _ => Err(ConfigError::UnknownGroup {
                name: name.to_owned(),
            }),
        }
    }
}

impl Display for ResourceGroup {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(self.as_str())
    }
}

/// Order in which resource groups are concatenated.
///
/// # Invariant
///
/// - Each [`ResourceGroup`] appears exactly once.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceOrder(Vec<ResourceGroup>);

impl ResourceOrder {
    /// Construct new resource order.
    ///
    /// Duplicate groups are dropped, and any group that was left out is
    /// appended in default order.
    pub fn new(groups: impl IntoIterator<Item = ResourceGroup>) -> Self {
        let mut order = Vec::with_capacity(ResourceGroup::DEFAULT_ORDER.len());
        for group in groups
            .into_iter()
            .chain(ResourceGroup::DEFAULT_ORDER)
        {
            if !order.contains(&group) {
                order.push(group);
            }
        }

        Self(order)
    }

    /// Groups in concatenation order.
    pub fn groups(&self) -> &[ResourceGroup] {
        self.0.as_slice()
    }
}

impl Default for ResourceOrder {
    fn default() -> Self {
        Self(ResourceGroup::DEFAULT_ORDER.to_vec())
    }
}

impl FromStr for ResourceOrder {
    type Err = ConfigError;

    /// Parse comma-separated group listing, e.g., `dirs,files`.
    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let groups = data
            .split(',')
            .filter(|part| !part.trim().is_empty())
            .map(ResourceGroup::from_str)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(groups))
    }
}

impl Display for ResourceOrder {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        let names = self.0.iter().map(ResourceGroup::as_str).collect::<Vec<_>>();
        fmt.write_str(names.join(",").as_str())
    }
}

/// Resolved options for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Raw skip patterns in configuration order.
    pub skip: Vec<String>,

    /// Honor `.gitignore` files while walking.
    pub gitignore: bool,

    /// Treat dot-prefixed entries like any other entry.
    pub include_dot: bool,

    /// Give directory entries a trailing slash.
    pub dir_slash: bool,

    /// Give directory entries a leading `./`.
    pub dir_prefix: bool,

    /// Group order of the managed list.
    pub order: ResourceOrder,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            skip: Vec::new(),
            gitignore: true,
            include_dot: false,
            dir_slash: true,
            dir_prefix: false,
            order: ResourceOrder::default(),
        }
    }
}

/// Configuration file layout.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct KarmaConfig {
    /// Settings for every run.
    #[serde(default)]
    pub settings: Settings,
}

impl KarmaConfig {
    /// Load configuration file at `path`.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::ReadConfig`] if the file cannot be read.
    /// - Return [`ConfigError::Deserialize`] if the file is not valid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = read_to_string(path).map_err(|err| ConfigError::ReadConfig {
            source: err,
            config_path: path.to_path_buf(),
        })?;

        data.parse()
    }

    /// Build run options from settings, filling gaps with defaults.
    pub fn options(&self) -> Options {
        let defaults = Options::default();
        let settings = &self.settings;
        Options {
            skip: settings.skip.clone().unwrap_or(defaults.skip),
            gitignore: settings.gitignore.unwrap_or(defaults.gitignore),
            include_dot: settings.include_dot.unwrap_or(defaults.include_dot),
            dir_slash: settings.dir_slash.unwrap_or(defaults.dir_slash),
            dir_prefix: settings.dir_prefix.unwrap_or(defaults.dir_prefix),
            order: settings
                .order
                .clone()
                .map(ResourceOrder::new)
                .unwrap_or(defaults.order),
        }
    }

    /// Base directories listed in configuration.
    pub fn base_dirs(&self) -> &[PathBuf] {
        self.settings.base_dirs.as_deref().unwrap_or_default()
    }
}

impl FromStr for KarmaConfig {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let mut config: KarmaConfig = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;

        // INVARIANT: Perform shell expansion on every base directory.
        if let Some(base_dirs) = config.settings.base_dirs.as_mut() {
            for base_dir in base_dirs.iter_mut() {
                *base_dir = PathBuf::from(
                    shellexpand::full(base_dir.to_string_lossy().as_ref())
                        .map_err(ConfigError::ShellExpansion)?
                        .into_owned(),
                );
            }
        }

        Ok(config)
    }
}

impl Display for KarmaConfig {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Optional settings of the configuration file.
#[derive(Default, Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Skip patterns.
    pub skip: Option<Vec<String>>,

    /// Honor `.gitignore` files.
    pub gitignore: Option<bool>,

    /// Include dot-prefixed entries.
    pub include_dot: Option<bool>,

    /// Trailing slash on directory entries.
    pub dir_slash: Option<bool>,

    /// Leading `./` on directory entries.
    pub dir_prefix: Option<bool>,

    /// Resource group order.
    pub order: Option<Vec<ResourceGroup>>,

    /// Base directories to walk when none are given on the command line.
    pub base_dirs: Option<Vec<PathBuf>>,
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Resource group name is not one of `remote`, `dirs`, `files`.
    #[error("invalid resource order item: {name}, allowed are: remote, dirs, files")]
    UnknownGroup { name: String },

    /// Configuration file cannot be read.
    #[error("failed to read configuration file at {:?}", config_path.display())]
    ReadConfig {
        #[source]
        source: std::io::Error,
        config_path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Nothing to walk.
    #[error("no base directory given")]
    NoBaseDirs,
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use sealed_test::prelude::*;
    use simple_test_case::test_case;

    #[test_case("", vec![ResourceGroup::Remote, ResourceGroup::Dirs, ResourceGroup::Files]; "empty falls back to default")]
    #[test_case("files", vec![ResourceGroup::Files, ResourceGroup::Remote, ResourceGroup::Dirs]; "missing groups appended")]
    #[test_case("dirs, FILES ,dirs", vec![ResourceGroup::Dirs, ResourceGroup::Files, ResourceGroup::Remote]; "trimmed and deduplicated")]
    #[test_case("files,,remote", vec![ResourceGroup::Files, ResourceGroup::Remote, ResourceGroup::Dirs]; "blank items ignored")]
    #[test]
    fn parse_resource_order(input: &str, expect: Vec<ResourceGroup>) {
        let result: ResourceOrder = input.parse().unwrap();
        assert_eq!(result.groups(), expect.as_slice());
    }

    #[test]
    fn parse_resource_order_rejects_unknown_group() {
        let result = "dirs,charts".parse::<ResourceOrder>();
        assert!(matches!(
            result,
            Err(ConfigError::UnknownGroup { name }) if name == "charts"
        ));
    }

    #[test]
    fn resource_order_display() {
        let order = ResourceOrder::new([ResourceGroup::Files]);
        assert_eq!(order.to_string(), "files,remote,dirs");
    }

    #[sealed_test(env = [("CLUSTERS", "/srv/clusters")])]
    fn deserialize_karma_config() -> anyhow::Result<()> {
        let result: KarmaConfig = r#"
            [settings]
            skip = ["vendor", "apps/*"]
            gitignore = false
            order = ["files", "dirs"]
            base_dirs = ["$CLUSTERS/prod"]
        "#
        .parse()?;

        let expect = KarmaConfig {
            settings: Settings {
                skip: Some(vec!["vendor".into(), "apps/*".into()]),
                gitignore: Some(false),
                include_dot: None,
                dir_slash: None,
                dir_prefix: None,
                order: Some(vec![ResourceGroup::Files, ResourceGroup::Dirs]),
                base_dirs: Some(vec![PathBuf::from("/srv/clusters/prod")]),
            },
        };
        assert_eq!(result, expect);

        let options = result.options();
        assert_eq!(options.skip, vec!["vendor".to_string(), "apps/*".to_string()]);
        assert!(!options.gitignore);
        assert!(options.dir_slash);
        assert_eq!(
            options.order.groups(),
            &[ResourceGroup::Files, ResourceGroup::Dirs, ResourceGroup::Remote]
        );

        Ok(())
    }

    #[test]
    fn deserialize_rejects_unknown_group() {
        let result = indoc! {r#"
            [settings]
            order = ["dirs", "helm"]
        "#}
        .parse::<KarmaConfig>();
        assert!(matches!(result, Err(ConfigError::Deserialize(_))));
    }

    #[test]
    fn empty_config_uses_defaults() -> anyhow::Result<()> {
        let config: KarmaConfig = "".parse()?;
        assert_eq!(config.options(), Options::default());
        assert!(config.base_dirs().is_empty());

        Ok(())
    }

    #[test]
    fn serialize_karma_config() -> anyhow::Result<()> {
        let config = KarmaConfig {
            settings: Settings {
                skip: Some(vec!["base/**".into()]),
                dir_prefix: Some(true),
                order: Some(vec![ResourceGroup::Dirs]),
                ..Default::default()
            },
        };
        let result = config.to_string();

        assert!(result.starts_with("[settings]\n"));
        assert!(result.contains("dir_prefix = true"));
        assert!(!result.contains("gitignore"));
        assert_eq!(result.parse::<KarmaConfig>()?, config);

        Ok(())
    }
}
