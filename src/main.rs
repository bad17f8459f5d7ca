// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use karma::{
    config::{ConfigError, KarmaConfig, Options, ResourceOrder},
    path::default_config_path,
    report::TracingReporter,
    walk::{run, CancelToken, WalkError},
};

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use std::{path::PathBuf, process::exit};
use tracing::{debug, error, level_filters::LevelFilter};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Exit code used when the run was interrupted.
const EXIT_CANCELLED: i32 = 130;

/// Keep kustomization resource lists in sync with the directory tree.
#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "karma [options] <dir>...",
    version
)]
struct Cli {
    /// Base directories to walk.
    #[arg(value_name = "dir")]
    pub dirs: Vec<PathBuf>,

    /// Skip pattern, repeatable and comma-separated.
    #[arg(short, long, value_name = "pattern", value_delimiter = ',')]
    pub skip: Vec<String>,

    /// Do not honor .gitignore files.
    #[arg(short = 'g', long)]
    pub no_gitignore: bool,

    /// Include dot-prefixed entries.
    #[arg(short, long)]
    pub include_dot: bool,

    /// Do not add a trailing slash to directory entries.
    #[arg(long)]
    pub no_dir_slash: bool,

    /// Prefix directory entries with "./".
    #[arg(short = 'p', long)]
    pub dir_prefix: bool,

    /// Comma-separated resource group order, e.g., "dirs,files,remote".
    #[arg(short, long, value_name = "groups")]
    pub order: Option<ResourceOrder>,

    /// Configuration file to use.
    #[arg(short, long, value_name = "path")]
    pub config: Option<PathBuf>,

    /// Increase verbosity, repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Suppress progress output, fatal errors are still reported.
    #[arg(short = 'q', long)]
    pub mute: bool,
}

impl Cli {
    fn level(&self) -> LevelFilter {
        match (self.mute, self.verbose) {
            (true, _) => LevelFilter::ERROR,
            (false, 0) => LevelFilter::INFO,
            (false, 1) => LevelFilter::DEBUG,
            (false, _) => LevelFilter::TRACE,
        }
    }

    /// Resolve configuration file, then lay command line flags over it.
    fn resolve(self) -> Result<(Options, Vec<PathBuf>)> {
        let config = match self.config.clone() {
            Some(path) => KarmaConfig::load(path)?,
            None => match default_config_path() {
                Ok(path) if path.is_file() => KarmaConfig::load(path)?,
                _ => KarmaConfig::default(),
            },
        };

        let mut options = config.options();
        if !self.skip.is_empty() {
            options.skip = self.skip;
        }
        if self.no_gitignore {
            options.gitignore = false;
        }
        if self.include_dot {
            options.include_dot = true;
        }
        if self.no_dir_slash {
            options.dir_slash = false;
        }
        if self.dir_prefix {
            options.dir_prefix = true;
        }
        if let Some(order) = self.order {
            options.order = order;
        }

        let bases = if self.dirs.is_empty() {
            config.base_dirs().to_vec()
        } else {
            self.dirs
        };
        if bases.is_empty() {
            return Err(ConfigError::NoBaseDirs.into());
        }

        Ok((options, bases))
    }
}

fn main() {
    let cli = Cli::parse();

    let layer = fmt::layer().compact().with_target(false).without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::builder()
            .with_default_directive(cli.level().into())
            .parse_lossy("")
    });
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    if let Err(error) = run_cli(cli) {
        if matches!(error.downcast_ref::<WalkError>(), Some(WalkError::Cancelled)) {
            error!("interrupted");
            exit(EXIT_CANCELLED);
        }

        error!("{error:?}");
        exit(1);
    }

    exit(0)
}

fn run_cli(cli: Cli) -> Result<()> {
    let (options, bases) = cli.resolve()?;
    debug!("resolved options: {options:?}");
    debug!("base directories: {bases:?}");

    let cancel = CancelToken::new();
    let handler = cancel.clone();
    ctrlc::set_handler(move || handler.cancel()).context("failed to set interrupt handler")?;

    let mut reporter = TracingReporter;
    run(&options, &bases, &mut reporter, &cancel)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn level_follows_verbosity() {
        let level = |args: &[&str]| Cli::parse_from(args.iter().copied()).level();

        assert_eq!(level(&["karma", "."]), LevelFilter::INFO);
        assert_eq!(level(&["karma", "-v", "."]), LevelFilter::DEBUG);
        assert_eq!(level(&["karma", "-vvv", "."]), LevelFilter::TRACE);
    }

    #[test]
    fn mute_keeps_fatal_errors() {
        assert_eq!(Cli::parse_from(["karma", "-q", "."]).level(), LevelFilter::ERROR);
        assert_eq!(
            Cli::parse_from(["karma", "-q", "-vv", "."]).level(),
            LevelFilter::ERROR
        );
    }
}
