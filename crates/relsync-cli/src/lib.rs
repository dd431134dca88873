//! relsync - release index sync and publishing
#![allow(missing_docs)]
#![allow(clippy::missing_errors_doc)]
//!
//! Thin operator binary over `relsync-core`.
//!
//! # Configuration
//!
//! Settings are layered: built-in defaults, then `relsync.toml` (or the file
//! given with `--config`), then `RELSYNC_*` environment variables, then the
//! flags below.

pub mod cmd;
pub mod codec;
pub mod remote;

use clap::{Args, Parser, Subcommand};
use relsync_core::config::SyncConfig;
use relsync_schema::Version;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "relsync")]
#[command(author, version, about = "relsync - release index sync and publishing")]
pub struct Cli {
    /// Config file (defaults to ./relsync.toml when present)
    #[arg(long, global = true, env = "RELSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Release channel (defaults to the platform channel)
    #[arg(short, long, global = true)]
    pub channel: Option<String>,

    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Args, Default)]
pub struct TargetArgs {
    /// Use a local directory as the remote
    #[arg(long, conflicts_with = "mirror")]
    pub target_dir: Option<PathBuf>,

    /// Read-only HTTP mirror base URL
    #[arg(long)]
    pub mirror: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Merge the local release set into the remote index and upload it
    Upload {
        /// Local release directory
        #[arg(long)]
        dir: Option<PathBuf>,
        /// Full releases to keep on the remote (0 keeps all)
        #[arg(long)]
        keep_max_full: Option<usize>,
        /// Replace remote artifacts whose checksum differs
        #[arg(long)]
        overwrite: bool,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Download the newest full release of the channel
    Download {
        /// Local release directory
        #[arg(long)]
        dir: Option<PathBuf>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show the update path for an installed version
    Resolve {
        /// Release index file to resolve against
        #[arg(long)]
        index: PathBuf,
        /// Installed version (omit for a fresh install)
        #[arg(long)]
        installed: Option<Version>,
        /// Offer an older full package if the installed version is ahead
        #[arg(long)]
        allow_downgrade: bool,
        /// Longest delta chain worth applying
        #[arg(long, default_value_t = 10)]
        max_deltas: usize,
        /// Apply the chain to this installed full package
        #[arg(long, requires = "delta_tool")]
        apply_to: Option<PathBuf>,
        /// External delta tool
        #[arg(long)]
        delta_tool: Option<PathBuf>,
    },
    /// Publish a version to the hosted release service
    Publish {
        /// Full package to publish
        #[arg(long)]
        package: PathBuf,
        /// Installer files shipped with it
        #[arg(long = "installer")]
        installers: Vec<PathBuf>,
        /// External delta tool
        #[arg(long)]
        delta_tool: PathBuf,
        /// Trade speed for smaller deltas
        #[arg(long)]
        best_size: bool,
        /// Wait until the service has processed every upload
        #[arg(long)]
        wait_for_live: bool,
    },
    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

impl Cli {
    /// Resolve configuration and apply the global flags on top.
    pub fn load_config(&self) -> anyhow::Result<SyncConfig> {
        let mut config = SyncConfig::resolve(self.config.as_deref())?;
        if let Some(channel) = &self.channel {
            config.channel = Some(channel.clone());
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_upload_flags() {
        let cli = Cli::parse_from([
            "relsync",
            "--channel",
            "beta",
            "upload",
            "--keep-max-full",
            "2",
            "--target-dir",
            "/srv/releases",
        ]);
        assert_eq!(cli.channel.as_deref(), Some("beta"));
        let Commands::Upload {
            keep_max_full,
            overwrite,
            target,
            ..
        } = cli.command
        else {
            panic!("expected upload");
        };
        assert_eq!(keep_max_full, Some(2));
        assert!(!overwrite);
        assert_eq!(target.target_dir, Some(PathBuf::from("/srv/releases")));
    }

    #[test]
    fn mirror_and_target_dir_conflict() {
        let parsed = Cli::try_parse_from([
            "relsync",
            "download",
            "--mirror",
            "https://example.com",
            "--target-dir",
            "x",
        ]);
        assert!(parsed.is_err());
    }

    #[test]
    fn apply_requires_a_delta_tool() {
        let parsed = Cli::try_parse_from([
            "relsync",
            "resolve",
            "--index",
            "RELEASES",
            "--apply-to",
            "MyApp-1.0.0-full.nupkg",
        ]);
        assert!(parsed.is_err());
    }
}
