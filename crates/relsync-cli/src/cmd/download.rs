//! Download command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relsync_core::config::SyncConfig;
use relsync_core::pipeline::{DownloadOutcome, download_latest};
use tokio_util::sync::CancellationToken;

use crate::{TargetArgs, remote};

/// Fetch the channel's newest full package into the release directory.
pub async fn download(
    config: &SyncConfig,
    dir: Option<&Path>,
    target: &TargetArgs,
    cancel: CancellationToken,
) -> Result<DownloadOutcome> {
    let remote = remote::downloadable(config, target)?;
    let dir: PathBuf = dir.map_or_else(|| config.release_dir.clone(), Path::to_path_buf);
    let ctx = super::sync_context(config, cancel);

    let outcome = download_latest(remote.as_ref(), &dir, &ctx)
        .await
        .with_context(|| format!("Failed to download into {}", dir.display()))?;

    match &outcome {
        DownloadOutcome::NoReleases => println!("No releases found for channel '{}'", ctx.channel),
        DownloadOutcome::AlreadyPresent(entry) => {
            println!("{} is already up to date", entry.filename());
        }
        DownloadOutcome::Downloaded { entry, path } => {
            println!("Downloaded {} to {}", entry.filename(), path.display());
        }
    }
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn empty_remote_has_no_releases() {
        let local = tempfile::tempdir().unwrap();
        let remote = tempfile::tempdir().unwrap();
        let target = TargetArgs {
            target_dir: Some(remote.path().to_path_buf()),
            mirror: None,
        };

        let outcome = download(
            &SyncConfig::default(),
            Some(local.path()),
            &target,
            CancellationToken::new(),
        )
        .await
        .unwrap();

        assert_eq!(outcome, DownloadOutcome::NoReleases);
    }
}
