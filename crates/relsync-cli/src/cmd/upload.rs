//! Upload command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use relsync_core::config::SyncConfig;
use relsync_core::pipeline::{UploadOptions, UploadReport, upload_release_set};
use tokio_util::sync::CancellationToken;

use crate::{TargetArgs, remote};

/// Merge the local release set into the remote and upload it.
pub async fn upload(
    config: &SyncConfig,
    dir: Option<&Path>,
    keep_max_full: Option<usize>,
    overwrite: bool,
    target: &TargetArgs,
    cancel: CancellationToken,
) -> Result<UploadReport> {
    let remote = remote::uploadable(config, target)?;
    let dir: PathBuf = dir.map_or_else(|| config.release_dir.clone(), Path::to_path_buf);
    let options = UploadOptions {
        keep_max_full: keep_max_full.unwrap_or(config.keep_max_full),
        overwrite_remote: overwrite || config.overwrite_remote,
    };
    let ctx = super::sync_context(config, cancel);

    let report = upload_release_set(&dir, remote.as_ref(), &ctx, &options)
        .await
        .with_context(|| format!("Failed to upload releases from {}", dir.display()))?;

    println!(
        "Uploaded {} object(s), skipped {}, deleted {} ({} release(s) in {})",
        report.uploaded.len(),
        report.skipped.len(),
        report.deleted.len(),
        report.index.len(),
        ctx.channel.legacy_index_name(),
    );
    for conflict in &report.conflicts {
        println!("  conflict: {conflict} differs on the remote (use --overwrite to replace)");
    }
    if !report.is_consistent() {
        eprintln!(
            "warning: the published index lists local checksums for {} conflicting artifact(s); \
             clients will reject them until they are replaced",
            report.conflicts.len()
        );
    }
    Ok(report)
}
