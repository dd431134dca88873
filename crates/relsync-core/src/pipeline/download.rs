//! Fetching the newest full release from a remote.

use std::path::{Path, PathBuf};

use relsync_schema::{ReleaseEntry, Sha1Hash, index};
use tracing::{debug, info};

use super::{PipelineError, SyncContext, write_atomic};
use crate::reporter::INDETERMINATE;
use crate::transport::Downloadable;

/// Result of [`download_latest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    /// The remote has no index or no full release for the channel.
    NoReleases,
    /// The newest full package was already present and verified locally.
    AlreadyPresent(ReleaseEntry),
    /// The newest full package was downloaded.
    Downloaded {
        /// The downloaded entry.
        entry: ReleaseEntry,
        /// Where it was written.
        path: PathBuf,
    },
}

/// Download the channel's newest full package into `local_dir`.
///
/// The artifact is written to `{filename}.incomplete`, checked against the
/// index's SHA1 and size, and only then renamed into place. The fetched index
/// is stored next to it.
///
/// # Errors
///
/// Returns [`PipelineError::ChecksumMismatch`] if the download is corrupt,
/// [`PipelineError::MissingArtifact`] if the remote lacks the file, or a
/// transport, format or I/O error.
pub async fn download_latest(
    remote: &dyn Downloadable,
    local_dir: &Path,
    ctx: &SyncContext,
) -> Result<DownloadOutcome, PipelineError> {
    let index_key = ctx.channel.legacy_index_name();
    let Some(index_bytes) = ctx.remote("get", &index_key, || remote.get(&index_key)).await? else {
        info!(key = %index_key, "Remote has no index");
        return Ok(DownloadOutcome::NoReleases);
    };
    let entries = index::parse_bytes(&index_bytes)?;
    let Some(latest) = entries
        .iter()
        .filter(|e| e.is_full())
        .max_by(|a, b| a.version().cmp(b.version()))
        .cloned()
    else {
        return Ok(DownloadOutcome::NoReleases);
    };

    tokio::fs::create_dir_all(local_dir).await?;
    let target = local_dir.join(latest.filename());

    if target.is_file() {
        let existing = target.clone();
        let hash = tokio::task::spawn_blocking(move || Sha1Hash::compute_file(&existing)).await??;
        if &hash == latest.content_hash() {
            debug!(filename = latest.filename(), "Already downloaded");
            write_atomic(&local_dir.join(&index_key), &index_bytes).await?;
            return Ok(DownloadOutcome::AlreadyPresent(latest));
        }
    }

    let filename = latest.filename();
    ctx.reporter.progress(filename, INDETERMINATE);
    let data = ctx
        .remote("get", filename, || remote.get_entry(&latest))
        .await?
        .ok_or_else(|| PipelineError::MissingArtifact(filename.to_string()))?;

    let partial = local_dir.join(format!("{filename}.incomplete"));
    tokio::fs::write(&partial, &data).await?;

    let actual = Sha1Hash::compute(&data);
    if &actual != latest.content_hash() || data.len() as u64 != latest.size_bytes() {
        tokio::fs::remove_file(&partial).await?;
        return Err(PipelineError::ChecksumMismatch {
            filename: filename.to_string(),
            expected: format!("{} ({} bytes)", latest.content_hash(), latest.size_bytes()),
            actual: format!("{actual} ({} bytes)", data.len()),
        });
    }

    tokio::fs::rename(&partial, &target).await?;
    write_atomic(&local_dir.join(&index_key), &index_bytes).await?;
    ctx.reporter.progress(filename, 100);
    info!(filename, bytes = data.len(), "Downloaded");

    Ok(DownloadOutcome::Downloaded {
        entry: latest.clone(),
        path: target,
    })
}
