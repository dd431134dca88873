//! Publishing a local release set to an object store.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use bytes::Bytes;
use relsync_schema::{AssetManifest, Md5Hash, ReleaseEntry, ReleaseFilename, index};
use tracing::{debug, info, warn};

use super::release_dir::{in_channel, read_release_dir};
use super::{PipelineError, SyncContext, write_atomic};
use crate::merge::{RemoteSnapshot, merge};
use crate::reporter::percent;
use crate::transport::{PutOptions, RemoteObject, Uploadable};

/// Knobs for [`upload_release_set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UploadOptions {
    /// Full releases to keep on the remote; 0 keeps all and disables cleanup.
    pub keep_max_full: usize,
    /// Replace remote artifacts whose checksum differs from the local file.
    pub overwrite_remote: bool,
}

/// What an upload did.
#[derive(Debug, Clone, Default)]
pub struct UploadReport {
    /// Objects written, in upload order (index files last).
    pub uploaded: Vec<String>,
    /// Artifacts already present remotely with the same checksum.
    pub skipped: Vec<String>,
    /// Artifacts left alone because the remote copy differs. The published
    /// index still carries the local checksum for these.
    pub conflicts: Vec<String>,
    /// Orphans removed by retention cleanup.
    pub deleted: Vec<String>,
    /// The index that was published.
    pub index: Vec<ReleaseEntry>,
    /// Non-fatal problems.
    pub warnings: Vec<String>,
}

impl UploadReport {
    /// Whether every artifact the index references matches its checksum on
    /// the remote. False when a conflict was skipped; clients downloading a
    /// conflicting artifact will fail verification until it is overwritten.
    pub fn is_consistent(&self) -> bool {
        self.conflicts.is_empty()
    }

    fn warn(&mut self, ctx: &SyncContext, msg: String) {
        warn!("{msg}");
        ctx.reporter.warning(&msg);
        self.warnings.push(msg);
    }
}

enum RemoteState {
    Absent,
    Same,
    Different,
}

/// Merge the local release set in `local_dir` with the remote index and
/// publish the result.
///
/// Artifacts are uploaded before the JSON feed, and the feed before the
/// legacy index. With retention active, unreferenced package artifacts are
/// then deleted oldest-first; failures there only produce warnings.
///
/// # Errors
///
/// Fails if the local set is empty, the remote index is malformed, the merge
/// is refused, a required upload exhausts its retries, or the run is cancelled.
pub async fn upload_release_set(
    local_dir: &Path,
    remote: &dyn Uploadable,
    ctx: &SyncContext,
    options: &UploadOptions,
) -> Result<UploadReport, PipelineError> {
    let channel = &ctx.channel;
    let local = read_release_dir(local_dir, channel).await?;
    let index_key = channel.legacy_index_name();
    let feed_key = channel.feed_name();
    let mut report = UploadReport::default();

    ctx.reporter.phase(&format!("Fetching remote index {index_key}"));
    let snapshot = match ctx.remote("get", &index_key, || remote.get(&index_key)).await? {
        Some(bytes) => RemoteSnapshot::parse(&bytes)?,
        None => {
            info!(key = %index_key, "No remote index, starting fresh");
            RemoteSnapshot::empty()
        }
    };

    let outcome = merge(&local.entries, &snapshot, options.keep_max_full)?;
    let index_text = index::serialize(&outcome.entries);
    let manifest = AssetManifest {
        channel: channel.clone(),
        releases: outcome.entries.clone(),
        installers: local.installers.clone(),
    };
    let feed_json = manifest.to_json()?;
    write_atomic(&local_dir.join(&index_key), index_text.as_bytes()).await?;
    write_atomic(&local_dir.join(&feed_key), feed_json.as_bytes()).await?;
    debug!(entries = outcome.entries.len(), removed = outcome.removed.len(), "Merged index written");

    let package_id = outcome
        .package_id()
        .map(ToString::to_string)
        .unwrap_or_default();
    let etags = list_etags(remote, &package_id, ctx, &mut report).await?;
    let check = RemoteCheck {
        remote,
        ctx,
        etags: etags.as_ref(),
    };

    ctx.reporter.phase("Uploading release artifacts");
    let referenced: Vec<&str> = outcome
        .entries
        .iter()
        .map(ReleaseEntry::filename)
        .filter(|f| local_dir.join(f).is_file())
        .collect();
    let total = (referenced.len() + local.installers.len()) as u64;
    let mut done = 0;

    for filename in referenced {
        let path = local_dir.join(filename);
        match check.state(filename, &path).await? {
            RemoteState::Same => {
                debug!(filename, "Remote copy matches, skipping");
                report.skipped.push(filename.to_string());
            }
            RemoteState::Different if !options.overwrite_remote => {
                report.warn(
                    ctx,
                    format!(
                        "Remote '{filename}' differs from the local file, not overwriting. \
                         The index lists the local checksum, so clients will fail to verify \
                         this artifact until it is replaced with --overwrite"
                    ),
                );
                report.conflicts.push(filename.to_string());
            }
            RemoteState::Absent | RemoteState::Different => {
                put_file(remote, ctx, filename, &path, PutOptions::default()).await?;
                report.uploaded.push(filename.to_string());
            }
        }
        done += 1;
        ctx.reporter.progress("artifacts", percent(done, total));
    }

    for installer in &local.installers {
        let filename = installer.filename.as_str();
        let path = local.path_of(filename);
        if let RemoteState::Same = check.state(filename, &path).await? {
            report.skipped.push(filename.to_string());
        } else {
            put_file(remote, ctx, filename, &path, PutOptions::default()).await?;
            report.uploaded.push(filename.to_string());
        }
        done += 1;
        ctx.reporter.progress("artifacts", percent(done, total));
    }

    ctx.reporter.phase("Publishing index");
    let feed = Bytes::from(feed_json);
    ctx.remote("put", &feed_key, || remote.put(&feed_key, feed.clone(), PutOptions::index()))
        .await?;
    report.uploaded.push(feed_key.clone());
    let index_bytes = Bytes::from(index_text);
    ctx.remote("put", &index_key, || {
        remote.put(&index_key, index_bytes.clone(), PutOptions::index())
    })
    .await?;
    report.uploaded.push(index_key.clone());
    ctx.reporter.done(&index_key, &format!("{} entries", outcome.entries.len()));

    if options.keep_max_full > 0 {
        delete_orphans(remote, ctx, &package_id, &outcome.entries, &mut report).await?;
    }

    report.index = outcome.entries;
    Ok(report)
}

/// One listing up front, retried like any other remote call. If it still
/// fails, `None` makes every object get checked individually.
async fn list_etags(
    remote: &dyn Uploadable,
    prefix: &str,
    ctx: &SyncContext,
    report: &mut UploadReport,
) -> Result<Option<HashMap<String, Option<String>>>, PipelineError> {
    match ctx.remote("list", prefix, || remote.list(prefix)).await {
        Ok(objects) => Ok(Some(objects.into_iter().map(|o| (o.key, o.etag)).collect())),
        Err(PipelineError::Cancelled) => Err(PipelineError::Cancelled),
        Err(e) => {
            report.warn(
                ctx,
                format!("Could not list remote objects, checking each artifact instead: {e}"),
            );
            Ok(None)
        }
    }
}

/// Decides whether a local file is already on the remote.
struct RemoteCheck<'a> {
    remote: &'a dyn Uploadable,
    ctx: &'a SyncContext,
    etags: Option<&'a HashMap<String, Option<String>>>,
}

impl RemoteCheck<'_> {
    async fn state(&self, key: &str, path: &Path) -> Result<RemoteState, PipelineError> {
        let Some(etags) = self.etags else {
            return self.fetch_and_compare(key, path).await;
        };
        let Some(etag) = etags.get(key) else {
            return Ok(RemoteState::Absent);
        };
        let Some(etag) = etag else {
            return Ok(RemoteState::Different);
        };
        let md5 = local_md5(path).await?;
        Ok(if md5.matches_etag(etag) {
            RemoteState::Same
        } else {
            RemoteState::Different
        })
    }

    async fn fetch_and_compare(&self, key: &str, path: &Path) -> Result<RemoteState, PipelineError> {
        let Some(body) = self
            .ctx
            .remote("get", key, || self.remote.get(key))
            .await?
        else {
            return Ok(RemoteState::Absent);
        };
        Ok(if Md5Hash::compute(&body) == local_md5(path).await? {
            RemoteState::Same
        } else {
            RemoteState::Different
        })
    }
}

async fn local_md5(path: &Path) -> Result<Md5Hash, PipelineError> {
    let owned: PathBuf = path.to_path_buf();
    Ok(tokio::task::spawn_blocking(move || Md5Hash::compute_file(&owned)).await??)
}

async fn put_file(
    remote: &dyn Uploadable,
    ctx: &SyncContext,
    key: &str,
    path: &Path,
    options: PutOptions,
) -> Result<(), PipelineError> {
    let body = Bytes::from(tokio::fs::read(path).await?);
    info!(key, bytes = body.len(), "Uploading");
    ctx.remote("put", key, || remote.put(key, body.clone(), options))
        .await
}

async fn delete_orphans(
    remote: &dyn Uploadable,
    ctx: &SyncContext,
    package_id: &str,
    index: &[ReleaseEntry],
    report: &mut UploadReport,
) -> Result<(), PipelineError> {
    let objects = match ctx.remote("list", package_id, || remote.list(package_id)).await {
        Ok(objects) => objects,
        Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
        Err(e) => {
            report.warn(ctx, format!("Skipping retention cleanup: {e}"));
            return Ok(());
        }
    };

    let keep: HashSet<&str> = index.iter().map(ReleaseEntry::filename).collect();
    let mut orphans: Vec<RemoteObject> = objects
        .into_iter()
        .filter(|o| !keep.contains(o.key.as_str()))
        .filter(|o| {
            ReleaseFilename::parse(&o.key).is_ok_and(|name| {
                name.package_id.as_str() == package_id && in_channel(&name, &ctx.channel)
            })
        })
        .collect();
    orphans.sort_by_key(|o| o.last_modified);

    for orphan in orphans {
        let key = orphan.key.as_str();
        match ctx.remote("delete", key, || remote.delete(key)).await {
            Ok(()) => {
                info!(key, "Deleted unreferenced artifact");
                report.deleted.push(orphan.key.clone());
            }
            Err(PipelineError::Cancelled) => return Err(PipelineError::Cancelled),
            Err(e) => report.warn(ctx, format!("Failed to delete '{key}': {e}")),
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::fixtures::write;
    use crate::reporter::testing::RecordingReporter;
    use crate::reporter::Reporter;
    use crate::retry::RetryPolicy;
    use crate::transport::{MemoryTransport, TransportCall};
    use chrono::{TimeZone, Utc};
    use relsync_schema::{Channel, Sha1Hash};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn ctx() -> SyncContext {
        SyncContext::new(Channel::new("win")).with_retry(RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(1),
        })
    }

    fn entry(name: &str, content: &[u8]) -> ReleaseEntry {
        ReleaseEntry::new(name, Sha1Hash::compute(content), content.len() as u64).unwrap()
    }

    fn puts(store: &MemoryTransport) -> Vec<String> {
        store
            .calls()
            .into_iter()
            .filter_map(|c| match c {
                TransportCall::Put { key, .. } => Some(key),
                _ => None,
            })
            .collect()
    }

    #[tokio::test]
    async fn artifacts_before_feed_before_index() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        write(dir.path(), "MyApp-win-x64-Setup.exe", "setup");
        let store = MemoryTransport::new();

        let report = upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(
            puts(&store),
            vec![
                "MyApp-1.0.0-win-x64-full.nupkg",
                "MyApp-win-x64-Setup.exe",
                "releases.win.json",
                "RELEASES",
            ]
        );
        assert!(store.calls().contains(&TransportCall::Put {
            key: "RELEASES".to_string(),
            no_cache: true,
        }));
        assert_eq!(report.index.len(), 1);
        assert!(dir.path().join("RELEASES").is_file());
        assert!(dir.path().join("releases.win.json").is_file());

        let remote_index = index::parse_bytes(&store.object("RELEASES").unwrap()).unwrap();
        assert_eq!(remote_index, report.index);
    }

    #[tokio::test]
    async fn matching_checksums_are_skipped_and_conflicts_warned() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        write(dir.path(), "MyApp-2.0.0-win-x64-full.nupkg", "two");
        let store = MemoryTransport::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert("MyApp-1.0.0-win-x64-full.nupkg", Bytes::from_static(b"one"), t);
        store.insert("MyApp-2.0.0-win-x64-full.nupkg", Bytes::from_static(b"tampered"), t);

        let reporter = Arc::new(RecordingReporter::default());
        let ctx = ctx().with_reporter(reporter.clone());
        let report = upload_release_set(dir.path(), &store, &ctx, &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(report.skipped, vec!["MyApp-1.0.0-win-x64-full.nupkg"]);
        assert_eq!(report.conflicts, vec!["MyApp-2.0.0-win-x64-full.nupkg"]);
        assert_eq!(puts(&store), vec!["releases.win.json", "RELEASES"]);
        assert_eq!(store.object("MyApp-2.0.0-win-x64-full.nupkg").unwrap(), "tampered");
        assert_eq!(reporter.warnings.lock().unwrap().len(), 1);
        assert!(reporter.warnings.lock().unwrap()[0].contains("fail to verify"));
        assert!(!report.is_consistent());

        let overwrite = UploadOptions {
            overwrite_remote: true,
            ..UploadOptions::default()
        };
        upload_release_set(dir.path(), &store, &ctx, &overwrite).await.unwrap();
        assert_eq!(store.object("MyApp-2.0.0-win-x64-full.nupkg").unwrap(), "two");
    }

    #[tokio::test]
    async fn retention_deletes_orphans_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-3.0.0-win-x64-full.nupkg", "three");

        let store = MemoryTransport::new();
        let remote_entries = vec![
            entry("MyApp-1.0.0-win-x64-full.nupkg", b"one"),
            entry("MyApp-2.0.0-win-x64-full.nupkg", b"two"),
            entry("MyApp-2.0.0-win-x64-delta.nupkg", b"d2"),
            entry("MyApp-3.0.0-win-x64-delta.nupkg", b"d3"),
        ];
        let at = |day| Utc.with_ymd_and_hms(2024, 1, day, 0, 0, 0).unwrap();
        store.insert("MyApp-2.0.0-win-x64-delta.nupkg", Bytes::from_static(b"d2"), at(3));
        store.insert("MyApp-1.0.0-win-x64-full.nupkg", Bytes::from_static(b"one"), at(1));
        store.insert("MyApp-2.0.0-win-x64-full.nupkg", Bytes::from_static(b"two"), at(2));
        store.insert("MyApp-3.0.0-win-x64-delta.nupkg", Bytes::from_static(b"d3"), at(4));
        store.insert("MyApp-0.9.0-win-x64-beta-full.nupkg", Bytes::from_static(b"beta"), at(1));
        store.insert("RELEASES", index::serialize(&remote_entries).into_bytes(), at(4));

        let options = UploadOptions {
            keep_max_full: 2,
            ..UploadOptions::default()
        };
        let report = upload_release_set(dir.path(), &store, &ctx(), &options).await.unwrap();

        let names: Vec<&str> = report.index.iter().map(ReleaseEntry::filename).collect();
        assert_eq!(
            names,
            vec![
                "MyApp-2.0.0-win-x64-full.nupkg",
                "MyApp-3.0.0-win-x64-full.nupkg",
                "MyApp-3.0.0-win-x64-delta.nupkg",
            ]
        );
        assert_eq!(
            report.deleted,
            vec!["MyApp-1.0.0-win-x64-full.nupkg", "MyApp-2.0.0-win-x64-delta.nupkg"]
        );
        // Other channels are left alone
        assert!(store.object("MyApp-0.9.0-win-x64-beta-full.nupkg").is_some());
    }

    #[tokio::test]
    async fn missing_remote_index_starts_fresh() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        let store = MemoryTransport::new();
        store.fail("list", "MyApp", 1);

        let report = upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap();
        assert_eq!(report.uploaded.len(), 3);
        assert!(report.warnings.is_empty());
        assert!(report.is_consistent());
    }

    #[tokio::test]
    async fn failed_listing_never_overwrites_a_different_remote() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "local");
        write(dir.path(), "MyApp-2.0.0-win-x64-full.nupkg", "two");
        write(dir.path(), "MyApp-3.0.0-win-x64-full.nupkg", "three");
        let store = MemoryTransport::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert("MyApp-1.0.0-win-x64-full.nupkg", Bytes::from_static(b"REMOTE-DIFFERENT"), t);
        store.insert("MyApp-2.0.0-win-x64-full.nupkg", Bytes::from_static(b"two"), t);
        store.fail("list", "MyApp", 10);

        let report = upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap();

        assert_eq!(store.object("MyApp-1.0.0-win-x64-full.nupkg").unwrap(), "REMOTE-DIFFERENT");
        assert_eq!(report.conflicts, vec!["MyApp-1.0.0-win-x64-full.nupkg"]);
        assert_eq!(report.skipped, vec!["MyApp-2.0.0-win-x64-full.nupkg"]);
        assert_eq!(
            puts(&store),
            vec!["MyApp-3.0.0-win-x64-full.nupkg", "releases.win.json", "RELEASES"]
        );
        assert!(!report.is_consistent());
        assert_eq!(report.warnings.len(), 2);
    }

    #[tokio::test]
    async fn exhausted_upload_is_fatal_and_index_untouched() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        let store = MemoryTransport::new();
        store.fail("put", "MyApp-1.0.0-win-x64-full.nupkg", 3);

        let err = upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transport { op: "put", attempts: 3, .. }));
        assert!(store.object("RELEASES").is_none());
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        let store = MemoryTransport::new();
        store.fail("get", "RELEASES", 2);

        upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap();
        assert!(store.object("RELEASES").is_some());
    }

    #[tokio::test]
    async fn failed_delete_only_warns() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-2.0.0-win-x64-full.nupkg", "two");
        let store = MemoryTransport::new();
        let t = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        store.insert("MyApp-1.0.0-win-x64-full.nupkg", Bytes::from_static(b"one"), t);
        store.insert(
            "RELEASES",
            index::serialize(&[entry("MyApp-1.0.0-win-x64-full.nupkg", b"one")]).into_bytes(),
            t,
        );
        store.fail("delete", "MyApp-1.0.0-win-x64-full.nupkg", 10);

        let options = UploadOptions {
            keep_max_full: 1,
            ..UploadOptions::default()
        };
        let report = upload_release_set(dir.path(), &store, &ctx(), &options).await.unwrap();
        assert!(report.deleted.is_empty());
        assert_eq!(report.warnings.len(), 1);
        assert!(store.object("RELEASES").is_some());
    }

    struct CancelOnProgress(CancellationToken);

    impl Reporter for CancelOnProgress {
        fn phase(&self, _: &str) {}
        fn progress(&self, _: &str, _: i16) {
            self.0.cancel();
        }
        fn done(&self, _: &str, _: &str) {}
        fn warning(&self, _: &str) {}
    }

    #[tokio::test]
    async fn cancellation_stops_before_index() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        write(dir.path(), "MyApp-2.0.0-win-x64-full.nupkg", "two");
        let store = MemoryTransport::new();
        let token = CancellationToken::new();
        let ctx = ctx()
            .with_cancel(token.clone())
            .with_reporter(Arc::new(CancelOnProgress(token)));

        let err = upload_release_set(dir.path(), &store, &ctx, &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(puts(&store), vec!["MyApp-1.0.0-win-x64-full.nupkg"]);
    }

    #[tokio::test]
    async fn malformed_remote_index_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "MyApp-1.0.0-win-x64-full.nupkg", "one");
        let store = MemoryTransport::new();
        store.insert("RELEASES", &b"not an index\n"[..], Utc::now());

        let err = upload_release_set(dir.path(), &store, &ctx(), &UploadOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Format(_)));
        assert!(puts(&store).is_empty());
    }
}
