//! Multi-file publish of one version as a release group.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use relsync_schema::{Channel, InstallerKind, ReleaseFilename, ReleaseKind};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::{FileType, HostedClient, HostedError, ReleaseGroup, ReleaseGroupState};
use crate::delta::{DeltaCodec, DeltaMode};
use crate::reporter::{INDETERMINATE, Reporter};

/// How long to wait for the service to process uploads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between status checks.
    pub interval: Duration,
    /// Checks before giving up.
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            max_attempts: 300,
        }
    }
}

/// One version to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// The new full package. Its filename names the package and version.
    pub full_package: PathBuf,
    /// Installers shipped with it. Portable bundles are skipped.
    pub installers: Vec<PathBuf>,
    /// Target channel.
    pub channel: Channel,
    /// Delta trade-off.
    pub delta_mode: DeltaMode,
    /// Poll until the service reports every upload processed.
    pub wait_for_live: bool,
    /// Scratch directory for the base package and the generated delta.
    pub work_dir: PathBuf,
}

/// Result of a successful publish.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishOutcome {
    /// The published group.
    pub group: ReleaseGroup,
    /// Whether every upload was confirmed processed.
    pub live: bool,
    /// Filename of the generated delta, if a base existed.
    pub delta: Option<String>,
}

/// Drives the create, upload, publish and wait sequence.
pub struct ReleaseGroupOrchestrator {
    client: Arc<HostedClient>,
    codec: Arc<dyn DeltaCodec>,
    reporter: Arc<dyn Reporter>,
    cancel: CancellationToken,
    poll: PollPolicy,
}

impl std::fmt::Debug for ReleaseGroupOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseGroupOrchestrator")
            .field("client", &self.client)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl ReleaseGroupOrchestrator {
    /// Create an orchestrator with the default poll policy.
    pub fn new(
        client: Arc<HostedClient>,
        codec: Arc<dyn DeltaCodec>,
        reporter: Arc<dyn Reporter>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            client,
            codec,
            reporter,
            cancel,
            poll: PollPolicy::default(),
        }
    }

    /// Replace the poll policy.
    pub fn with_poll(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Publish one version.
    ///
    /// The previous full package is fetched first; if it is not older than
    /// the new one the publish stops before anything is created or uploaded.
    /// Uploads run concurrently and the first failure aborts the rest. Not
    /// going live within the poll budget is only a warning.
    ///
    /// # Errors
    ///
    /// Returns [`HostedError`] for missing credentials, a stale base, any
    /// failed API call or upload, a delta failure, or cancellation.
    pub async fn publish(&self, request: &PublishRequest) -> Result<PublishOutcome, HostedError> {
        self.client.require_auth()?;

        let full_name = file_name(&request.full_package);
        let name = ReleaseFilename::parse(&full_name)?;
        let channel = &request.channel;
        tokio::fs::create_dir_all(&request.work_dir).await?;

        self.reporter
            .phase(&format!("Downloading delta base for {}", name.version));
        let base_path = request.work_dir.join("base.nupkg");
        let base = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Err(HostedError::Cancelled),
            base = self.client.download_latest_full(&name.package_id, channel, &base_path) => base?,
        };
        if let Some(stale) = base.as_ref().filter(|b| b.version >= name.version) {
            return Err(HostedError::VersionOrder {
                latest: stale.version.clone(),
                new: name.version.clone(),
            });
        }

        self.check_cancelled()?;
        let create_task = format!("Creating release {}", name.version);
        self.reporter.progress(&create_task, INDETERMINATE);
        self.client
            .create_channel_if_not_exists(&name.package_id, channel)
            .await?;
        let group = self
            .client
            .create_release_group(&name.package_id, &name.version, channel)
            .await?;
        self.reporter.progress(&create_task, 100);

        self.check_cancelled()?;
        let mut set: JoinSet<Result<(), HostedError>> = JoinSet::new();
        for installer in &request.installers {
            if InstallerKind::from_filename(&file_name(installer)) == Some(InstallerKind::Portable) {
                continue;
            }
            self.spawn_upload(&mut set, &group.id, FileType::Installer, installer.clone());
        }
        self.spawn_upload(&mut set, &group.id, FileType::Release, request.full_package.clone());

        let delta = match base {
            Some(base) => {
                let delta_name = ReleaseFilename {
                    kind: ReleaseKind::Delta,
                    ..name.clone()
                }
                .to_string();
                let delta_path = request.work_dir.join(&delta_name);
                self.spawn_delta(
                    &mut set,
                    &group.id,
                    base.path,
                    request.full_package.clone(),
                    delta_path,
                    request.delta_mode,
                );
                info!(base = %base.version, new = %name.version, "Building delta");
                Some(delta_name)
            }
            None => None,
        };

        self.join_all(&mut set).await?;
        self.check_cancelled()?;

        let publish_task = format!("Publishing release {}", name.version);
        self.reporter.progress(&publish_task, INDETERMINATE);
        let group = self
            .client
            .update_release_group(&group.id, ReleaseGroupState::Published)
            .await?;
        self.reporter.progress(&publish_task, 100);
        info!(id = %group.id, version = %name.version, "Published");

        let live = if request.wait_for_live {
            self.wait_until_live(&group.id).await?
        } else {
            false
        };

        Ok(PublishOutcome { group, live, delta })
    }

    fn spawn_upload(
        &self,
        set: &mut JoinSet<Result<(), HostedError>>,
        group_id: &str,
        file_type: FileType,
        path: PathBuf,
    ) {
        let client = self.client.clone();
        let reporter = self.reporter.clone();
        let group_id = group_id.to_string();
        set.spawn(async move { client.upload_file(&group_id, file_type, &path, reporter).await });
    }

    fn spawn_delta(
        &self,
        set: &mut JoinSet<Result<(), HostedError>>,
        group_id: &str,
        base: PathBuf,
        new: PathBuf,
        output: PathBuf,
        mode: DeltaMode,
    ) {
        let client = self.client.clone();
        let codec = self.codec.clone();
        let reporter = self.reporter.clone();
        let group_id = group_id.to_string();
        set.spawn(async move {
            let delta = output.clone();
            tokio::task::spawn_blocking(move || codec.diff(&base, &new, &delta, mode)).await??;
            client
                .upload_file(&group_id, FileType::Release, &output, reporter)
                .await
        });
    }

    async fn join_all(&self, set: &mut JoinSet<Result<(), HostedError>>) -> Result<(), HostedError> {
        loop {
            let next = tokio::select! {
                () = self.cancel.cancelled() => {
                    set.abort_all();
                    return Err(HostedError::Cancelled);
                }
                next = set.join_next() => next,
            };
            match next {
                None => return Ok(()),
                Some(Ok(Ok(()))) => {}
                Some(Ok(Err(e))) => {
                    set.abort_all();
                    return Err(e);
                }
                Some(Err(e)) => {
                    set.abort_all();
                    return Err(e.into());
                }
            }
        }
    }

    /// Returns whether the group went live; giving up is not an error.
    async fn wait_until_live(&self, id: &str) -> Result<bool, HostedError> {
        let task = "Waiting for release to go live";
        self.reporter.progress(task, INDETERMINATE);

        for _ in 0..self.poll.max_attempts {
            let group = match self.client.get_release_group(id).await {
                Ok(group) => group,
                Err(e) => {
                    self.warn(&format!("Failed to get release group status, it may not be live yet: {e}"));
                    return Ok(false);
                }
            };
            let Some(uploads) = group.file_uploads else {
                self.warn("Release group has no upload status, it may not be live yet");
                return Ok(false);
            };
            if uploads.iter().all(super::FileUpload::is_processed) {
                info!(id, "Release is now live");
                self.reporter.progress(task, 100);
                return Ok(true);
            }

            tokio::select! {
                () = self.cancel.cancelled() => return Err(HostedError::Cancelled),
                () = tokio::time::sleep(self.poll.interval) => {}
            }
        }

        self.warn(&format!(
            "Release did not go live within {:?} (timeout)",
            self.poll.interval * self.poll.max_attempts
        ));
        Ok(false)
    }

    /// Nothing new is started once cancellation has been observed.
    fn check_cancelled(&self) -> Result<(), HostedError> {
        if self.cancel.is_cancelled() {
            return Err(HostedError::Cancelled);
        }
        Ok(())
    }

    fn warn(&self, msg: &str) {
        warn!("{msg}");
        self.reporter.warning(msg);
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
