//! Publish command

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use relsync_core::TracingReporter;
use relsync_core::config::SyncConfig;
use relsync_core::delta::DeltaMode;
use relsync_core::hosted::{
    HostedClient, PublishOutcome, PublishRequest, ReleaseGroupOrchestrator, StaticAuth,
};
use tokio_util::sync::CancellationToken;

use crate::codec::ExternalDeltaCodec;

/// Options for [`publish`].
#[derive(Debug, Clone)]
pub struct PublishArgs {
    pub package: PathBuf,
    pub installers: Vec<PathBuf>,
    pub delta_tool: PathBuf,
    pub best_size: bool,
    pub wait_for_live: bool,
}

/// Publish one version to the hosted service as a release group.
pub async fn publish(
    config: &SyncConfig,
    args: &PublishArgs,
    cancel: CancellationToken,
) -> Result<PublishOutcome> {
    let auth = StaticAuth::from_api_key(config.hosted.api_key.as_deref());
    let client = HostedClient::new(&config.hosted.base_url, Arc::new(auth))
        .context("Failed to build HTTP client")?;
    let orchestrator = ReleaseGroupOrchestrator::new(
        Arc::new(client),
        Arc::new(ExternalDeltaCodec::new(&args.delta_tool)),
        Arc::new(TracingReporter),
        cancel,
    );

    let work = tempfile::tempdir().context("Failed to create work directory")?;
    let request = PublishRequest {
        full_package: args.package.clone(),
        installers: args.installers.clone(),
        channel: config.channel(),
        delta_mode: if args.best_size {
            DeltaMode::BestSize
        } else {
            DeltaMode::BestSpeed
        },
        wait_for_live: args.wait_for_live || config.hosted.wait_for_live,
        work_dir: work.path().to_path_buf(),
    };

    let outcome = orchestrator
        .publish(&request)
        .await
        .with_context(|| format!("Failed to publish {}", args.package.display()))?;

    match (&outcome.delta, outcome.live) {
        (Some(delta), true) => println!("Published release group {} with {delta}, now live", outcome.group.id),
        (Some(delta), false) => println!("Published release group {} with {delta}", outcome.group.id),
        (None, true) => println!("Published release group {}, now live", outcome.group.id),
        (None, false) => println!("Published release group {}", outcome.group.id),
    }
    Ok(outcome)
}
