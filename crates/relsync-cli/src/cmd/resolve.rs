//! Resolve command

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use relsync_core::config::SyncConfig;
use relsync_core::resolver::{Resolution, ResolvePolicy, apply_chain, resolve as resolve_path};
use relsync_core::rollout::{PercentageGate, UserId};
use relsync_schema::{ReleaseFilename, ReleaseKind, Version, index};
use tracing::warn;

use crate::codec::ExternalDeltaCodec;

/// Options for [`resolve`].
#[derive(Debug, Clone, Default)]
pub struct ResolveArgs {
    pub index: PathBuf,
    pub installed: Option<Version>,
    pub allow_downgrade: bool,
    pub max_deltas: usize,
    pub apply_to: Option<PathBuf>,
    pub delta_tool: Option<PathBuf>,
}

/// Print the update path for an installed version and optionally apply it.
///
/// Delta files are expected next to the index.
pub async fn resolve(config: &SyncConfig, args: &ResolveArgs) -> Result<Resolution> {
    let text = tokio::fs::read_to_string(&args.index)
        .await
        .with_context(|| format!("Failed to read {}", args.index.display()))?;
    let entries = index::parse(&text).with_context(|| format!("Invalid index {}", args.index.display()))?;

    let user = match UserId::load_or_create(&config.user_id_path()) {
        Ok(user) => Some(user),
        Err(e) => {
            warn!("Could not persist user id, staged releases will be hidden: {e}");
            None
        }
    };
    let policy = ResolvePolicy {
        allow_downgrade: args.allow_downgrade,
        max_deltas_before_fallback: args.max_deltas,
        ..ResolvePolicy::default()
    };
    let resolution = resolve_path(
        args.installed.as_ref(),
        &entries,
        &policy,
        &PercentageGate,
        user.as_ref(),
    )?;

    match &resolution {
        Resolution::UpToDate => println!("Up to date"),
        Resolution::Full(entry) => println!("Download full package {}", entry.location()),
        Resolution::DeltaChain {
            entries,
            final_version,
        } => {
            println!("Apply {} delta(s) to reach {final_version}:", entries.len());
            for entry in entries {
                println!("  {}", entry.location());
            }
        }
    }

    if let (Some(base), Some(tool), Resolution::DeltaChain { entries, .. }) =
        (&args.apply_to, &args.delta_tool, &resolution)
    {
        let dir = args
            .index
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        let output = apply(base, tool, entries, &dir).await?;
        println!("Wrote {}", output.display());
    }

    Ok(resolution)
}

async fn apply(
    base: &Path,
    tool: &Path,
    chain: &[relsync_schema::ReleaseEntry],
    dir: &Path,
) -> Result<PathBuf> {
    let patches: Vec<PathBuf> = chain.iter().map(|e| dir.join(e.filename())).collect();
    if let Some(missing) = patches.iter().find(|p| !p.is_file()) {
        bail!("Delta {} has not been downloaded", missing.display());
    }
    let Some(last) = chain.last() else {
        bail!("Empty delta chain");
    };
    let target = dir.join(
        ReleaseFilename {
            kind: ReleaseKind::Full,
            ..ReleaseFilename::parse(last.filename())?
        }
        .to_string(),
    );

    let codec = ExternalDeltaCodec::new(tool);
    let base = base.to_path_buf();
    let work = tempfile::tempdir().context("Failed to create work directory")?;
    let work_dir = work.path().to_path_buf();
    let result = tokio::task::spawn_blocking(move || apply_chain(&codec, &base, &patches, &work_dir))
        .await??;

    tokio::fs::copy(&result, &target)
        .await
        .with_context(|| format!("Failed to write {}", target.display()))?;
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relsync_schema::{ReleaseEntry, Sha1Hash};

    fn entry(name: &str, size: u64) -> ReleaseEntry {
        ReleaseEntry::new(name, Sha1Hash::compute(name.as_bytes()), size).unwrap()
    }

    fn setup(entries: &[ReleaseEntry]) -> (tempfile::TempDir, SyncConfig, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let index_path = dir.path().join("RELEASES");
        std::fs::write(&index_path, index::serialize(entries)).unwrap();
        let config = SyncConfig {
            user_id_path: Some(dir.path().join("userid")),
            ..SyncConfig::default()
        };
        (dir, config, index_path)
    }

    #[tokio::test]
    async fn resolves_a_delta_chain() {
        let (_dir, config, index) = setup(&[
            entry("MyApp-1.0.0-full.nupkg", 1000),
            entry("MyApp-1.1.0-full.nupkg", 1000),
            entry("MyApp-1.1.0-delta.nupkg", 10),
            entry("MyApp-1.2.0-full.nupkg", 1000),
            entry("MyApp-1.2.0-delta.nupkg", 10),
        ]);
        let args = ResolveArgs {
            index,
            installed: Some(Version::new(1, 0, 0)),
            max_deltas: 10,
            ..ResolveArgs::default()
        };

        let resolution = resolve(&config, &args).await.unwrap();
        let Resolution::DeltaChain {
            entries,
            final_version,
        } = resolution
        else {
            panic!("expected a delta chain");
        };
        assert_eq!(entries.len(), 2);
        assert_eq!(final_version, Version::new(1, 2, 0));
    }

    #[tokio::test]
    async fn missing_delta_file_is_reported() {
        let (dir, config, index) = setup(&[
            entry("MyApp-1.0.0-full.nupkg", 1000),
            entry("MyApp-1.1.0-full.nupkg", 1000),
            entry("MyApp-1.1.0-delta.nupkg", 10),
        ]);
        let base = dir.path().join("MyApp-1.0.0-full.nupkg");
        std::fs::write(&base, "base").unwrap();
        let args = ResolveArgs {
            index,
            installed: Some(Version::new(1, 0, 0)),
            max_deltas: 10,
            apply_to: Some(base),
            delta_tool: Some(PathBuf::from("relsync-delta")),
            ..ResolveArgs::default()
        };

        let err = resolve(&config, &args).await.unwrap_err();
        assert!(err.to_string().contains("MyApp-1.1.0-delta.nupkg"));
    }

    #[tokio::test]
    async fn unreadable_index_has_context() {
        let config = SyncConfig::default();
        let args = ResolveArgs {
            index: PathBuf::from("/nonexistent/RELEASES"),
            ..ResolveArgs::default()
        };
        let err = resolve(&config, &args).await.unwrap_err();
        assert!(err.to_string().contains("Failed to read"));
    }
}
