//! Picks the remote transport for a command.
//!
//! Flags win over configuration: `--target-dir`, then `--mirror`, then the
//! configured object store, then the configured mirror URL.

use anyhow::{Context, Result, bail};
use relsync_core::config::SyncConfig;
use relsync_core::transport::{
    Downloadable, HttpTransport, LocalDirTransport, ObjectStoreTransport, Uploadable,
};

use crate::TargetArgs;

/// A remote that can be written to.
pub fn uploadable(config: &SyncConfig, target: &TargetArgs) -> Result<Box<dyn Uploadable>> {
    if let Some(dir) = &target.target_dir {
        return Ok(Box::new(LocalDirTransport::new(dir)));
    }
    if target.mirror.is_some() {
        bail!("An HTTP mirror is read-only. Use --target-dir or configure an object store.");
    }
    match &config.store {
        Some(store) => Ok(Box::new(
            ObjectStoreTransport::new(store).context("Failed to configure object store")?,
        )),
        None => bail!(
            "No remote configured. Pass --target-dir or set RELSYNC_STORE_* / [store] in relsync.toml."
        ),
    }
}

/// A remote that can be read from.
pub fn downloadable(config: &SyncConfig, target: &TargetArgs) -> Result<Box<dyn Downloadable>> {
    if let Some(dir) = &target.target_dir {
        return Ok(Box::new(LocalDirTransport::new(dir)));
    }
    if let Some(url) = &target.mirror {
        return Ok(Box::new(HttpTransport::new(url).context("Failed to build HTTP client")?));
    }
    if let Some(store) = &config.store {
        return Ok(Box::new(
            ObjectStoreTransport::new(store).context("Failed to configure object store")?,
        ));
    }
    match &config.mirror_url {
        Some(url) => Ok(Box::new(
            HttpTransport::new(url).context("Failed to build HTTP client")?,
        )),
        None => bail!("No remote configured. Pass --target-dir or --mirror, or configure one."),
    }
}
