//! relsync - release index sync and publishing CLI

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use relsync_cli::cmd;
use relsync_cli::cmd::publish::PublishArgs;
use relsync_cli::cmd::resolve::ResolveArgs;
use relsync_cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if let Commands::Completions { shell } = cli.command {
        cmd::completions::completions(shell);
        return Ok(());
    }

    let config = cli.load_config()?;

    // Ctrl-C stops further remote operations; in-flight requests finish.
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping after the current operation");
            token.cancel();
        }
    });

    match cli.command {
        Commands::Upload {
            dir,
            keep_max_full,
            overwrite,
            target,
        } => {
            cmd::upload::upload(&config, dir.as_deref(), keep_max_full, overwrite, &target, cancel)
                .await?;
        }
        Commands::Download { dir, target } => {
            cmd::download::download(&config, dir.as_deref(), &target, cancel).await?;
        }
        Commands::Resolve {
            index,
            installed,
            allow_downgrade,
            max_deltas,
            apply_to,
            delta_tool,
        } => {
            let args = ResolveArgs {
                index,
                installed,
                allow_downgrade,
                max_deltas,
                apply_to,
                delta_tool,
            };
            cmd::resolve::resolve(&config, &args).await?;
        }
        Commands::Publish {
            package,
            installers,
            delta_tool,
            best_size,
            wait_for_live,
        } => {
            let args = PublishArgs {
                package,
                installers,
                delta_tool,
                best_size,
                wait_for_live,
            };
            cmd::publish::publish(&config, &args, cancel).await?;
        }
        Commands::Completions { .. } => {}
    }
    Ok(())
}
