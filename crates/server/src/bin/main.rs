//! Gatehouse binary entry point.
//!
//! Loads configuration, wires in-memory collaborators, and serves until
//! ctrl-c.

use std::{path::PathBuf, sync::Arc};

use anyhow::{Context, Result};
use clap::Parser;
use gatehouse_server::{AppState, ServerConfig, resources::MemoryPostStore, seed::seed_demo, serve};
use gatehouse_storage::{MemoryIdentityStore, MemoryRoleCatalog};
use tracing_subscriber::EnvFilter;

/// Request gate in front of a small social API.
#[derive(Debug, Parser)]
#[command(name = "gatehouse", version, about)]
struct Cli {
    /// TOML configuration file. Environment variables override it.
    #[arg(long, env = "GATEHOUSE_CONFIG")]
    config: Option<PathBuf>,

    /// Seed demo identities (alice, bob, carol) and posts on startup.
    #[arg(long)]
    seed_demo: bool,

    /// Password for the demo identities.
    #[arg(long, env = "GATEHOUSE_DEMO_PASSWORD", default_value = "gatehouse-demo")]
    demo_password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // RUST_LOG, default info.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    let bind = config.bind_addr();

    let identities = Arc::new(MemoryIdentityStore::new());
    let roles = Arc::new(MemoryRoleCatalog::with_default_roles());
    let posts = Arc::new(MemoryPostStore::new());

    if cli.seed_demo {
        let seeded = seed_demo(identities.as_ref(), roles.as_ref(), posts.as_ref(), &cli.demo_password)
            .await
            .context("failed to seed demo data")?;
        tracing::info!(count = seeded.len(), "demo identities ready");
    }

    let state = AppState::builder()
        .config(config)
        .identities(identities)
        .roles(roles)
        .posts(posts)
        .build()
        .context("failed to build application state")?;

    let handle = serve(state, &bind).await?;
    tokio::signal::ctrl_c().await.context("failed to listen for ctrl-c")?;
    tracing::info!("shutting down");
    handle.shutdown().await
}
