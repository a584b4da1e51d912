// SPDX-License-Identifier: MIT OR Apache-2.0
//! Server binary: parse flags, load config, hydrate the store, serve.

use anyhow::{Context, Result};
use clap::Parser;
use mt_config::{load_config, validate_config};
use mt_error::{ErrorCode, MtError};
use mt_server::{build_app, AppState};
use mt_store::Store;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "mt-server", version, about = "Test-case management service")]
struct Args {
    /// Bind address; overrides the config file.
    #[arg(long)]
    bind: Option<String>,

    /// Path to a TOML config file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory for the JSON data snapshot; overrides the config file.
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable debug-level logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = load_config(args.config.as_deref()).context("load config")?;
    if let Some(bind) = &args.bind {
        config.bind = bind.clone();
    }
    if let Some(dir) = &args.data_dir {
        config.data_dir = Some(dir.display().to_string());
    }

    let level = if args.debug {
        "debug"
    } else {
        config.log_level.as_deref().unwrap_or("info")
    };
    let filter = EnvFilter::new(log_directives(args.debug, level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let warnings = validate_config(&config)
        .map_err(|e| MtError::new(ErrorCode::ConfigInvalid, e.to_string()))
        .context("validate config")?;
    for w in &warnings {
        warn!(warning = %w, "config warning");
    }

    let data_dir = config.data_dir.as_ref().map(PathBuf::from);
    if let Some(dir) = &data_dir {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("create data dir {}", dir.display()))?;
    }

    let store = Arc::new(Store::new(data_dir));
    store.hydrate().await.context("hydrate store")?;

    let bind = config.bind.clone();
    let state = Arc::new(AppState::new(config, store));
    let app = build_app(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("bind {bind}"))?;
    info!(bind = %bind, "mt-server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serve")
}

/// Filter directives covering the workspace library crates, not just the
/// binary's own target; `mt_store` carries the hydration and persistence
/// events.
fn log_directives(debug: bool, level: &str) -> String {
    let mut directives = format!("mt_server={level},mt_store={level},mt_model={level}");
    if debug {
        directives.push_str(",tower_http=debug");
    }
    directives
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        warn!("failed to install ctrl-c handler; running until killed");
        std::future::pending::<()>().await;
    }
    info!("shutdown signal received");
}
