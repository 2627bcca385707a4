//! moodlist-server - Emotion-based playlist service
//!
//! **Module Identity:**
//! - Name: moodlist-server
//! - Default bind: 127.0.0.1:3001
//!
//! Loads the expression models in the background, warms up the catalog
//! access token, then serves the HTTP API.

use anyhow::{Context, Result};
use clap::Parser;
use moodlist_common::config::{locate_config_file, resolve_credentials, TomlConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use moodlist_server::services::{load_models, retry_with_backoff, RetryPolicy};

/// Command-line arguments
#[derive(Debug, Parser)]
#[command(name = "moodlist-server", version, about = "Emotion-based playlist service")]
struct Args {
    /// Path to TOML config file
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Override bind address (e.g. 0.0.0.0:3001)
    #[arg(long, env = "MOODLIST_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = locate_config_file(args.config.as_deref());
    let config = TomlConfig::load(config_path.as_deref())?;

    // Initialize tracing; RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!(
        "Starting moodlist-server v{} [{}] built {} ({})",
        env!("CARGO_PKG_VERSION"),
        env!("GIT_HASH"),
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_PROFILE")
    );
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("No config file found, using built-in defaults"),
    }

    let credentials = resolve_credentials(&config.spotify)?;
    let services = moodlist_server::build_services(&config, credentials)
        .context("Failed to build HTTP client")?;

    // Model artifacts load in the background; detect requests are rejected
    // with ModelsNotReady until this completes
    let models_dir = config.classifier.models_dir.clone();
    let readiness = Arc::clone(&services.readiness);
    tokio::spawn(async move {
        info!("Loading models from {}", models_dir.display());
        if let Err(e) = load_models(&models_dir, &readiness).await {
            error!("Error loading models: {}", e);
        }
    });

    // Token warm-up; failures here are not fatal, the broker retries lazily
    let broker = Arc::clone(&services.broker);
    tokio::spawn(async move {
        let result = retry_with_backoff("token warm-up", RetryPolicy::default(), || {
            broker.get_token()
        })
        .await;
        if let Err(e) = result {
            warn!("Token warm-up failed, will fetch on first search: {}", e);
        }
    });

    let bind_addr = args.bind.unwrap_or(config.bind_addr);
    let app = moodlist_server::build_router(services.state);

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", bind_addr))?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
