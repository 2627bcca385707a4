//! moodlist-server library interface
//!
//! Maps a webcam frame to a facial-expression label and uses the label as a
//! playlist search query against the catalog provider.
//!
//! Data flows one way: frame → expression distribution → label → query →
//! playlists. See [`services`] for the pipeline components and [`api`] for
//! the HTTP surface.

pub mod api;
pub mod error;
pub mod services;
pub mod types;

pub use crate::error::{ApiError, ApiResult};

use axum::Router;
use chrono::{DateTime, Utc};
use moodlist_common::config::{ClientCredentials, TomlConfig};
use std::sync::Arc;
use std::time::Duration;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{
    Camera, CatalogClient, ClassifierAdapter, CredentialBroker, ModelReadiness, Orchestrator,
    RemoteExpressionModel, SnapshotFrameSource,
};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Detect cycle state machine (owns camera + classifier handles)
    pub orchestrator: Arc<Orchestrator>,
    /// Catalog client for direct label searches
    pub catalog: Arc<CatalogClient>,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(orchestrator: Arc<Orchestrator>, catalog: Arc<CatalogClient>) -> Self {
        Self {
            orchestrator,
            catalog,
            startup_time: Utc::now(),
        }
    }
}

/// Everything the binary needs besides the router
pub struct Services {
    pub state: AppState,
    pub broker: Arc<CredentialBroker>,
    pub readiness: Arc<ModelReadiness>,
}

/// Wire the production services from bootstrap configuration
pub fn build_services(
    config: &TomlConfig,
    credentials: ClientCredentials,
) -> Result<Services, reqwest::Error> {
    let http_client = reqwest::Client::builder()
        .user_agent(concat!("moodlist/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(config.timeouts.http_secs))
        .build()?;

    let broker = Arc::new(CredentialBroker::new(
        http_client.clone(),
        config.spotify.token_url.clone(),
        credentials,
        Duration::from_secs(config.spotify.token_leeway_secs),
    ));
    let catalog = Arc::new(CatalogClient::new(
        http_client.clone(),
        &config.spotify.api_base_url,
        Arc::clone(&broker),
    ));

    let readiness = Arc::new(ModelReadiness::new());
    let model = Arc::new(RemoteExpressionModel::new(
        http_client,
        config.classifier.endpoint.clone(),
    ));
    let classifier = Arc::new(ClassifierAdapter::new(model, Arc::clone(&readiness)));

    let camera = Arc::new(Camera::new(Box::new(SnapshotFrameSource::new(
        config.capture.snapshot_path.clone(),
    ))));

    let cycle_timeout =
        (config.timeouts.cycle_secs > 0).then(|| Duration::from_secs(config.timeouts.cycle_secs));
    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        camera,
        Arc::clone(&catalog),
        cycle_timeout,
    ));

    Ok(Services {
        state: AppState::new(orchestrator, catalog),
        broker,
        readiness,
    })
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::playlist_routes())
        .merge(api::detect_routes())
        .merge(api::camera_routes())
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
