//! Test Helper Utilities
//!
//! Shared utilities for moodlist-server integration tests:
//! - `MockProvider`: local axum stand-in for the identity + catalog providers
//! - Scripted expression model and in-memory frame source
//! - Pipeline builders wiring real broker/catalog/orchestrator to the mocks

#![allow(dead_code)]

use async_trait::async_trait;
use axum::extract::{Form, RawQuery, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use moodlist_common::config::ClientCredentials;
use moodlist_server::services::{
    Camera, CaptureDevice, CaptureError, CatalogClient, ClassifierAdapter, ClassifierError,
    CredentialBroker, ExpressionModel, Frame, FrameSource, ModelReadiness, Orchestrator,
};
use moodlist_server::types::ExpressionDistribution;
use moodlist_server::AppState;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const CLIENT_ID: &str = "test-client-id";
pub const CLIENT_SECRET: &str = "test-client-secret";

/// How the mock providers answer
#[derive(Debug, Clone)]
pub struct ProviderBehavior {
    pub token_status: u16,
    pub token_delay: Duration,
    pub expires_in: u64,
    pub search_status: u16,
    pub search_body: Value,
}

impl Default for ProviderBehavior {
    fn default() -> Self {
        Self {
            token_status: 200,
            token_delay: Duration::ZERO,
            expires_in: 3600,
            search_status: 200,
            search_body: default_search_body(),
        }
    }
}

/// Catalog response with one fully populated playlist
pub fn default_search_body() -> Value {
    json!({
        "playlists": {
            "items": [
                {
                    "name": "Mood Booster",
                    "external_urls": { "spotify": "https://open.spotify.com/playlist/mood" },
                    "images": [{ "url": "https://i.scdn.co/image/mood" }]
                }
            ]
        }
    })
}

/// Calls observed by the mock providers
#[derive(Default)]
pub struct ProviderLog {
    pub token_calls: AtomicUsize,
    pub search_calls: AtomicUsize,
    pub token_auth_headers: Mutex<Vec<String>>,
    pub token_forms: Mutex<Vec<HashMap<String, String>>>,
    pub search_queries: Mutex<Vec<String>>,
    pub search_auth_headers: Mutex<Vec<String>>,
}

impl ProviderLog {
    pub fn token_calls(&self) -> usize {
        self.token_calls.load(Ordering::SeqCst)
    }

    pub fn search_calls(&self) -> usize {
        self.search_calls.load(Ordering::SeqCst)
    }

    pub fn search_queries(&self) -> Vec<String> {
        self.search_queries.lock().unwrap().clone()
    }
}

#[derive(Clone)]
struct MockState {
    behavior: Arc<ProviderBehavior>,
    log: Arc<ProviderLog>,
}

/// Running mock of the identity and catalog providers
pub struct MockProvider {
    pub base_url: String,
    pub log: Arc<ProviderLog>,
}

impl MockProvider {
    pub async fn start(behavior: ProviderBehavior) -> Self {
        let log = Arc::new(ProviderLog::default());
        let state = MockState {
            behavior: Arc::new(behavior),
            log: Arc::clone(&log),
        };

        let app = Router::new()
            .route("/api/token", post(token_handler))
            .route("/v1/search", get(search_handler))
            .with_state(state);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            log,
        }
    }

    pub fn token_url(&self) -> String {
        format!("{}/api/token", self.base_url)
    }

    pub fn api_base_url(&self) -> String {
        format!("{}/v1", self.base_url)
    }

    pub fn broker(&self, leeway: Duration) -> Arc<CredentialBroker> {
        Arc::new(CredentialBroker::new(
            reqwest::Client::new(),
            self.token_url(),
            ClientCredentials::new(CLIENT_ID, CLIENT_SECRET),
            leeway,
        ))
    }

    pub fn catalog(&self, broker: Arc<CredentialBroker>) -> Arc<CatalogClient> {
        Arc::new(CatalogClient::new(
            reqwest::Client::new(),
            &self.api_base_url(),
            broker,
        ))
    }
}

async fn token_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let n = state.log.token_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let auth = header_value(&headers, "authorization");
    state.log.token_auth_headers.lock().unwrap().push(auth);
    state.log.token_forms.lock().unwrap().push(form);

    if !state.behavior.token_delay.is_zero() {
        tokio::time::sleep(state.behavior.token_delay).await;
    }

    let status = StatusCode::from_u16(state.behavior.token_status).unwrap();
    if !status.is_success() {
        return (status, Json(json!({ "error": "invalid_client" }))).into_response();
    }

    Json(json!({
        "access_token": format!("tok-{}", n),
        "token_type": "Bearer",
        "expires_in": state.behavior.expires_in,
    }))
    .into_response()
}

async fn search_handler(
    State(state): State<MockState>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    state.log.search_calls.fetch_add(1, Ordering::SeqCst);
    state
        .log
        .search_queries
        .lock()
        .unwrap()
        .push(query.unwrap_or_default());
    state
        .log
        .search_auth_headers
        .lock()
        .unwrap()
        .push(header_value(&headers, "authorization"));

    let status = StatusCode::from_u16(state.behavior.search_status).unwrap();
    if !status.is_success() {
        return (status, "upstream exploded").into_response();
    }
    Json(state.behavior.search_body.clone()).into_response()
}

fn header_value(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Expression model answering with a fixed outcome after an optional delay
pub struct ScriptedModel {
    pub outcome: Option<ExpressionDistribution>,
    pub delay: Duration,
    pub calls: AtomicUsize,
}

impl ScriptedModel {
    pub fn new(outcome: Option<ExpressionDistribution>) -> Self {
        Self {
            outcome,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl ExpressionModel for ScriptedModel {
    async fn detect_single_face(
        &self,
        _frame: &Frame,
    ) -> Result<Option<ExpressionDistribution>, ClassifierError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.outcome.clone())
    }
}

/// Frame source producing a constant frame
pub struct StaticFrameSource {
    pub deny: bool,
}

struct StaticDevice;

#[async_trait]
impl FrameSource for StaticFrameSource {
    async fn open(&self) -> Result<Box<dyn CaptureDevice>, CaptureError> {
        if self.deny {
            return Err(CaptureError::PermissionDenied("camera blocked".to_string()));
        }
        Ok(Box::new(StaticDevice))
    }
}

#[async_trait]
impl CaptureDevice for StaticDevice {
    async fn grab_frame(&mut self) -> Result<Frame, CaptureError> {
        Ok(Frame {
            data: vec![0xff, 0xd8, 0xff],
            content_type: "image/jpeg".to_string(),
            captured_at: Utc::now(),
        })
    }

    fn release(&mut self) {}
}

/// Assembled pipeline under test
pub struct Pipeline {
    pub orchestrator: Arc<Orchestrator>,
    pub catalog: Arc<CatalogClient>,
    pub broker: Arc<CredentialBroker>,
    pub readiness: Arc<ModelReadiness>,
    pub model: Arc<ScriptedModel>,
}

impl Pipeline {
    pub fn app_state(&self) -> AppState {
        AppState::new(Arc::clone(&self.orchestrator), Arc::clone(&self.catalog))
    }
}

/// Options for [`build_pipeline`]
pub struct PipelineOptions {
    pub models_ready: bool,
    pub start_camera: bool,
    pub deny_camera: bool,
    pub cycle_timeout: Option<Duration>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            models_ready: true,
            start_camera: true,
            deny_camera: false,
            cycle_timeout: Some(Duration::from_secs(10)),
        }
    }
}

pub async fn build_pipeline(
    provider: &MockProvider,
    model: ScriptedModel,
    options: PipelineOptions,
) -> Pipeline {
    let broker = provider.broker(Duration::ZERO);
    let catalog = provider.catalog(Arc::clone(&broker));

    let readiness = Arc::new(ModelReadiness::new());
    if options.models_ready {
        readiness.mark_ready();
    }
    let model = Arc::new(model);
    let classifier = Arc::new(ClassifierAdapter::new(
        Arc::clone(&model) as Arc<dyn ExpressionModel>,
        Arc::clone(&readiness),
    ));

    let camera = Arc::new(Camera::new(Box::new(StaticFrameSource {
        deny: options.deny_camera,
    })));
    if options.start_camera {
        camera.start().await.unwrap();
    }

    let orchestrator = Arc::new(Orchestrator::new(
        classifier,
        camera,
        Arc::clone(&catalog),
        options.cycle_timeout,
    ));

    Pipeline {
        orchestrator,
        catalog,
        broker,
        readiness,
        model,
    }
}
