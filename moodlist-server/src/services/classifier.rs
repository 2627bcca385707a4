//! Expression classifier adapter
//!
//! Wraps an external single-face detector + expression scorer. The model
//! itself is a black box behind [`ExpressionModel`]; this module owns the
//! readiness gate and the mapping of its output to [`ClassifierOutcome`].

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use super::capture::Frame;
use crate::types::{ClassifierOutcome, ExpressionDistribution};

/// Model manifests that must be present before classification is allowed
pub const MODEL_MANIFESTS: [&str; 2] = [
    "tiny_face_detector_model-weights_manifest.json",
    "face_expression_model-weights_manifest.json",
];

/// Classifier errors
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("Models are not loaded yet")]
    ModelsNotReady,

    #[error("Inference request failed: {0}")]
    Network(String),

    #[error("Inference service error {0}: {1}")]
    Service(u16, String),

    #[error("Invalid detector output: {0}")]
    InvalidOutput(String),
}

/// Model artifact loading errors
#[derive(Debug, Error)]
pub enum ModelLoadError {
    #[error("Failed to read model manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Model manifest {path} is not valid JSON: {message}")]
    Malformed { path: PathBuf, message: String },
}

/// Boolean gate flipped once the model artifacts are loaded
#[derive(Debug, Default)]
pub struct ModelReadiness {
    ready: AtomicBool,
}

impl ModelReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }
}

/// Load the detector and expression model manifests from `models_dir`
///
/// Marks `readiness` only when every manifest reads and parses.
pub async fn load_models(models_dir: &Path, readiness: &ModelReadiness) -> Result<(), ModelLoadError> {
    for manifest in MODEL_MANIFESTS {
        let path = models_dir.join(manifest);
        let content = tokio::fs::read(&path)
            .await
            .map_err(|source| ModelLoadError::Read {
                path: path.clone(),
                source,
            })?;
        serde_json::from_slice::<serde_json::Value>(&content).map_err(|e| {
            ModelLoadError::Malformed {
                path: path.clone(),
                message: e.to_string(),
            }
        })?;
        debug!(manifest, "Model manifest loaded");
    }

    readiness.mark_ready();
    info!(models_dir = %models_dir.display(), "Models loaded successfully");
    Ok(())
}

/// External detector: locates at most one face and scores its expressions
#[async_trait]
pub trait ExpressionModel: Send + Sync {
    /// `Ok(None)` when no face is located
    async fn detect_single_face(
        &self,
        frame: &Frame,
    ) -> Result<Option<ExpressionDistribution>, ClassifierError>;
}

/// Detection payload returned by the inference service
#[derive(Debug, Deserialize)]
struct RemoteDetection {
    expressions: ExpressionDistribution,
}

/// Detector reached over HTTP
///
/// The frame bytes are POSTed as the request body; the service answers
/// `null` when no face is found or `{"expressions": {...}}`.
pub struct RemoteExpressionModel {
    http_client: reqwest::Client,
    endpoint: String,
}

impl RemoteExpressionModel {
    pub fn new(http_client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            http_client,
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl ExpressionModel for RemoteExpressionModel {
    async fn detect_single_face(
        &self,
        frame: &Frame,
    ) -> Result<Option<ExpressionDistribution>, ClassifierError> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, frame.content_type.as_str())
            .body(frame.data.clone())
            .send()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Service(status.as_u16(), body));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| ClassifierError::Network(e.to_string()))?;
        parse_detection(&body)
    }
}

fn parse_detection(body: &[u8]) -> Result<Option<ExpressionDistribution>, ClassifierError> {
    let detection: Option<RemoteDetection> = serde_json::from_slice(body)
        .map_err(|e| ClassifierError::InvalidOutput(e.to_string()))?;
    Ok(detection.map(|d| d.expressions))
}

/// Readiness-gated front for an [`ExpressionModel`]
pub struct ClassifierAdapter {
    model: Arc<dyn ExpressionModel>,
    readiness: Arc<ModelReadiness>,
}

impl ClassifierAdapter {
    pub fn new(model: Arc<dyn ExpressionModel>, readiness: Arc<ModelReadiness>) -> Self {
        Self { model, readiness }
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    /// Classify one frame
    ///
    /// Calling before the models are ready is a caller error and is not retried.
    pub async fn classify(&self, frame: &Frame) -> Result<ClassifierOutcome, ClassifierError> {
        if !self.is_ready() {
            return Err(ClassifierError::ModelsNotReady);
        }

        match self.model.detect_single_face(frame).await? {
            Some(distribution) => {
                debug!(expressions = distribution.len(), "Face located");
                Ok(ClassifierOutcome::Face(distribution))
            }
            None => {
                debug!("No face located in frame");
                Ok(ClassifierOutcome::NoFaceFound)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Expression;
    use chrono::Utc;

    struct FixedModel(Option<ExpressionDistribution>);

    #[async_trait]
    impl ExpressionModel for FixedModel {
        async fn detect_single_face(
            &self,
            _frame: &Frame,
        ) -> Result<Option<ExpressionDistribution>, ClassifierError> {
            Ok(self.0.clone())
        }
    }

    fn frame() -> Frame {
        Frame {
            data: vec![0xff, 0xd8],
            content_type: "image/jpeg".to_string(),
            captured_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_not_ready_is_caller_error() {
        let adapter = ClassifierAdapter::new(
            Arc::new(FixedModel(None)),
            Arc::new(ModelReadiness::new()),
        );
        let result = adapter.classify(&frame()).await;
        assert!(matches!(result, Err(ClassifierError::ModelsNotReady)));
    }

    #[tokio::test]
    async fn test_no_face_distinct_from_distribution() {
        let readiness = Arc::new(ModelReadiness::new());
        readiness.mark_ready();

        let adapter = ClassifierAdapter::new(Arc::new(FixedModel(None)), Arc::clone(&readiness));
        assert_eq!(adapter.classify(&frame()).await.unwrap(), ClassifierOutcome::NoFaceFound);

        let dist = ExpressionDistribution::from_pairs([(Expression::Neutral, 0.3)]).unwrap();
        let adapter = ClassifierAdapter::new(Arc::new(FixedModel(Some(dist.clone()))), readiness);
        assert_eq!(adapter.classify(&frame()).await.unwrap(), ClassifierOutcome::Face(dist));
    }

    #[test]
    fn test_parse_detection() {
        assert!(parse_detection(b"null").unwrap().is_none());

        let dist = parse_detection(br#"{"expressions":{"happy":0.9,"sad":0.05}}"#)
            .unwrap()
            .unwrap();
        assert_eq!(dist.score(Expression::Happy), Some(0.9));

        assert!(matches!(
            parse_detection(br#"{"expressions":{}}"#),
            Err(ClassifierError::InvalidOutput(_))
        ));
        assert!(matches!(
            parse_detection(b"not json"),
            Err(ClassifierError::InvalidOutput(_))
        ));
    }

    #[tokio::test]
    async fn test_load_models_marks_ready() {
        let dir = tempfile::tempdir().unwrap();
        for manifest in MODEL_MANIFESTS {
            std::fs::write(dir.path().join(manifest), r#"[{"weights":[],"paths":["shard1"]}]"#)
                .unwrap();
        }
        let readiness = ModelReadiness::new();
        load_models(dir.path(), &readiness).await.unwrap();
        assert!(readiness.is_ready());
    }

    #[tokio::test]
    async fn test_load_models_missing_manifest_stays_not_ready() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(MODEL_MANIFESTS[0]), "[]").unwrap();

        let readiness = ModelReadiness::new();
        let err = load_models(dir.path(), &readiness).await.unwrap_err();
        assert!(matches!(err, ModelLoadError::Read { .. }));
        assert!(!readiness.is_ready());
    }

    #[tokio::test]
    async fn test_load_models_malformed_manifest() {
        let dir = tempfile::tempdir().unwrap();
        for manifest in MODEL_MANIFESTS {
            std::fs::write(dir.path().join(manifest), "{ nope").unwrap();
        }
        let readiness = ModelReadiness::new();
        let err = load_models(dir.path(), &readiness).await.unwrap_err();
        assert!(matches!(err, ModelLoadError::Malformed { .. }));
        assert!(!readiness.is_ready());
    }
}
