//! Detect cycle orchestrator
//!
//! # State Progression
//! IDLE → CLASSIFYING → DECIDING → QUERYING → DONE, with ERRORED reachable
//! from any step. DECIDING goes straight to DONE when no face was found.
//! DONE and ERRORED are terminal for a cycle; the machine then returns to
//! IDLE and remembers the outcome for status reporting.
//!
//! One cycle runs at a time. A detect request while not IDLE is rejected as
//! busy, never queued. Precondition failures (models not ready, camera not
//! started) leave the machine IDLE. Nothing is retried here.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use super::capture::{Camera, CaptureError};
use super::catalog_client::{CatalogClient, CatalogError};
use super::classifier::{ClassifierAdapter, ClassifierError};
use super::decision_policy::decide;
use crate::types::{EmotionLabel, PlaylistResult};

/// Orchestrator states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CycleState {
    Idle,
    Classifying,
    Deciding,
    Querying,
    Done,
    Errored,
}

/// Failure taxonomy surfaced to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FailureKind {
    AuthFailure,
    CatalogFailure,
    ModelsNotReady,
    DevicePermissionDenied,
    NoActiveCamera,
    CaptureFailure,
    ClassifierFailure,
    Busy,
    Timeout,
}

/// Why a detect request did not produce a report
#[derive(Debug, Error)]
pub enum CycleError {
    #[error("A detect cycle is already running")]
    Busy,

    #[error("Models are not loaded yet")]
    ModelsNotReady,

    #[error("Camera is not started")]
    NoActiveCamera,

    #[error(transparent)]
    Capture(CaptureError),

    #[error(transparent)]
    Classifier(ClassifierError),

    #[error(transparent)]
    Catalog(CatalogError),

    #[error("Detect cycle timed out after {0:?}")]
    Timeout(Duration),
}

impl CycleError {
    pub fn kind(&self) -> FailureKind {
        match self {
            CycleError::Busy => FailureKind::Busy,
            CycleError::ModelsNotReady => FailureKind::ModelsNotReady,
            CycleError::NoActiveCamera => FailureKind::NoActiveCamera,
            CycleError::Capture(CaptureError::PermissionDenied(_)) => {
                FailureKind::DevicePermissionDenied
            }
            CycleError::Capture(CaptureError::NotActive) => FailureKind::NoActiveCamera,
            CycleError::Capture(_) => FailureKind::CaptureFailure,
            CycleError::Classifier(ClassifierError::ModelsNotReady) => FailureKind::ModelsNotReady,
            CycleError::Classifier(_) => FailureKind::ClassifierFailure,
            CycleError::Catalog(CatalogError::Auth(_)) => FailureKind::AuthFailure,
            CycleError::Catalog(_) => FailureKind::CatalogFailure,
            CycleError::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Rejected before the cycle started (machine stayed IDLE)
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            CycleError::Busy | CycleError::ModelsNotReady | CycleError::NoActiveCamera
        )
    }
}

/// Successful cycle result
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub cycle_id: Uuid,
    pub label: EmotionLabel,
    pub playlists: Vec<PlaylistResult>,
    /// States visited, first to last
    pub trace: Vec<CycleState>,
    pub completed_at: DateTime<Utc>,
}

/// Last terminal outcome, kept for status reporting
#[derive(Debug, Clone, Serialize)]
pub struct TerminalRecord {
    pub cycle_id: Uuid,
    pub state: CycleState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<EmotionLabel>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub trace: Vec<CycleState>,
    pub finished_at: DateTime<Utc>,
}

struct Machine {
    state: CycleState,
    trace: Vec<CycleState>,
    last: Option<TerminalRecord>,
}

/// Sequences capture → classify → decide → query for one detect request
pub struct Orchestrator {
    classifier: Arc<ClassifierAdapter>,
    camera: Arc<Camera>,
    catalog: Arc<CatalogClient>,
    cycle_timeout: Option<Duration>,
    machine: Mutex<Machine>,
}

impl Orchestrator {
    pub fn new(
        classifier: Arc<ClassifierAdapter>,
        camera: Arc<Camera>,
        catalog: Arc<CatalogClient>,
        cycle_timeout: Option<Duration>,
    ) -> Self {
        Self {
            classifier,
            camera,
            catalog,
            cycle_timeout,
            machine: Mutex::new(Machine {
                state: CycleState::Idle,
                trace: Vec::new(),
                last: None,
            }),
        }
    }

    pub fn state(&self) -> CycleState {
        self.lock_machine().state
    }

    pub fn last_outcome(&self) -> Option<TerminalRecord> {
        self.lock_machine().last.clone()
    }

    pub fn classifier(&self) -> &Arc<ClassifierAdapter> {
        &self.classifier
    }

    pub fn camera(&self) -> &Arc<Camera> {
        &self.camera
    }

    /// Run one detect cycle
    pub async fn detect(&self) -> Result<CycleReport, CycleError> {
        let cycle_id = self.begin()?;
        let mut guard = CycleGuard {
            orchestrator: self,
            cycle_id,
            finished: false,
        };

        let span = tracing::info_span!("detect_cycle", cycle_id = %cycle_id);
        let result = match self.cycle_timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.run_cycle().instrument(span)).await {
                    Ok(result) => result,
                    Err(_) => Err(CycleError::Timeout(limit)),
                }
            }
            None => self.run_cycle().instrument(span).await,
        };

        guard.finished = true;
        match result {
            Ok((label, playlists)) => Ok(self.finish_done(cycle_id, label, playlists)),
            Err(e) => {
                self.finish_errored(cycle_id, &e);
                Err(e)
            }
        }
    }

    /// IDLE → CLASSIFYING, after checking preconditions under one lock
    fn begin(&self) -> Result<Uuid, CycleError> {
        let mut machine = self.lock_machine();

        if machine.state != CycleState::Idle {
            debug!(state = ?machine.state, "Detect rejected: cycle in flight");
            return Err(CycleError::Busy);
        }
        if !self.classifier.is_ready() {
            return Err(CycleError::ModelsNotReady);
        }
        if !self.camera.is_active() {
            return Err(CycleError::NoActiveCamera);
        }

        machine.state = CycleState::Classifying;
        machine.trace = vec![CycleState::Classifying];
        Ok(Uuid::new_v4())
    }

    async fn run_cycle(&self) -> Result<(EmotionLabel, Vec<PlaylistResult>), CycleError> {
        let frame = self.camera.grab_frame().await.map_err(CycleError::Capture)?;
        let outcome = self
            .classifier
            .classify(&frame)
            .await
            .map_err(CycleError::Classifier)?;

        self.transition(CycleState::Deciding);
        let label = decide(&outcome);
        info!(label = %label, "Detected emotion");

        let Some(term) = label.query_term() else {
            return Ok((label, Vec::new()));
        };

        self.transition(CycleState::Querying);
        let playlists = self.catalog.search(term).await.map_err(CycleError::Catalog)?;
        Ok((label, playlists))
    }

    fn transition(&self, next: CycleState) {
        let mut machine = self.lock_machine();
        debug!(from = ?machine.state, to = ?next, "Cycle state transition");
        machine.state = next;
        machine.trace.push(next);
    }

    fn finish_done(
        &self,
        cycle_id: Uuid,
        label: EmotionLabel,
        playlists: Vec<PlaylistResult>,
    ) -> CycleReport {
        let mut machine = self.lock_machine();
        machine.trace.push(CycleState::Done);
        let trace = std::mem::take(&mut machine.trace);
        let completed_at = Utc::now();

        machine.last = Some(TerminalRecord {
            cycle_id,
            state: CycleState::Done,
            label: Some(label),
            failure: None,
            message: None,
            trace: trace.clone(),
            finished_at: completed_at,
        });
        machine.state = CycleState::Idle;

        info!(
            cycle_id = %cycle_id,
            label = %label,
            playlists = playlists.len(),
            "Detect cycle completed"
        );

        CycleReport {
            cycle_id,
            label,
            playlists,
            trace,
            completed_at,
        }
    }

    fn finish_errored(&self, cycle_id: Uuid, error: &CycleError) {
        self.record_errored(cycle_id, Some(error.kind()), error.to_string());
        warn!(
            cycle_id = %cycle_id,
            kind = ?error.kind(),
            error = %error,
            "Detect cycle failed"
        );
    }

    fn record_errored(&self, cycle_id: Uuid, failure: Option<FailureKind>, message: String) {
        let mut machine = self.lock_machine();
        machine.state = CycleState::Errored;
        machine.trace.push(CycleState::Errored);
        let trace = std::mem::take(&mut machine.trace);

        machine.last = Some(TerminalRecord {
            cycle_id,
            state: CycleState::Errored,
            label: None,
            failure,
            message: Some(message),
            trace,
            finished_at: Utc::now(),
        });
        machine.state = CycleState::Idle;
    }

    fn lock_machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Returns the machine to IDLE if a cycle future is dropped mid-flight
struct CycleGuard<'a> {
    orchestrator: &'a Orchestrator,
    cycle_id: Uuid,
    finished: bool,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            warn!(cycle_id = %self.cycle_id, "Detect cycle abandoned by caller");
            self.orchestrator
                .record_errored(self.cycle_id, None, "cycle abandoned".to_string());
        }
    }
}
