//! Business logic services for moodlist-server

pub mod capture;
pub mod catalog_client;
pub mod classifier;
pub mod credential_broker;
pub mod decision_policy;
pub mod orchestrator;
pub mod retry;

pub use capture::{Camera, CaptureDevice, CaptureError, Frame, FrameSource, SnapshotFrameSource};
pub use catalog_client::{CatalogClient, CatalogError};
pub use classifier::{
    load_models, ClassifierAdapter, ClassifierError, ExpressionModel, ModelReadiness,
    RemoteExpressionModel,
};
pub use credential_broker::{AccessToken, AuthError, CredentialBroker};
pub use decision_policy::decide;
pub use orchestrator::{CycleError, CycleReport, CycleState, FailureKind, Orchestrator};
pub use retry::{retry_with_backoff, RetryPolicy};
