//! AgriSense Training
//!
//! Client-side orchestration of crop model training jobs:
//! - Validating and submitting training requests (`submit`)
//! - Polling job status with a bounded attempt budget (`StatusPoller`)
//! - Simulating a five-stage progress timeline while a job runs (`ProgressSimulator`)
//! - Normalizing the backend's response shapes into one `TrainingResult`
//! - Exposing all of it as observable state (`TrainingOrchestrator`)

pub mod api;
pub mod backend;
pub mod config;
pub mod error;
pub mod job;
pub mod normalize;
pub mod orchestrator;
pub mod poller;
pub mod progress;
pub mod submit;

pub use api::{AlternativeCrop, CropPrediction, DatasetUpload, HttpBackend, PredictionRecord, SoilSample, TopCrop};
pub use backend::TrainingBackend;
pub use config::{AgrisenseConfig, ApiConfig, OrchestratorConfig};
pub use error::{Result, TrainingError};
pub use job::{TrainRequestBody, TrainingAlgorithm, TrainingJobHandle, TrainingJobId, TrainingParams, TrainingRequest};
pub use normalize::{normalize, FeatureImportance, TrainingResult};
pub use orchestrator::{IncrementFactory, JobTicket, OrchestratorState, TrainingOrchestrator};
pub use poller::{classify_status, StatusPoller, TrainingStatus};
pub use progress::{
    IncrementSource, ProgressSimulator, ProgressStage, ProgressState, RandomIncrements,
    ScriptedIncrements, ServerProgress, StageStatus, STAGE_NAMES,
};
pub use submit::{submit, SubmitOutcome};
