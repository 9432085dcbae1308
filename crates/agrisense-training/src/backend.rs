use crate::error::Result;
use crate::job::{TrainRequestBody, TrainingJobId};
use async_trait::async_trait;
use serde_json::Value;

/// The two backend calls the training orchestrator depends on.
///
/// Responses are returned as raw JSON because the backend's response shapes
/// differ between the synchronous and polled paths; interpretation lives in
/// [`crate::submit`], [`crate::poller`] and [`crate::normalize`].
#[async_trait]
pub trait TrainingBackend: Send + Sync {
    /// `POST /models/train/`
    async fn start_training(&self, body: &TrainRequestBody) -> Result<Value>;

    /// `GET /models/{job_id}/status/`
    async fn training_status(&self, job_id: &TrainingJobId) -> Result<Value>;
}

#[async_trait]
impl<T: TrainingBackend + ?Sized> TrainingBackend for std::sync::Arc<T> {
    async fn start_training(&self, body: &TrainRequestBody) -> Result<Value> {
        (**self).start_training(body).await
    }

    async fn training_status(&self, job_id: &TrainingJobId) -> Result<Value> {
        (**self).training_status(job_id).await
    }
}
