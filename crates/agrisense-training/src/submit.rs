//! Sends the training-start request and interprets the immediate response.

use crate::backend::TrainingBackend;
use crate::error::Result;
use crate::job::{TrainingJobHandle, TrainingJobId, TrainingRequest};
use crate::normalize::lookup;
use serde_json::Value;
use tracing::{debug, info};

pub const MISSING_JOB_ID: &str = "no job identifier returned";

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    /// The backend trained synchronously; no polling needed.
    Completed(Value),
    /// The backend accepted the job; poll for completion.
    Accepted { handle: TrainingJobHandle, raw: Value },
    /// The backend answered with an inline error (or no usable identifier).
    Failed(String),
}

/// Submit `request` and classify the response.
///
/// Transport failures and HTTP error statuses are returned as `Err`; inline
/// error payloads in a successful response become [`SubmitOutcome::Failed`].
pub async fn submit<B: TrainingBackend + ?Sized>(
    backend: &B,
    request: &TrainingRequest,
) -> Result<SubmitOutcome> {
    let body = request.to_body();
    info!(
        dataset_id = %body.dataset_id,
        algorithm = %body.algorithm,
        "Submitting training request"
    );

    let raw = backend.start_training(&body).await?;
    let outcome = classify_submit_response(raw);
    debug!(?outcome, "Training submit outcome");
    Ok(outcome)
}

/// Interpret a `POST /models/train/` response body.
#[must_use]
pub fn classify_submit_response(raw: Value) -> SubmitOutcome {
    if let Some(error) = lookup(&raw, &["error"]) {
        let message = match error {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        return SubmitOutcome::Failed(message);
    }

    let finished = [&["metrics", "metrics", "success"][..], &["metrics", "success"][..]]
        .iter()
        .any(|path| lookup(&raw, *path).and_then(Value::as_bool) == Some(true));
    if finished {
        return SubmitOutcome::Completed(raw);
    }

    let job_id = ["name", "jobId", "job_id", "id"].iter().find_map(|key| {
        match lookup(&raw, &[*key])? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    });

    match job_id {
        Some(id) => SubmitOutcome::Accepted { handle: TrainingJobHandle::new(TrainingJobId(id)), raw },
        None => SubmitOutcome::Failed(MISSING_JOB_ID.to_string()),
    }
}
