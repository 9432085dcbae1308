//! Status polling for an accepted training job.

use crate::backend::TrainingBackend;
use crate::config::OrchestratorConfig;
use crate::error::{Result, TrainingError};
use crate::job::TrainingJobId;
use crate::normalize::{as_number, lookup};
use crate::progress::ServerProgress;
use futures::stream::{self, Stream};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Interpretation of one status response.
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingStatus {
    Pending,
    InProgress(ServerProgress),
    /// Terminal success; carries the raw status body for normalization.
    Completed(Value),
    /// Terminal failure reported by the backend.
    Failed(String),
}

impl TrainingStatus {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::Failed(_))
    }
}

/// Classify a status response body.
///
/// Success is signalled by `metrics.success == true` or `status == "completed"`;
/// `status == "failed"` is a terminal failure. Anything else is still running.
#[must_use]
pub fn classify_status(body: &Value) -> TrainingStatus {
    let status = lookup(body, &["status"]).and_then(Value::as_str).map(str::to_ascii_lowercase);
    let succeeded = lookup(body, &["metrics", "success"]).and_then(Value::as_bool) == Some(true);

    if succeeded || status.as_deref() == Some("completed") {
        return TrainingStatus::Completed(body.clone());
    }

    if status.as_deref() == Some("failed") {
        let message = ["error", "message"]
            .iter()
            .find_map(|key| lookup(body, &[*key]).and_then(Value::as_str))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or("Training failed");
        return TrainingStatus::Failed(message.to_string());
    }

    match server_progress(body) {
        Some(progress) => TrainingStatus::InProgress(progress),
        None => TrainingStatus::Pending,
    }
}

/// Extract `progress` / `overall_progress` in either of the shapes the backend uses:
/// a map of stage name to percent, or `{steps: [{name, progress}], overall}`.
fn server_progress(body: &Value) -> Option<ServerProgress> {
    let progress = lookup(body, &["progress"]);
    let mut reported = ServerProgress {
        overall: lookup(body, &["overall_progress"])
            .or_else(|| progress.and_then(|p| lookup(p, &["overall"])))
            .and_then(as_number),
        stages: Vec::new(),
    };

    match progress {
        Some(Value::Object(map)) => {
            if let Some(Value::Array(steps)) = map.get("steps") {
                reported.stages = steps
                    .iter()
                    .filter_map(|step| {
                        let name = step.get("name")?.as_str()?.to_string();
                        let pct = step.get("progress").or_else(|| step.get("percent")).and_then(as_number)?;
                        Some((name, pct))
                    })
                    .collect();
            } else {
                reported.stages = map
                    .iter()
                    .filter(|(key, _)| key.as_str() != "overall")
                    .filter_map(|(name, v)| as_number(v).map(|pct| (name.clone(), pct)))
                    .collect();
            }
        }
        Some(other) => {
            if reported.overall.is_none() {
                reported.overall = as_number(other);
            }
        }
        None => {}
    }

    (reported.overall.is_some() || !reported.stages.is_empty()).then_some(reported)
}

/// Polls `GET /models/{id}/status/` at a fixed interval, bounded by an attempt budget.
pub struct StatusPoller<B: TrainingBackend + ?Sized> {
    backend: Arc<B>,
    job_id: TrainingJobId,
    interval: Duration,
    max_attempts: u32,
    cancel: CancellationToken,
}

struct PollState<B: TrainingBackend + ?Sized> {
    poller: StatusPoller<B>,
    attempts: u32,
    done: bool,
}

impl<B: TrainingBackend + ?Sized + 'static> StatusPoller<B> {
    #[must_use]
    pub fn new(
        backend: Arc<B>,
        job_id: TrainingJobId,
        config: &OrchestratorConfig,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            job_id,
            interval: config.poll_interval(),
            max_attempts: config.max_attempts.max(1),
            cancel,
        }
    }

    /// Turn the poller into a lazy, finite stream of statuses.
    ///
    /// The stream yields one item per successful status response, ends after
    /// the first terminal status, and yields `Err(TrainingError::Timeout)` once
    /// the attempt budget is spent. Failed requests consume an attempt but
    /// produce no item. Cancellation ends the stream without a final item.
    pub fn into_stream(self) -> impl Stream<Item = Result<TrainingStatus>> + Send
    where
        B: Send + Sync,
    {
        let state = PollState { poller: self, attempts: 0, done: false };
        stream::unfold(state, |mut state| async move {
            if state.done {
                return None;
            }
            let item = state.next_item().await?;
            if matches!(&item, Ok(status) if status.is_terminal()) || item.is_err() {
                state.done = true;
            }
            Some((item, state))
        })
    }
}

impl<B: TrainingBackend + ?Sized> PollState<B> {
    /// Run attempts until one produces an item, the budget runs out, or the job is cancelled.
    async fn next_item(&mut self) -> Option<Result<TrainingStatus>> {
        let poller = &self.poller;
        loop {
            if poller.cancel.is_cancelled() {
                return None;
            }
            if self.attempts >= poller.max_attempts {
                warn!(job_id = %poller.job_id, attempts = self.attempts, "Training status polling timed out");
                return Some(Err(TrainingError::Timeout { attempts: self.attempts }));
            }

            // Sleep between attempts, not before the first one.
            if self.attempts > 0 {
                tokio::select! {
                    biased;
                    () = poller.cancel.cancelled() => return None,
                    () = tokio::time::sleep(poller.interval) => {}
                }
            }

            self.attempts += 1;
            let attempt = self.attempts;

            let response = tokio::select! {
                biased;
                () = poller.cancel.cancelled() => return None,
                response = poller.backend.training_status(&poller.job_id) => response,
            };

            match response {
                Ok(body) => {
                    let status = classify_status(&body);
                    debug!(job_id = %poller.job_id, attempt, ?status, "Training status");
                    return Some(Ok(status));
                }
                Err(err) => {
                    warn!(job_id = %poller.job_id, attempt, error = %err, "Status check failed, will retry");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::TrainRequestBody;
    use async_trait::async_trait;
    use futures::StreamExt;
    use serde_json::json;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Replays scripted status responses; repeats the last one when exhausted.
    struct ScriptedStatus {
        responses: Mutex<VecDeque<Result<Value>>>,
        last: Value,
        calls: AtomicU32,
    }

    impl ScriptedStatus {
        fn new(responses: Vec<Result<Value>>, last: Value) -> Self {
            Self { responses: Mutex::new(responses.into()), last, calls: AtomicU32::new(0) }
        }
    }

    #[async_trait]
    impl TrainingBackend for ScriptedStatus {
        async fn start_training(&self, _body: &TrainRequestBody) -> Result<Value> {
            unreachable!("poller never submits")
        }

        async fn training_status(&self, _job_id: &TrainingJobId) -> Result<Value> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let next = self.responses.lock().unwrap().pop_front();
            next.unwrap_or_else(|| Ok(self.last.clone()))
        }
    }

    fn poller(backend: Arc<ScriptedStatus>, cancel: CancellationToken) -> StatusPoller<ScriptedStatus> {
        StatusPoller::new(backend, TrainingJobId("job-1".to_string()), &OrchestratorConfig::default(), cancel)
    }

    #[test]
    fn test_classify_terminal_shapes() {
        assert!(matches!(classify_status(&json!({"status": "completed"})), TrainingStatus::Completed(_)));
        assert!(matches!(
            classify_status(&json!({"metrics": {"success": true}})),
            TrainingStatus::Completed(_)
        ));
        assert_eq!(
            classify_status(&json!({"status": "failed", "error": "Dataset is empty"})),
            TrainingStatus::Failed("Dataset is empty".to_string())
        );
        assert_eq!(
            classify_status(&json!({"status": "failed"})),
            TrainingStatus::Failed("Training failed".to_string())
        );
    }

    #[test]
    fn test_classify_non_terminal_shapes() {
        assert_eq!(classify_status(&json!({"status": "pending"})), TrainingStatus::Pending);
        assert_eq!(classify_status(&json!({})), TrainingStatus::Pending);
        assert_eq!(classify_status(&json!({"metrics": {"success": false}})), TrainingStatus::Pending);
        // The backend's own failure literal for internal errors is "error", which is retried.
        assert!(!classify_status(&json!({"status": "error", "message": "boom"})).is_terminal());

        let status = classify_status(&json!({
            "status": "in_progress",
            "progress": {"dataset preprocessing": 100, "feature selection": 40},
            "overall_progress": 28.0
        }));
        let TrainingStatus::InProgress(progress) = status else {
            panic!("expected in-progress, got {status:?}");
        };
        assert_eq!(progress.overall, Some(28.0));
        assert_eq!(progress.stages.len(), 2);
    }

    #[test]
    fn test_classify_steps_shape() {
        let status = classify_status(&json!({
            "status": "running",
            "progress": {"overall": 10, "steps": [{"name": "Dataset Preprocessing", "progress": 50}]}
        }));
        assert_eq!(
            status,
            TrainingStatus::InProgress(ServerProgress {
                overall: Some(10.0),
                stages: vec![("Dataset Preprocessing".to_string(), 50.0)],
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_pending_times_out_after_exactly_max_attempts() {
        let backend = Arc::new(ScriptedStatus::new(vec![], json!({"status": "pending"})));
        let start = tokio::time::Instant::now();
        let items: Vec<_> = poller(backend.clone(), CancellationToken::new()).into_stream().collect().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 30);
        assert_eq!(items.len(), 31);
        assert!(items[..30].iter().all(|i| matches!(i, Ok(TrainingStatus::Pending))));
        assert!(matches!(items[30], Err(TrainingError::Timeout { attempts: 30 })));
        // 29 gaps of two seconds between 30 attempts.
        assert_eq!(start.elapsed(), Duration::from_secs(58));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_errors_consume_attempts_without_items() {
        let backend = Arc::new(ScriptedStatus::new(
            vec![
                Err(TrainingError::Transport("connection refused".to_string())),
                Err(TrainingError::Backend("Model not found".to_string())),
            ],
            json!({"status": "completed", "metrics": {"accuracy": 0.9}}),
        ));
        let items: Vec<_> = poller(backend.clone(), CancellationToken::new()).into_stream().collect().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Ok(TrainingStatus::Completed(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_failures_still_time_out() {
        let backend = Arc::new(ScriptedStatus::new(
            (0..40).map(|_| Err(TrainingError::Transport("down".to_string()))).collect(),
            json!({}),
        ));
        let items: Vec<_> = poller(backend.clone(), CancellationToken::new()).into_stream().collect().await;

        assert_eq!(backend.calls.load(Ordering::SeqCst), 30);
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(TrainingError::Timeout { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_ends_after_failed_status() {
        let backend = Arc::new(ScriptedStatus::new(
            vec![Ok(json!({"status": "pending"})), Ok(json!({"status": "failed", "error": "bad csv"}))],
            json!({"status": "completed"}),
        ));
        let items: Vec<_> = poller(backend.clone(), CancellationToken::new()).into_stream().collect().await;

        assert_eq!(items.len(), 2);
        assert!(matches!(&items[1], Ok(TrainingStatus::Failed(m)) if m == "bad csv"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_stops_scheduling() {
        let backend = Arc::new(ScriptedStatus::new(vec![], json!({"status": "pending"})));
        let cancel = CancellationToken::new();
        let mut stream = Box::pin(poller(backend.clone(), cancel.clone()).into_stream());

        assert!(matches!(stream.next().await, Some(Ok(TrainingStatus::Pending))));
        assert!(matches!(stream.next().await, Some(Ok(TrainingStatus::Pending))));
        cancel.cancel();
        assert!(stream.next().await.is_none());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }
}
