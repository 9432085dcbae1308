//! Training job orchestrator facade.
//!
//! Owns the observable [`OrchestratorState`] and drives one job at a time:
//! submit, then poll and simulate progress concurrently until a terminal
//! status, then publish exactly one of `result` or `error`.
//!
//! Every mutation goes through a generation check performed under the watch
//! channel's write lock. [`TrainingOrchestrator::start`] bumps the generation
//! in the same critical section that resets the state, so callbacks belonging
//! to a superseded job become no-ops the moment `start` returns.

use crate::backend::TrainingBackend;
use crate::config::OrchestratorConfig;
use crate::error::Result;
use crate::job::{TrainingJobHandle, TrainingJobId, TrainingRequest};
use crate::normalize::{normalize, TrainingResult};
use crate::poller::{StatusPoller, TrainingStatus};
use crate::progress::{IncrementSource, ProgressSimulator, ProgressState, RandomIncrements};
use crate::submit::{submit, SubmitOutcome};
use futures::StreamExt;
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Snapshot of the orchestrator, as seen by the presentation layer.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OrchestratorState {
    pub loading: bool,
    pub error: Option<String>,
    pub progress: Option<ProgressState>,
    pub result: Option<TrainingResult>,
    /// Backend job id once the submit call has been accepted.
    pub job_id: Option<TrainingJobId>,
    /// Bumped by every `start` and `cancel`; identifies the job the state belongs to.
    pub generation: u64,
}

/// Builds a fresh increment source for each job's progress simulator.
pub type IncrementFactory = Arc<dyn Fn() -> Box<dyn IncrementSource> + Send + Sync>;

enum Outcome {
    Succeeded(TrainingResult),
    /// Terminal failure reported after polling began; the timeline is forced to 100%.
    FailedAfterStart(String),
    /// Failure before the job existed server-side; the timeline is left as is.
    FailedToStart(String),
}

struct Inner<B> {
    backend: Arc<B>,
    config: OrchestratorConfig,
    increments: IncrementFactory,
    state: watch::Sender<OrchestratorState>,
    active: Mutex<Option<CancellationToken>>,
}

pub struct TrainingOrchestrator<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for TrainingOrchestrator<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

/// Handle to one `start` call.
#[derive(Debug)]
pub struct JobTicket {
    generation: u64,
    handle: Option<JoinHandle<()>>,
    state: watch::Receiver<OrchestratorState>,
}

impl JobTicket {
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Wait for this job's driver to stop and return the orchestrator state.
    ///
    /// If the job was superseded the returned state belongs to the newer job;
    /// compare [`OrchestratorState::generation`] with [`Self::generation`].
    pub async fn wait(self) -> OrchestratorState {
        if let Some(handle) = self.handle {
            if let Err(e) = handle.await {
                error!(generation = self.generation, error = %e, "Training supervisor task failed");
            }
        }
        let snapshot = self.state.borrow().clone();
        snapshot
    }
}

impl<B: TrainingBackend + 'static> TrainingOrchestrator<B> {
    /// Rejects an invalid [`OrchestratorConfig`] up front.
    pub fn new(backend: B, config: OrchestratorConfig) -> Result<Self> {
        Self::from_arc(Arc::new(backend), config)
    }

    pub fn from_arc(backend: Arc<B>, config: OrchestratorConfig) -> Result<Self> {
        let (min, max) = (config.min_increment, config.max_increment);
        let increments: IncrementFactory =
            Arc::new(move || Box::new(RandomIncrements::new(min, max)) as Box<dyn IncrementSource>);
        Self::with_increments(backend, config, increments)
    }

    /// Construct with a custom increment source (deterministic tests, demos).
    pub fn with_increments(
        backend: Arc<B>,
        config: OrchestratorConfig,
        increments: IncrementFactory,
    ) -> Result<Self> {
        config.validate()?;
        let (state, _) = watch::channel(OrchestratorState::default());
        Ok(Self {
            inner: Arc::new(Inner {
                backend,
                config,
                increments,
                state,
                active: Mutex::new(None),
            }),
        })
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    #[must_use]
    pub fn state(&self) -> OrchestratorState {
        self.inner.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorState> {
        self.inner.state.subscribe()
    }

    /// Start training from loosely typed input; invalid input is reported in `state.error`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self, algorithm: &str, dataset_id: &str) -> JobTicket {
        self.launch(TrainingRequest::parse(algorithm, dataset_id))
    }

    pub fn start_request(&self, request: TrainingRequest) -> JobTicket {
        self.launch(Ok(request))
    }

    /// Drop the finished result and progress. An in-flight job keeps running.
    pub fn clear(&self) {
        self.inner.state.send_modify(|s| {
            s.result = None;
            s.progress = None;
        });
    }

    /// Abandon the active job, if any. Its late responses are discarded.
    pub fn cancel(&self) {
        self.inner.state.send_modify(|s| {
            self.inner.swap_active(None);
            s.generation += 1;
            if s.loading {
                info!(generation = s.generation, "Training job cancelled");
                s.loading = false;
            }
        });
    }

    fn launch(&self, request: Result<TrainingRequest>) -> JobTicket {
        let cancel = CancellationToken::new();
        let valid = request.is_ok();
        let mut generation = 0;

        self.inner.state.send_modify(|s| {
            self.inner.swap_active(valid.then(|| cancel.clone()));
            if s.loading {
                warn!(previous = s.generation, "Superseding active training job");
            }
            s.generation += 1;
            generation = s.generation;
            s.job_id = None;
            s.result = None;
            match &request {
                Ok(_) => {
                    s.loading = true;
                    s.error = None;
                    s.progress = Some(ProgressState::initial());
                }
                Err(e) => {
                    s.loading = false;
                    s.error = Some(e.to_string());
                    s.progress = None;
                }
            }
        });

        let request = match request {
            Ok(request) => request,
            Err(e) => {
                warn!(generation, error = %e, "Rejected training request");
                return JobTicket { generation, handle: None, state: self.subscribe() };
            }
        };

        info!(
            generation,
            dataset_id = %request.dataset_id(),
            algorithm = %request.algorithm(),
            "Starting training job"
        );

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move {
            let driver = {
                let inner = Arc::clone(&inner);
                tokio::spawn(async move { inner.drive(request, generation, cancel).await })
            };
            // A crashed driver still has to end the job it owned.
            if let Err(e) = driver.await {
                error!(generation, error = %e, "Training driver task failed");
                inner.finish(generation, Outcome::FailedAfterStart(format!("Training failed unexpectedly: {e}")));
            }
        });
        JobTicket { generation, handle: Some(handle), state: self.subscribe() }
    }
}

impl<B> Inner<B> {
    /// Replace the active job token, cancelling the old one.
    ///
    /// Only called while holding the state channel's write lock, which keeps
    /// the token and the generation in step.
    fn swap_active(&self, next: Option<CancellationToken>) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = std::mem::replace(&mut *active, next) {
            previous.cancel();
        }
    }

    /// Apply `f` only if `generation` is still current. Returns whether it was applied.
    fn update(&self, generation: u64, f: impl FnOnce(&mut OrchestratorState)) -> bool {
        let mut applied = false;
        self.state.send_if_modified(|s| {
            if s.generation != generation {
                return false;
            }
            f(s);
            applied = true;
            true
        });
        applied
    }

    fn finish(&self, generation: u64, outcome: Outcome) {
        let applied = self.update(generation, |s| {
            self.swap_active(None);
            s.loading = false;
            match outcome {
                Outcome::Succeeded(result) => {
                    s.result = Some(result);
                    s.error = None;
                    if let Some(progress) = s.progress.as_mut() {
                        progress.complete();
                    }
                }
                Outcome::FailedAfterStart(message) => {
                    s.error = Some(message);
                    if let Some(progress) = s.progress.as_mut() {
                        progress.complete();
                    }
                }
                Outcome::FailedToStart(message) => {
                    s.error = Some(message);
                }
            }
        });

        if !applied {
            debug!(generation, "Discarding outcome of superseded training job");
        }
    }
}

impl<B: TrainingBackend + 'static> Inner<B> {
    async fn drive(&self, request: TrainingRequest, generation: u64, cancel: CancellationToken) {
        let submitted = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            submitted = submit(self.backend.as_ref(), &request) => submitted,
        };

        let outcome = match submitted {
            Err(e) => {
                error!(generation, error = %e, "Training request failed");
                Outcome::FailedToStart(e.to_string())
            }
            Ok(SubmitOutcome::Failed(message)) => {
                warn!(generation, %message, "Backend rejected training request");
                Outcome::FailedToStart(message)
            }
            Ok(SubmitOutcome::Completed(raw)) => {
                info!(generation, "Training completed synchronously");
                Outcome::Succeeded(normalize(&raw, None))
            }
            Ok(SubmitOutcome::Accepted { handle, raw }) => {
                let job_id = handle.job_id.clone();
                let accepted = self.update(generation, |s| {
                    s.job_id = Some(job_id);
                    if let Some(progress) = s.progress.as_mut() {
                        progress.begin();
                    }
                });
                if !accepted {
                    return;
                }
                match self.follow(generation, &handle, &raw, &cancel).await {
                    Some(outcome) => outcome,
                    None => return,
                }
            }
        };

        self.finish(generation, outcome);
    }

    /// Poll an accepted job while simulating progress. `None` means the job was cancelled.
    async fn follow(
        &self,
        generation: u64,
        handle: &TrainingJobHandle,
        submit_raw: &Value,
        cancel: &CancellationToken,
    ) -> Option<Outcome> {
        info!(generation, job_id = %handle.job_id, "Polling training status");

        let ticking = cancel.child_token();
        let simulator = ProgressSimulator::new(self.config.tick_interval(), (self.increments)());
        let simulate = simulator.run(ticking.clone(), |increment| {
            self.update(generation, |s| {
                if let Some(progress) = s.progress.as_mut() {
                    progress.tick(increment);
                }
            })
        });

        let poll = async {
            let poller = StatusPoller::new(
                Arc::clone(&self.backend),
                handle.job_id.clone(),
                &self.config,
                cancel.clone(),
            );
            let mut statuses = Box::pin(poller.into_stream());
            let mut outcome = None;

            while let Some(item) = statuses.next().await {
                match item {
                    Ok(TrainingStatus::Pending) => {}
                    Ok(TrainingStatus::InProgress(reported)) => {
                        self.update(generation, |s| {
                            if let Some(progress) = s.progress.as_mut() {
                                progress.absorb(&reported);
                            }
                        });
                    }
                    Ok(TrainingStatus::Completed(status_raw)) => {
                        info!(generation, job_id = %handle.job_id, "Training completed");
                        outcome = Some(Outcome::Succeeded(normalize(submit_raw, Some(&status_raw))));
                    }
                    Ok(TrainingStatus::Failed(message)) => {
                        warn!(generation, job_id = %handle.job_id, %message, "Training failed");
                        outcome = Some(Outcome::FailedAfterStart(message));
                    }
                    Err(e) => {
                        outcome = Some(Outcome::FailedAfterStart(e.to_string()));
                    }
                }
            }

            // Terminal or cancelled: the simulator must stop before the outcome is published.
            ticking.cancel();
            outcome
        };

        let ((), outcome) = tokio::join!(simulate, poll);
        outcome
    }
}
