//! Synthetic five-stage progress timeline shown while a job runs server-side.
//!
//! The backend only reports coarse status, so the simulator advances the
//! stages on a timer with random increments. It is feedback only: it never
//! gates delivery of the real result, and a terminal status always forces
//! the timeline to 100%.

use crate::config::OrchestratorConfig;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

pub const STAGE_NAMES: [&str; 5] = [
    "Dataset Preprocessing",
    "Feature Selection",
    "Model Training",
    "Cross Validation",
    "Model Evaluation",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StageStatus {
    Pending,
    InProgress,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressStage {
    pub name: String,
    pub status: StageStatus,
    pub percent: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressState {
    pub overall_percent: u8,
    pub stages: Vec<ProgressStage>,
}

/// Coarse progress as reported by the status endpoint, keyed by stage name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ServerProgress {
    pub overall: Option<f64>,
    pub stages: Vec<(String, f64)>,
}

impl Default for ProgressState {
    fn default() -> Self {
        Self::initial()
    }
}

impl ProgressState {
    /// All five stages pending at 0%.
    #[must_use]
    pub fn initial() -> Self {
        Self {
            overall_percent: 0,
            stages: STAGE_NAMES
                .iter()
                .map(|name| ProgressStage {
                    name: (*name).to_string(),
                    status: StageStatus::Pending,
                    percent: 0,
                })
                .collect(),
        }
    }

    /// Index of the first stage that is not completed.
    #[must_use]
    pub fn cursor(&self) -> Option<usize> {
        self.stages.iter().position(|s| s.status != StageStatus::Completed)
    }

    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.overall_percent == 100 && self.cursor().is_none()
    }

    /// Mark the first stage in progress when polling begins.
    pub fn begin(&mut self) {
        if let Some(stage) = self.cursor().and_then(|i| self.stages.get_mut(i)) {
            if stage.status == StageStatus::Pending {
                stage.status = StageStatus::InProgress;
            }
        }
    }

    /// Advance the active stage by `increment` percent.
    pub fn tick(&mut self, increment: u8) {
        let Some(index) = self.cursor() else {
            return;
        };

        let stage = &mut self.stages[index];
        stage.status = StageStatus::InProgress;
        stage.percent = stage.percent.saturating_add(increment).min(100);

        if stage.percent == 100 {
            stage.status = StageStatus::Completed;
            if let Some(next) = self.stages.get_mut(index + 1) {
                next.status = StageStatus::InProgress;
            }
        }

        self.recompute_overall();
    }

    /// Fold server-reported progress in without ever moving backwards.
    ///
    /// Stages are matched by case-insensitive name; unknown names are ignored.
    pub fn absorb(&mut self, reported: &ServerProgress) {
        for (name, percent) in &reported.stages {
            let Some(index) = self.stages.iter().position(|s| s.name.eq_ignore_ascii_case(name.trim()))
            else {
                continue;
            };
            let target = clamp_percent(*percent);
            let stage = &mut self.stages[index];
            if stage.status == StageStatus::Completed || target <= stage.percent {
                continue;
            }
            stage.percent = target;
            stage.status =
                if target == 100 { StageStatus::Completed } else { StageStatus::InProgress };
        }

        // Stages before the furthest reported one are done.
        if let Some(furthest) = self.stages.iter().rposition(|s| s.percent > 0) {
            for stage in &mut self.stages[..furthest] {
                stage.percent = 100;
                stage.status = StageStatus::Completed;
            }
        }

        self.recompute_overall();

        if let Some(overall) = reported.overall {
            self.overall_percent = self.overall_percent.max(clamp_percent(overall));
        }

        // Keep the next stage visibly active.
        if let Some(next) = self.cursor().and_then(|i| self.stages.get_mut(i)) {
            if next.status == StageStatus::Pending && self.overall_percent > 0 {
                next.status = StageStatus::InProgress;
            }
        }
    }

    /// Force every stage to completed at 100%.
    pub fn complete(&mut self) {
        for stage in &mut self.stages {
            stage.status = StageStatus::Completed;
            stage.percent = 100;
        }
        self.overall_percent = 100;
    }

    #[must_use]
    pub fn completed() -> Self {
        let mut state = Self::initial();
        state.complete();
        state
    }

    fn recompute_overall(&mut self) {
        if self.stages.is_empty() {
            return;
        }
        let total: u32 = self
            .stages
            .iter()
            .map(|s| if s.status == StageStatus::Completed { 100 } else { u32::from(s.percent) })
            .sum();
        let computed = (total / self.stages.len() as u32) as u8;
        // Never below what was already shown.
        self.overall_percent = self.overall_percent.max(computed);
    }
}

fn clamp_percent(value: f64) -> u8 {
    if value.is_finite() {
        value.clamp(0.0, 100.0).floor() as u8
    } else {
        0
    }
}

/// Source of per-tick progress increments.
pub trait IncrementSource: Send {
    fn next_increment(&mut self) -> u8;
}

/// Uniform random increments in `[min, max)`.
#[derive(Debug)]
pub struct RandomIncrements {
    rng: StdRng,
    min: u8,
    max: u8,
}

impl RandomIncrements {
    #[must_use]
    pub fn new(min: u8, max: u8) -> Self {
        Self::with_rng(StdRng::from_entropy(), min, max)
    }

    #[must_use]
    pub fn seeded(seed: u64, min: u8, max: u8) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed), min, max)
    }

    fn with_rng(rng: StdRng, min: u8, max: u8) -> Self {
        // Keep the range non-empty.
        let min = min.min(u8::MAX - 1);
        let max = max.max(min + 1);
        Self { rng, min, max }
    }

    #[must_use]
    pub fn from_config(config: &OrchestratorConfig) -> Self {
        Self::new(config.min_increment, config.max_increment)
    }
}

impl IncrementSource for RandomIncrements {
    fn next_increment(&mut self) -> u8 {
        self.rng.gen_range(self.min..self.max)
    }
}

/// Replays a fixed sequence of increments, cycling when exhausted.
#[derive(Debug, Clone)]
pub struct ScriptedIncrements {
    values: Vec<u8>,
    position: usize,
}

impl ScriptedIncrements {
    #[must_use]
    pub fn new(values: Vec<u8>) -> Self {
        Self { values, position: 0 }
    }
}

impl IncrementSource for ScriptedIncrements {
    fn next_increment(&mut self) -> u8 {
        if self.values.is_empty() {
            return 0;
        }
        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        value
    }
}

const MIN_TICK: Duration = Duration::from_millis(1);

/// Drives [`ProgressState::tick`] on a fixed cadence.
pub struct ProgressSimulator {
    interval: Duration,
    increments: Box<dyn IncrementSource>,
}

impl ProgressSimulator {
    #[must_use]
    pub fn new(interval: Duration, increments: Box<dyn IncrementSource>) -> Self {
        Self { interval, increments }
    }

    /// Tick until `cancel` fires or `apply` reports that the job it feeds is stale.
    ///
    /// `apply` receives the increment for one tick and returns `false` once the
    /// tick could not be applied (superseded job); the simulator stops then.
    pub async fn run<F>(mut self, cancel: CancellationToken, mut apply: F)
    where
        F: FnMut(u8) -> bool + Send,
    {
        let mut ticker = tokio::time::interval(self.interval.max(MIN_TICK));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        // The first tick of a tokio interval completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if cancel.is_cancelled() {
                        break;
                    }
                    let increment = self.increments.next_increment();
                    if !apply(increment) {
                        break;
                    }
                }
            }
        }
    }
}
