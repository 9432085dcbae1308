//! Training command implementation.

use super::render;
use agrisense_training::{
    AgrisenseConfig, HttpBackend, OrchestratorState, ProgressState, StageStatus, TrainingOrchestrator,
};
use anyhow::{Result, bail};
use colored::Colorize;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

pub async fn execute(
    config: &AgrisenseConfig,
    algorithm: &str,
    dataset: &str,
    json_output: bool,
) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let orchestrator = TrainingOrchestrator::new(backend, config.training.clone())?;

    let mut updates = orchestrator.subscribe();
    let ticket = orchestrator.start(algorithm, dataset);
    let bars = (!json_output).then(StageBars::new);

    let follow = async {
        while updates.changed().await.is_ok() {
            let state = updates.borrow_and_update().clone();
            if let Some(bars) = &bars {
                bars.render(&state);
            }
            if !state.loading {
                break;
            }
        }
    };

    tokio::select! {
        () = follow => {}
        _ = tokio::signal::ctrl_c() => orchestrator.cancel(),
    }

    let state = ticket.wait().await;
    if let Some(bars) = &bars {
        bars.finish(&state);
    }

    if let Some(error) = state.error {
        bail!(error);
    }
    let Some(result) = state.result else {
        bail!("Training cancelled");
    };

    if json_output {
        println!("{}", serde_json::to_string_pretty(&result)?);
        return Ok(());
    }

    println!();
    println!("{}", "Training complete".bold().green());
    if let Some(job_id) = &state.job_id {
        println!("  Job: {}", job_id.as_str().cyan());
    }
    render::print_result(&result);
    println!();
    Ok(())
}

/// One bar per stage plus an overall bar.
struct StageBars {
    _multi: MultiProgress,
    overall: ProgressBar,
    stages: Vec<ProgressBar>,
}

impl StageBars {
    fn new() -> Self {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{prefix:<24} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ");

        let initial = ProgressState::initial();
        let stages = initial
            .stages
            .iter()
            .map(|stage| {
                let bar = multi.add(ProgressBar::new(100));
                bar.set_style(style.clone());
                bar.set_prefix(stage.name.clone());
                bar
            })
            .collect();

        let overall = multi.add(ProgressBar::new(100));
        overall.set_style(style);
        overall.set_prefix("Overall".bold().to_string());

        Self { _multi: multi, overall, stages }
    }

    fn render(&self, state: &OrchestratorState) {
        let Some(progress) = &state.progress else {
            return;
        };
        for (bar, stage) in self.stages.iter().zip(&progress.stages) {
            bar.set_position(u64::from(stage.percent));
            bar.set_message(match stage.status {
                StageStatus::Completed => "done".green().to_string(),
                StageStatus::InProgress => "running".yellow().to_string(),
                StageStatus::Pending => String::new(),
            });
        }
        self.overall.set_position(u64::from(progress.overall_percent));
    }

    fn finish(&self, state: &OrchestratorState) {
        self.render(state);
        for bar in self.stages.iter().chain(std::iter::once(&self.overall)) {
            if state.result.is_some() {
                bar.finish();
            } else {
                bar.abandon();
            }
        }
    }
}
