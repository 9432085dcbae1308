//! Status command: a single status check for a training job.

use super::render;
use agrisense_training::{
    AgrisenseConfig, HttpBackend, ProgressState, TrainingBackend, TrainingJobId, TrainingStatus,
    classify_status, normalize,
};
use anyhow::Result;
use colored::Colorize;

pub async fn execute(config: &AgrisenseConfig, job_id: &str, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let job_id = TrainingJobId(job_id.to_string());
    let raw = backend.training_status(&job_id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&raw)?);
        return Ok(());
    }

    println!();
    println!("{} {}", "Job".bold(), job_id.as_str().cyan());
    match classify_status(&raw) {
        TrainingStatus::Pending => {
            println!("  Status: {}", "pending".yellow());
        }
        TrainingStatus::InProgress(reported) => {
            println!("  Status: {}", "in progress".yellow());
            let mut progress = ProgressState::initial();
            progress.absorb(&reported);
            render::print_progress(&progress);
        }
        TrainingStatus::Completed(body) => {
            println!("  Status: {}", "completed".green());
            render::print_result(&normalize(&body, None));
        }
        TrainingStatus::Failed(message) => {
            println!("  Status: {}", "failed".red());
            println!("  {}", message.red());
        }
    }
    println!();
    Ok(())
}
