//! Shared terminal rendering for training results.

use agrisense_training::{ProgressState, StageStatus, TrainingResult};
use colored::Colorize;
use comfy_table::{Cell, Color as ComfyColor, Table};

/// Feature importances shown in the human-readable output.
const TOP_FEATURES: usize = 7;

/// Format a fraction in `[0, 1]` as `94.0%`.
pub fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

pub fn print_result(result: &TrainingResult) {
    println!();
    let title = if result.job_name.is_empty() { "Trained model".to_string() } else { result.job_name.clone() };
    println!("{}", title.bold().cyan());
    if !result.algorithm.is_empty() {
        println!("  Algorithm: {}", result.algorithm);
    }
    println!("  Created:   {}", result.created_at.format("%Y-%m-%d %H:%M UTC").to_string().dimmed());
    if let Some(path) = &result.model_path {
        println!("  Saved to:  {}", path.dimmed());
    }
    if let Some(message) = &result.message {
        println!("  {}", message.dimmed());
    }
    println!();

    let mut metrics = Table::new();
    metrics.set_header(vec!["Metric", "Value"]);
    for (name, value) in [
        ("Accuracy", result.accuracy),
        ("Precision", result.precision),
        ("Recall", result.recall),
        ("F1 Score", result.f1_score),
    ] {
        metrics.add_row(vec![Cell::new(name), Cell::new(percent(value)).fg(metric_color(value))]);
    }
    println!("{metrics}");

    if result.feature_importance.is_empty() {
        return;
    }

    let mut features = result.feature_importance.clone();
    features.sort_by(|a, b| b.importance.total_cmp(&a.importance));

    let mut table = Table::new();
    table.set_header(vec!["Feature", "Importance"]);
    for feature in features.iter().take(TOP_FEATURES) {
        table.add_row(vec![Cell::new(&feature.feature), Cell::new(percent(feature.importance))]);
    }
    println!();
    println!("{table}");
}

/// One line per stage, for non-interactive status output.
pub fn print_progress(progress: &ProgressState) {
    println!("  Overall: {}%", progress.overall_percent);
    for stage in &progress.stages {
        let marker = match stage.status {
            StageStatus::Completed => "✓".green(),
            StageStatus::InProgress => "●".yellow(),
            StageStatus::Pending => "○".dimmed(),
        };
        println!("  {} {:<24} {:>3}%", marker, stage.name, stage.percent);
    }
}

fn metric_color(value: f64) -> ComfyColor {
    match value {
        v if v >= 0.9 => ComfyColor::Green,
        v if v >= 0.7 => ComfyColor::Yellow,
        _ => ComfyColor::Red,
    }
}
