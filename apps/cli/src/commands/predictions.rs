//! Prediction history commands.

use super::render;
use agrisense_training::{AgrisenseConfig, HttpBackend};
use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Table};

pub async fn show(config: &AgrisenseConfig, id: &str, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let record = backend.get_prediction(id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&record)?);
        return Ok(());
    }

    println!();
    println!(
        "{} {} ({} confidence)",
        "Recommended crop:".bold(),
        record.crop.green().bold(),
        render::percent(record.confidence)
    );
    if let Some(created_at) = &record.created_at {
        println!("  Created: {}", created_at.dimmed());
    }

    if !record.alternative_crops.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Alternative", "Match"]);
        for alternative in &record.alternative_crops {
            table.add_row(vec![
                Cell::new(&alternative.name),
                Cell::new(render::percent(alternative.match_score)),
            ]);
        }
        println!();
        println!("{table}");
    }
    println!();
    Ok(())
}

pub async fn list(config: &AgrisenseConfig, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let history = backend.prediction_history().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&history)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Predictions ({})", history.len()).bold().cyan());
    println!();

    if history.is_empty() {
        println!("  {}", "No predictions yet.".dimmed());
        println!();
        println!("  {}", "Tip: request one with `agri predict`.".dimmed());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Crop", "Confidence", "Date"]);
    for record in &history {
        table.add_row(vec![
            Cell::new(record.id.as_deref().unwrap_or("-")),
            Cell::new(&record.crop),
            Cell::new(render::percent(record.confidence)),
            Cell::new(record.created_at.as_deref().unwrap_or("-")),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
