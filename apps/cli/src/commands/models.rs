//! Trained model commands.

use super::render;
use agrisense_training::{AgrisenseConfig, HttpBackend};
use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Table};

pub async fn show(config: &AgrisenseConfig, id: &str, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let model = backend.get_model(id).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&model)?);
        return Ok(());
    }

    render::print_result(&model);
    println!();
    Ok(())
}

pub async fn list(config: &AgrisenseConfig, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let models = backend.list_models().await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&models)?);
        return Ok(());
    }

    println!();
    println!("{}", format!("Trained Models ({})", models.len()).bold().cyan());
    println!();

    if models.is_empty() {
        println!("  {}", "No trained models found.".dimmed());
        println!();
        println!("  {}", "Tip: upload a dataset with `agri upload`, then run `agri train`.".dimmed());
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Algorithm", "Accuracy", "F1 Score", "Created"]);
    for model in &models {
        table.add_row(vec![
            Cell::new(&model.job_name),
            Cell::new(&model.algorithm),
            Cell::new(render::percent(model.accuracy)),
            Cell::new(render::percent(model.f1_score)),
            Cell::new(model.created_at.format("%Y-%m-%d %H:%M").to_string()),
        ]);
    }
    println!("{table}");
    println!();
    Ok(())
}
