//! Dataset upload command.

use agrisense_training::{AgrisenseConfig, HttpBackend};
use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;

pub async fn execute(config: &AgrisenseConfig, file: &Path, json_output: bool) -> Result<()> {
    let backend = HttpBackend::new(&config.api)?;
    let upload = backend
        .upload_dataset(file)
        .await
        .with_context(|| format!("Failed to upload {}", file.display()))?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&upload)?);
        return Ok(());
    }

    println!();
    println!("{}", "Dataset uploaded".bold().green());
    println!("  ID:      {}", upload.dataset_id.cyan());
    if !upload.name.is_empty() {
        println!("  Name:    {}", upload.name);
    }
    println!("  Rows:    {}", upload.row_count);
    if !upload.columns.is_empty() {
        println!("  Columns: {}", upload.columns.join(", ").dimmed());
    }
    println!();
    println!(
        "  {}",
        format!("Next: agri train --dataset {} --algorithm random_forest", upload.dataset_id).dimmed()
    );
    println!();
    Ok(())
}
