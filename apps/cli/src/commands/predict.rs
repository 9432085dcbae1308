//! Crop recommendation command.

use super::render;
use agrisense_training::{AgrisenseConfig, HttpBackend, SoilSample};
use anyhow::Result;
use colored::Colorize;
use comfy_table::{Cell, Table};

pub async fn execute(config: &AgrisenseConfig, sample: &SoilSample, json_output: bool) -> Result<()> {
    // Reject bad readings before building a client.
    sample.validate()?;

    let backend = HttpBackend::new(&config.api)?;
    let prediction = backend.predict(sample).await?;

    if json_output {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!();
    println!(
        "{} {} ({} confidence)",
        "Recommended crop:".bold(),
        prediction.top_crop.crop.green().bold(),
        render::percent(prediction.top_crop.confidence)
    );

    if !prediction.alternative_crops.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Alternative", "Match"]);
        for alternative in &prediction.alternative_crops {
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
