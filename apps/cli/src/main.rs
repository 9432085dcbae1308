//! AgriSense CLI - Command-line client for the AgriSense crop recommendation backend
//!
//! Provides an `agri` command for uploading soil datasets, training crop
//! models, inspecting trained models and requesting crop recommendations.

mod commands;
mod config;

use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use commands::{models, predict, predictions, status, train, upload};

/// AgriSense CLI - Train and query crop recommendation models
#[derive(Parser, Debug)]
#[command(
    name = "agri",
    author,
    version,
    about = "AgriSense - crop recommendation model training and prediction"
)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Backend API base URL (overrides AGRISENSE_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Bearer token for the backend (overrides AGRISENSE_TOKEN)
    #[arg(long, global = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Train a model on an uploaded dataset
    ///
    /// Submits the job, follows it until it finishes and prints the
    /// resulting metrics. Ctrl-C abandons the job.
    Train {
        /// Algorithm (random_forest, xgboost)
        #[arg(short, long)]
        algorithm: String,

        /// Dataset identifier returned by `agri upload`
        #[arg(short, long)]
        dataset: String,

        /// Output the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Upload a CSV dataset
    Upload {
        /// Path to the CSV file
        file: PathBuf,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the status of a training job
    Status {
        /// Job identifier
        job_id: String,

        /// Output the raw status response as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show a trained model
    Model {
        /// Model identifier
        id: String,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List trained models
    Models {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// List past crop recommendations, or show one by id
    Predictions {
        /// Prediction identifier
        id: Option<String>,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Recommend a crop for a soil sample
    Predict {
        /// Nitrogen content (N)
        #[arg(long)]
        nitrogen: f64,

        /// Phosphorus content (P)
        #[arg(long)]
        phosphorus: f64,

        /// Potassium content (K)
        #[arg(long)]
        potassium: f64,

        /// Temperature in degrees Celsius
        #[arg(long, allow_hyphen_values = true)]
        temperature: f64,

        /// Relative humidity in percent
        #[arg(long)]
        humidity: f64,

        /// Soil pH
        #[arg(long)]
        ph: f64,

        /// Rainfall in millimetres
        #[arg(long)]
        rainfall: f64,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = config::load_config(args.api_url.as_deref(), args.token.as_deref())?;

    // Initialize tracing
    let level = match args.log_level.as_deref().or(config.log_level.as_deref()).unwrap_or("warn") {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .without_time()
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    // If no command provided, show help
    let Some(command) = args.command else {
        Args::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Train { algorithm, dataset, json } => {
            train::execute(&config, &algorithm, &dataset, json).await?;
        }
        Command::Upload { file, json } => {
            upload::execute(&config, &file, json).await?;
        }
        Command::Status { job_id, json } => {
            status::execute(&config, &job_id, json).await?;
        }
        Command::Model { id, json } => {
            models::show(&config, &id, json).await?;
        }
        Command::Models { json } => {
            models::list(&config, json).await?;
        }
        Command::Predictions { id, json } => match id {
            Some(id) => predictions::show(&config, &id, json).await?,
            None => predictions::list(&config, json).await?,
        },
        Command::Predict {
            nitrogen,
            phosphorus,
            potassium,
            temperature,
            humidity,
            ph,
            rainfall,
            json,
        } => {
            let sample = agrisense_training::SoilSample {
                nitrogen,
                phosphorus,
                potassium,
                temperature,
                humidity,
                ph,
                rainfall,
            };
            predict::execute(&config, &sample, json).await?;
        }
    }

    Ok(())
}
