use crate::error::{Result, TrainingError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Server-assigned identifier for a training job (the model name on the backend).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrainingJobId(pub String);

impl TrainingJobId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TrainingJobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingAlgorithm {
    RandomForest,
    #[serde(rename = "xgboost")]
    XGBoost,
}

impl TrainingAlgorithm {
    /// Name the backend expects in the `algorithm` field.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::RandomForest => "random_forest",
            Self::XGBoost => "xgboost",
        }
    }

    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::RandomForest => "Random Forest",
            Self::XGBoost => "XGBoost",
        }
    }
}

impl std::fmt::Display for TrainingAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.wire_name())
    }
}

impl FromStr for TrainingAlgorithm {
    type Err = TrainingError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '_' | '-' | ' '))
            .collect::<String>()
            .to_lowercase();

        match normalized.as_str() {
            "randomforest" | "rf" => Ok(Self::RandomForest),
            "xgboost" | "xgb" => Ok(Self::XGBoost),
            "" => Err(TrainingError::Validation(
                "Please select an algorithm before training.".to_string(),
            )),
            _ => Err(TrainingError::Validation(format!(
                "Unsupported algorithm '{}'. Expected random_forest or xgboost.",
                s.trim()
            ))),
        }
    }
}

/// Hyperparameters forwarded to the backend with every training request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingParams {
    pub random_state: u64,
    pub n_estimators: u32,
    pub test_size: f64,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self { random_state: 42, n_estimators: 100, test_size: 0.2 }
    }
}

impl TrainingParams {
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(TrainingError::Validation("n_estimators must be >= 1".to_string()));
        }
        if !self.test_size.is_finite() || self.test_size <= 0.0 || self.test_size >= 1.0 {
            return Err(TrainingError::Validation(
                "test_size must be between 0 and 1 (exclusive)".to_string(),
            ));
        }
        Ok(())
    }
}

/// A validated request to train a model on an uploaded dataset.
///
/// Fields are private so a request can only exist in its validated form.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRequest {
    dataset_id: String,
    algorithm: TrainingAlgorithm,
    params: TrainingParams,
}

impl TrainingRequest {
    pub fn new(dataset_id: impl Into<String>, algorithm: TrainingAlgorithm) -> Result<Self> {
        Self::with_params(dataset_id, algorithm, TrainingParams::default())
    }

    pub fn with_params(
        dataset_id: impl Into<String>,
        algorithm: TrainingAlgorithm,
        params: TrainingParams,
    ) -> Result<Self> {
        let dataset_id = dataset_id.into().trim().to_string();
        if dataset_id.is_empty() {
            return Err(TrainingError::Validation(
                "Please upload a dataset before training.".to_string(),
            ));
        }
        params.validate()?;
        Ok(Self { dataset_id, algorithm, params })
    }

    /// Parse loosely typed UI input (algorithm name + dataset id).
    pub fn parse(algorithm: &str, dataset_id: &str) -> Result<Self> {
        let algorithm = algorithm.parse::<TrainingAlgorithm>()?;
        Self::new(dataset_id, algorithm)
    }

    #[must_use]
    pub fn dataset_id(&self) -> &str {
        &self.dataset_id
    }

    #[must_use]
    pub fn algorithm(&self) -> TrainingAlgorithm {
        self.algorithm
    }

    #[must_use]
    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    #[must_use]
    pub fn to_body(&self) -> TrainRequestBody {
        TrainRequestBody {
            dataset_id: self.dataset_id.clone(),
            algorithm: self.algorithm.wire_name().to_string(),
            params: self.params.clone(),
        }
    }
}

/// JSON body of `POST /models/train/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainRequestBody {
    pub dataset_id: String,
    pub algorithm: String,
    pub params: TrainingParams,
}

/// Created once the backend accepts a job; owned by the poller afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainingJobHandle {
    pub job_id: TrainingJobId,
    pub started_at: DateTime<Utc>,
}

impl TrainingJobHandle {
    #[must_use]
    pub fn new(job_id: TrainingJobId) -> Self {
        Self { job_id, started_at: Utc::now() }
    }
}
