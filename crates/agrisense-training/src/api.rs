//! HTTP client for the AgriSense backend.

use crate::backend::TrainingBackend;
use crate::config::ApiConfig;
use crate::error::{Result, TrainingError};
use crate::job::{TrainRequestBody, TrainingJobId};
use crate::normalize::{as_number, lookup, normalize, TrainingResult};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Url};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use tracing::{debug, error, info};

/// Response of `POST /datasets/upload/`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetUpload {
    #[serde(alias = "id", deserialize_with = "string_or_number")]
    pub dataset_id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub row_count: u64,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Soil and weather readings for a crop recommendation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SoilSample {
    #[serde(rename = "N")]
    pub nitrogen: f64,
    #[serde(rename = "P")]
    pub phosphorus: f64,
    #[serde(rename = "K")]
    pub potassium: f64,
    /// Degrees Celsius.
    pub temperature: f64,
    /// Relative humidity, percent.
    pub humidity: f64,
    #[serde(rename = "pH")]
    pub ph: f64,
    /// Millimetres.
    pub rainfall: f64,
}

impl SoilSample {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("N", self.nitrogen),
            ("P", self.phosphorus),
            ("K", self.potassium),
            ("temperature", self.temperature),
            ("humidity", self.humidity),
            ("pH", self.ph),
            ("rainfall", self.rainfall),
        ];
        if let Some((name, _)) = fields.iter().find(|(_, v)| !v.is_finite()) {
            return Err(TrainingError::Validation(format!("{name} must be a number")));
        }
        for (name, value) in [("N", self.nitrogen), ("P", self.phosphorus), ("K", self.potassium), ("rainfall", self.rainfall)] {
            if value < 0.0 {
                return Err(TrainingError::Validation(format!("{name} cannot be negative")));
            }
        }
        if !(0.0..=100.0).contains(&self.humidity) {
            return Err(TrainingError::Validation("humidity must be between 0 and 100".to_string()));
        }
        if !(0.0..=14.0).contains(&self.ph) {
            return Err(TrainingError::Validation("pH must be between 0 and 14".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TopCrop {
    pub crop: String,
    pub confidence: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlternativeCrop {
    pub name: String,
    #[serde(rename = "match")]
    pub match_score: f64,
}

/// Response of `POST /predictions/`. Unrecognized fields are kept in `extra`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CropPrediction {
    pub top_crop: TopCrop,
    #[serde(default)]
    pub alternative_crops: Vec<AlternativeCrop>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A stored prediction, as returned by `GET /predictions/` and `GET /predictions/{id}/`.
///
/// Records come either in the full prediction shape (`top_crop`) or the
/// compact history shape (`crop`, `confidence`, `date`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub id: Option<String>,
    pub crop: String,
    pub confidence: f64,
    pub created_at: Option<String>,
    pub alternative_crops: Vec<AlternativeCrop>,
}

impl PredictionRecord {
    /// Read one record; `None` when no crop can be found.
    pub fn from_value(value: &Value) -> Option<Self> {
        let text = |paths: &[&[&str]]| {
            paths.iter().find_map(|path| match lookup(value, *path)? {
                Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
        };

        let crop = text(&[
            &["top_crop", "crop"][..],
            &["results", "top_crop", "crop"][..],
            &["crop"][..],
            &["prediction"][..],
        ])?;
        let confidence = [
            &["top_crop", "confidence"][..],
            &["results", "top_crop", "confidence"][..],
            &["confidence"][..],
        ]
        .iter()
        .find_map(|path| lookup(value, *path).and_then(as_number))
        .unwrap_or_default();
        let alternative_crops = [&["alternative_crops"][..], &["results", "alternative_crops"][..]]
            .iter()
            .find_map(|path| lookup(value, *path))
            .and_then(|alternatives| serde_json::from_value(alternatives.clone()).ok())
            .unwrap_or_default();

        Some(Self {
            id: text(&[&["id"][..], &["prediction_id"][..]]),
            crop,
            confidence,
            created_at: text(&[&["created_at"][..], &["date"][..]]),
            alternative_crops,
        })
    }
}

fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("expected string or number, got {other}"))),
    }
}

/// reqwest-backed [`TrainingBackend`] plus the rest of the backend's endpoints.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(config: &ApiConfig) -> Result<Self> {
        config.validate()?;
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| TrainingError::Config(format!("failed to build HTTP client: {e}")))?;

        let raw = config.base_url.trim();
        let base_url = Url::parse(raw)
            .map_err(|e| TrainingError::Config(format!("invalid api.base_url '{raw}': {e}")))?;

        Ok(Self {
            client,
            base_url,
            token: config.token.clone().filter(|t| !t.trim().is_empty()),
        })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// `{base_url}/{segments..}/`, each segment percent-encoded.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // http(s) URLs always carry a path.
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments).push("");
        }
        url
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Send a request and decode its JSON body, mapping `{"error": ..}` bodies to backend errors.
    async fn send_json(&self, request: RequestBuilder, endpoint: &str) -> Result<Value> {
        let response = self.authorize(request).send().await.map_err(|e| {
            error!(error = %e, base_url = %self.base_url, endpoint, "Backend request failed");
            TrainingError::from(e)
        })?;

        let status = response.status();
        let text = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&text)
                .ok()
                .and_then(|body| {
                    ["error", "detail", "message"]
                        .iter()
                        .find_map(|key| body.get(*key).and_then(Value::as_str).map(str::to_string))
                })
                .unwrap_or_else(|| format!("{endpoint} failed with status {status}"));
            error!(status = %status, endpoint, error = %message, "Backend returned error status");
            return Err(TrainingError::Backend(message));
        }

        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    /// Upload a CSV dataset for later training.
    pub async fn upload_dataset(&self, path: &Path) -> Result<DatasetUpload> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if !is_csv {
            return Err(TrainingError::Validation("Please upload a CSV file.".to_string()));
        }

        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map_or_else(|| "dataset.csv".to_string(), |n| n.to_string_lossy().into_owned());
        info!(file = %file_name, size = bytes.len(), "Uploading dataset");

        let part = reqwest::multipart::Part::bytes(bytes).file_name(file_name).mime_str("text/csv")?;
        let form = reqwest::multipart::Form::new().part("dataset", part);

        let body = self
            .send_json(self.client.post(self.url(&["datasets", "upload"])).multipart(form), "upload")
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Details of a trained model, normalized like a training result.
    pub async fn get_model(&self, model_id: &str) -> Result<TrainingResult> {
        let body = self
            .send_json(self.client.get(self.url(&["models", model_id])), "model")
            .await?;
        Ok(normalize(&body, None))
    }

    pub async fn list_models(&self) -> Result<Vec<TrainingResult>> {
        let body = self.send_json(self.client.get(self.url(&["models"])), "models").await?;
        let entries = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("models") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        debug!(count = entries.len(), "Listed models");
        Ok(entries.iter().map(|entry| normalize(entry, None)).collect())
    }

    /// Past predictions, newest first as the backend orders them.
    pub async fn prediction_history(&self) -> Result<Vec<PredictionRecord>> {
        let body = self.send_json(self.client.get(self.url(&["predictions"])), "predictions").await?;
        let entries = match body {
            Value::Array(items) => items,
            Value::Object(mut map) => match map.remove("predictions") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            _ => Vec::new(),
        };
        debug!(count = entries.len(), "Listed predictions");
        Ok(entries.iter().filter_map(PredictionRecord::from_value).collect())
    }

    pub async fn get_prediction(&self, id: &str) -> Result<PredictionRecord> {
        let body = self
            .send_json(self.client.get(self.url(&["predictions", id])), "prediction")
            .await?;
        PredictionRecord::from_value(&body)
            .ok_or_else(|| TrainingError::Backend(format!("prediction {id} has no crop")))
    }

    pub async fn predict(&self, sample: &SoilSample) -> Result<CropPrediction> {
        sample.validate()?;
        let body = self
            .send_json(self.client.post(self.url(&["predictions"])).json(sample), "prediction")
            .await?;
        Ok(serde_json::from_value(body)?)
    }
}

#[async_trait]
impl TrainingBackend for HttpBackend {
    async fn start_training(&self, body: &TrainRequestBody) -> Result<Value> {
        debug!(dataset_id = %body.dataset_id, algorithm = %body.algorithm, "Submitting training request");
        self.send_json(self.client.post(self.url(&["models", "train"])).json(body), "train")
            .await
    }

    async fn training_status(&self, job_id: &TrainingJobId) -> Result<Value> {
        self.send_json(self.client.get(self.url(&["models", job_id.as_str(), "status"])), "status")
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{TrainingAlgorithm, TrainingRequest};
    use mockito::Matcher;
    use serde_json::json;

    fn backend(server: &mockito::Server, token: Option<&str>) -> HttpBackend {
        let config = ApiConfig {
            token: token.map(str::to_string),
            ..ApiConfig::with_base_url(format!("{}/api/", server.url()))
        };
        HttpBackend::new(&config).unwrap()
    }

    fn sample() -> SoilSample {
        SoilSample {
            nitrogen: 90.0,
            phosphorus: 42.0,
            potassium: 43.0,
            temperature: 20.9,
            humidity: 82.0,
            ph: 6.5,
            rainfall: 202.9,
        }
    }

    #[tokio::test]
    async fn test_start_training_posts_body_with_bearer_token() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/models/train/")
            .match_header("authorization", "Bearer secret")
            .match_body(Matcher::PartialJson(json!({
                "dataset_id": "ds-123",
                "algorithm": "xgboost",
                "params": {"random_state": 42, "n_estimators": 100}
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"name": "xgboost_ds-123"}"#)
            .create_async()
            .await;

        let request = TrainingRequest::new("ds-123", TrainingAlgorithm::XGBoost).unwrap();
        let body = backend(&server, Some("secret")).start_training(&request.to_body()).await.unwrap();

        assert_eq!(body["name"], "xgboost_ds-123");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_error_body_becomes_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/models/missing/status/")
            .with_status(404)
            .with_body(r#"{"error": "Model not found"}"#)
            .create_async()
            .await;

        let err = backend(&server, None)
            .training_status(&TrainingJobId("missing".to_string()))
            .await
            .unwrap_err();
        assert!(matches!(&err, TrainingError::Backend(m) if m == "Model not found"));
    }

    #[tokio::test]
    async fn test_error_without_json_body_reports_status() {
        let mut server = mockito::Server::new_async().await;
        server.mock("GET", "/api/models/").with_status(502).with_body("Bad Gateway").create_async().await;

        let err = backend(&server, None).list_models().await.unwrap_err();
        assert!(err.to_string().contains("502"), "{err}");
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_error() {
        let backend = HttpBackend::new(&ApiConfig::with_base_url("http://127.0.0.1:9/api")).unwrap();
        let err = backend.training_status(&TrainingJobId("x".to_string())).await.unwrap_err();
        assert!(matches!(err, TrainingError::Transport(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_get_model_normalizes_string_metrics() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/models/random_forest_ds-1/")
            .with_status(200)
            .with_body(
                json!({
                    "id": "random_forest_ds-1",
                    "status": "completed",
                    "algorithm": "random",
                    "created_at": 1_700_000_000.0,
                    "metrics": {"accuracy": "0.91", "precision": "0.90", "recall": "0.89", "f1Score": "0.895"},
                    "feature_importance": [{"feature": "humidity", "importance": 0.3}]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let model = backend(&server, None).get_model("random_forest_ds-1").await.unwrap();
        assert_eq!(model.job_name, "random_forest_ds-1");
        assert!((model.accuracy - 0.91).abs() < 1e-9);
        assert!((model.f1_score - 0.895).abs() < 1e-9);
        assert_eq!(model.created_at.timestamp(), 1_700_000_000);
        assert_eq!(model.feature_importance[0].feature, "humidity");
    }

    #[tokio::test]
    async fn test_list_models_accepts_both_shapes() {
        let mut server = mockito::Server::new_async().await;
        let entry = json!({"id": "m1", "algorithm": "xgboost", "metrics": {"accuracy": 0.8}});

        let wrapped = server
            .mock("GET", "/api/models/")
            .with_status(200)
            .with_body(json!({"models": [entry.clone()]}).to_string())
            .expect(1)
            .create_async()
            .await;
        let models = backend(&server, None).list_models().await.unwrap();
        assert_eq!(models.len(), 1);
        assert_eq!(models[0].algorithm, "xgboost");
        wrapped.assert_async().await;
        wrapped.remove_async().await;

        server
            .mock("GET", "/api/models/")
            .with_status(200)
            .with_body(json!([entry.clone(), entry]).to_string())
            .create_async()
            .await;
        assert_eq!(backend(&server, None).list_models().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_upload_dataset_sends_multipart_csv() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/datasets/upload/")
            .match_header("content-type", Matcher::Regex("multipart/form-data".to_string()))
            .match_body(Matcher::Regex(r#"name="dataset"; filename="soil.csv""#.to_string()))
            .with_status(201)
            .with_body(
                json!({"dataset_id": 7, "name": "soil.csv", "columns": ["N", "P", "K"], "row_count": 2})
                    .to_string(),
            )
            .create_async()
            .await;

        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("soil.csv");
        std::fs::write(&path, "N,P,K\n90,42,43\n85,58,41\n").unwrap();

        let upload = backend(&server, None).upload_dataset(&path).await.unwrap();
        assert_eq!(upload.dataset_id, "7");
        assert_eq!(upload.columns, vec!["N", "P", "K"]);
        assert_eq!(upload.row_count, 2);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_upload_rejects_non_csv_without_request() {
        let server = mockito::Server::new_async().await;
        let err = backend(&server, None).upload_dataset(Path::new("data.xlsx")).await.unwrap_err();
        assert!(matches!(err, TrainingError::Validation(_)));
    }

    #[tokio::test]
    async fn test_predict_uses_wire_field_names() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/predictions/")
            .match_body(Matcher::PartialJson(json!({"N": 90.0, "P": 42.0, "K": 43.0, "pH": 6.5})))
            .with_status(200)
            .with_body(
                json!({
                    "top_crop": {"crop": "rice", "confidence": 0.87},
                    "alternative_crops": [{"name": "jute", "match": 0.08}],
                    "prediction_id": 12
                })
                .to_string(),
            )
            .create_async()
            .await;

        let prediction = backend(&server, None).predict(&sample()).await.unwrap();
        assert_eq!(prediction.top_crop.crop, "rice");
        assert_eq!(prediction.alternative_crops[0].name, "jute");
        assert_eq!(prediction.extra["prediction_id"], 12);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_prediction_history_reads_compact_records() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/predictions/")
            .with_status(200)
            .with_body(
                json!({"predictions": [
                    {"id": 1, "crop": "Wheat", "confidence": 0.92, "date": "2024-03-25"},
                    {"id": 2, "top_crop": {"crop": "rice", "confidence": "0.81"}, "created_at": "2024-03-26T08:00:00Z"},
                    {"id": 3, "confidence": 0.5}
                ]})
                .to_string(),
            )
            .create_async()
            .await;

        let history = backend(&server, None).prediction_history().await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id.as_deref(), Some("1"));
        assert_eq!(history[0].crop, "Wheat");
        assert_eq!(history[0].created_at.as_deref(), Some("2024-03-25"));
        assert_eq!(history[1].crop, "rice");
        assert!((history[1].confidence - 0.81).abs() < 1e-9);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_prediction_history_accepts_bare_array() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/predictions/")
            .with_status(200)
            .with_body(json!([{"id": "p-9", "crop": "maize", "confidence": 0.7}]).to_string())
            .create_async()
            .await;

        let history = backend(&server, None).prediction_history().await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].id.as_deref(), Some("p-9"));
    }

    #[tokio::test]
    async fn test_get_prediction_reads_full_record() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/predictions/12/")
            .with_status(200)
            .with_body(
                json!({
                    "id": 12,
                    "top_crop": {"crop": "rice", "confidence": 0.87},
                    "alternative_crops": [{"name": "jute", "match": 0.08}],
                    "created_at": "2024-03-25T10:00:00Z"
                })
                .to_string(),
            )
            .create_async()
            .await;

        let record = backend(&server, None).get_prediction("12").await.unwrap();
        assert_eq!(record.crop, "rice");
        assert!((record.confidence - 0.87).abs() < 1e-9);
        assert_eq!(record.alternative_crops[0].name, "jute");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_get_prediction_without_crop_is_backend_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/predictions/5/")
            .with_status(200)
            .with_body(json!({"id": 5}).to_string())
            .create_async()
            .await;

        let err = backend(&server, None).get_prediction("5").await.unwrap_err();
        assert!(matches!(err, TrainingError::Backend(_)), "{err}");
    }

    #[tokio::test]
    async fn test_ids_are_encoded_as_single_path_segments() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/models/a%2Fb%3Fc%20d/status/")
            .with_status(200)
            .with_body(json!({"status": "pending"}).to_string())
            .create_async()
            .await;

        let job_id = TrainingJobId("a/b?c d".to_string());
        backend(&server, None).training_status(&job_id).await.unwrap();
        mock.assert_async().await;
    }

    #[test]
    fn test_invalid_base_url_is_config_error() {
        let err = HttpBackend::new(&ApiConfig::with_base_url("not a url")).unwrap_err();
        assert!(matches!(err, TrainingError::Config(_)), "{err}");
        let err = HttpBackend::new(&ApiConfig::with_base_url("http://")).unwrap_err();
        assert!(matches!(err, TrainingError::Config(_)), "{err}");
    }

    #[test]
    fn test_soil_sample_validation() {
        assert!(sample().validate().is_ok());
        assert!(SoilSample { humidity: 120.0, ..sample() }.validate().is_err());
        assert!(SoilSample { ph: 15.0, ..sample() }.validate().is_err());
        assert!(SoilSample { nitrogen: -1.0, ..sample() }.validate().is_err());
        assert!(SoilSample { rainfall: f64::NAN, ..sample() }.validate().is_err());
    }
}
