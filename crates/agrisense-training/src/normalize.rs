//! Reconciles the backend's inconsistent response shapes into one [`TrainingResult`].
//!
//! The synchronous training response nests metrics two levels deep
//! (`metrics.metrics.accuracy`) while the status endpoint reports them one
//! level deep (`metrics.accuracy`), and the model detail endpoint may send
//! them as strings under camelCase keys. Every field is looked up in each shape,
//! the status response wins over the submit response, and anything missing
//! falls back to a default. Normalization never fails.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    /// Relative importance in `[0, 1]`.
    pub importance: f64,
}

/// Canonical outcome of a finished training job.
///
/// Rate-like metrics are raw fractions in `[0, 1]`; turning them into
/// percentages is left to the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingResult {
    pub job_name: String,
    pub algorithm: String,
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub feature_importance: Vec<FeatureImportance>,
    pub created_at: DateTime<Utc>,
    pub model_path: Option<String>,
    pub message: Option<String>,
}

const NAME: &[&[&str]] = &[&["name"], &["job_name"], &["id"]];
const ALGORITHM: &[&[&str]] = &[&["algorithm"]];
const CREATED_AT: &[&[&str]] = &[&["created_at"], &["createdAt"]];
const MODEL_PATH: &[&[&str]] = &[&["model_path"], &["metrics", "model_path"]];
const MESSAGE: &[&[&str]] = &[&["message"], &["metrics", "message"]];

/// Normalize using the current wall clock as the `created_at` fallback.
#[must_use]
pub fn normalize(submit_raw: &Value, status_raw: Option<&Value>) -> TrainingResult {
    normalize_at(submit_raw, status_raw, Utc::now())
}

#[must_use]
pub fn normalize_at(
    submit_raw: &Value,
    status_raw: Option<&Value>,
    now: DateTime<Utc>,
) -> TrainingResult {
    // Most recent source first.
    let sources: Vec<&Value> = status_raw.into_iter().chain(std::iter::once(submit_raw)).collect();

    TrainingResult {
        job_name: first(&sources, NAME, as_text).unwrap_or_default(),
        algorithm: first(&sources, ALGORITHM, as_text).unwrap_or_default(),
        accuracy: metric(&sources, &["accuracy"]),
        precision: metric(&sources, &["precision"]),
        recall: metric(&sources, &["recall"]),
        f1_score: metric(&sources, &["f1_score", "f1Score"]),
        feature_importance: first(&sources, &metric_paths("feature_importance"), as_importances)
            .unwrap_or_default(),
        created_at: first(&sources, CREATED_AT, as_timestamp).unwrap_or(now),
        model_path: first(&sources, MODEL_PATH, as_text).filter(|s| !s.is_empty()),
        message: first(&sources, MESSAGE, as_text).filter(|s| !s.is_empty()),
    }
}

/// Candidate locations of a metric field, nested shape first.
fn metric_paths(field: &str) -> [Vec<&str>; 3] {
    [vec!["metrics", "metrics", field], vec!["metrics", field], vec![field]]
}

fn metric(sources: &[&Value], aliases: &[&str]) -> f64 {
    for source in sources {
        for alias in aliases {
            if let Some(v) = first_at_paths(source, &metric_paths(alias), as_number) {
                return v;
            }
        }
    }
    0.0
}

fn first<T, P, S>(sources: &[&Value], paths: &[P], convert: fn(&Value) -> Option<T>) -> Option<T>
where
    P: AsRef<[S]>,
    S: AsRef<str>,
{
    sources.iter().find_map(|source| first_at_paths(source, paths, convert))
}

fn first_at_paths<T, P, S>(source: &Value, paths: &[P], convert: fn(&Value) -> Option<T>) -> Option<T>
where
    P: AsRef<[S]>,
    S: AsRef<str>,
{
    paths
        .iter()
        .filter_map(|path| lookup(source, path.as_ref()))
        .find_map(convert)
}

/// Walk `path` through nested objects, treating any missing or null hop as absent.
pub(crate) fn lookup<'a, S: AsRef<str>>(source: &'a Value, path: &[S]) -> Option<&'a Value> {
    let mut current = source;
    for key in path {
        current = current.as_object()?.get(key.as_ref())?;
    }
    (!current.is_null()).then_some(current)
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub(crate) fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn as_importances(value: &Value) -> Option<Vec<FeatureImportance>> {
    match value {
        Value::Array(items) => Some(
            items
                .iter()
                .filter_map(|item| {
                    let feature = item.get("feature").and_then(as_text)?;
                    let importance = item.get("importance").and_then(as_number)?;
                    Some(FeatureImportance { feature, importance: importance.clamp(0.0, 1.0) })
                })
                .collect(),
        ),
        // {"nitrogen": 0.25, ...}
        Value::Object(map) => Some(
            map.iter()
                .filter_map(|(feature, v)| {
                    as_number(v).map(|importance| FeatureImportance {
                        feature: feature.clone(),
                        importance: importance.clamp(0.0, 1.0),
                    })
                })
                .collect(),
        ),
        _ => None,
    }
}

fn as_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }
            ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                .map(|naive| naive.and_utc())
        }
        Value::Number(n) => {
            let secs = n.as_f64()?;
            if !secs.is_finite() || secs < 0.0 {
                return None;
            }
            let whole = secs.trunc() as i64;
            let nanos = ((secs - secs.trunc()) * 1e9) as u32;
            Utc.timestamp_opt(whole, nanos).single()
        }
        _ => None,
    }
}
