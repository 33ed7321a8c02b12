//! Per-split and aggregated evaluation records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use crate::point::HyperparameterPoint;

/// JSON has no NaN, so `serde_json` writes non-finite scores as `null`.
/// Reading them back as NaN keeps a store holding such a score resumable.
fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Outcome of fitting and scoring one point on one split.
///
/// Times are in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitResult {
    pub split_id: usize,
    pub parameters: HyperparameterPoint,
    /// Sign-normalized test score: greater is always better.
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score_gib: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub train_score: f64,
    pub num_samples: usize,
    #[serde(deserialize_with = "nan_from_null")]
    pub fit_time: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub score_time: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub time: f64,
    pub done_at: DateTime<Utc>,
    /// Iteration chosen by internal early stopping, when the method has one.
    #[serde(default)]
    pub best_iteration: Option<u32>,
}

impl SplitResult {
    /// Whether this record is keyed by `(split_id, point)`.
    pub fn matches(&self, split_id: usize, point: &HyperparameterPoint) -> bool {
        self.split_id == split_id && &self.parameters == point
    }
}

/// Summary of one point over all of its splits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregatedResult {
    pub parameters: HyperparameterPoint,
    pub finished_at: DateTime<Utc>,
    /// Same as `test_score_mean`; kept for consumers reading the scores file.
    #[serde(deserialize_with = "nan_from_null")]
    pub score: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score_gib_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score_gib_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub test_score_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub train_score_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub train_score_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub time: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub fit_time_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub fit_time_std: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub score_time_mean: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub score_time_std: f64,
    #[serde(default, rename = "best_iteration")]
    pub best_iteration: Option<u32>,
}

/// Value of a fully evaluated point: the aggregate plus the records it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct PointResult {
    pub aggregated: AggregatedResult,
    pub per_split: Vec<SplitResult>,
}
