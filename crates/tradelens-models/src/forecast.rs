use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::classified_error::ClassifiedError;
use crate::config::ForecastConfig;

/// Holt-Winters smoothing constants. Defaults are conventional, not fit to data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SmoothingParams {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl Default for SmoothingParams {
    fn default() -> Self {
        Self {
            alpha: 0.3,
            beta: 0.1,
            gamma: 0.2,
        }
    }
}

/// Marks a payload as model output so it is never mistaken for fact data.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputTag {
    #[default]
    ModelOutput,
}

/// Message sent to the forecast worker. Everything is owned; nothing is shared.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastRequest {
    pub request_id: Uuid,
    /// Free-form label echoed back in the result (e.g., `IND:NY.GDP.MKTP.CD`).
    pub series_label: String,
    pub series: Vec<Option<f64>>,
    pub season_length: usize,
    pub horizon: usize,
    /// Held-out tail size for rolling-origin evaluation.
    pub test_size: usize,
    #[serde(default)]
    pub smoothing: SmoothingParams,
    /// Exogenous regressors, one row per observation in `series`.
    #[serde(default)]
    pub regressors: Option<Vec<Vec<f64>>>,
}

impl ForecastRequest {
    pub fn new(series_label: impl Into<String>, series: Vec<Option<f64>>) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            series_label: series_label.into(),
            series,
            season_length: 1,
            horizon: 5,
            test_size: 3,
            smoothing: SmoothingParams::default(),
            regressors: None,
        }
    }

    /// Take season, horizon, hold-out and smoothing from configuration.
    pub fn with_config(mut self, config: &ForecastConfig) -> Self {
        self.season_length = config.season_length;
        self.horizon = config.horizon;
        self.test_size = config.test_size;
        self.smoothing = config.smoothing;
        self
    }
}

/// OLS fit. `coefficients[0]` is the intercept.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RegressionResult {
    pub coefficients: Vec<f64>,
    pub fitted: Vec<f64>,
    pub residuals: Vec<f64>,
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
}

/// Rolling-origin accuracy. Metrics are `None` when the series was too short.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Diagnostics {
    pub rmse: Option<f64>,
    pub mape: Option<f64>,
    pub residuals: Vec<f64>,
    pub train_size: usize,
    pub test_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResult {
    pub tag: OutputTag,
    pub series_label: String,
    pub baseline_forecast: Vec<Option<f64>>,
    pub seasonal_trend_forecast: Vec<Option<f64>>,
    pub regression: Option<RegressionResult>,
    pub diagnostics: Diagnostics,
    /// False when Holt-Winters seasonal offsets were initialised from missing observations.
    pub seasonal_confident: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "status", content = "body", rename_all = "snake_case")]
pub enum ForecastOutcome {
    Completed(ForecastResult),
    Failed(ClassifiedError),
}

/// Message returned by the forecast worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ForecastResponse {
    pub request_id: Uuid,
    pub outcome: ForecastOutcome,
}

impl ForecastResponse {
    pub fn into_result(self) -> Result<ForecastResult, ClassifiedError> {
        match self.outcome {
            ForecastOutcome::Completed(result) => Ok(result),
            ForecastOutcome::Failed(error) => Err(error),
        }
    }
}
