use tradelens_models::{
    ClassifiedError, ErrorKind, ForecastRequest, ForecastResult, OutputTag, RegressionResult,
};

use crate::evaluation::{mape, rmse, rolling_origin};
use crate::holt_winters::{fit_holt_winters, holt_winters};
use crate::regression::ols;
use crate::seasonal_naive::seasonal_naive;

/// Runs every model a [`ForecastRequest`] asks for. Stateless and deterministic.
pub struct ForecastEngine;

impl ForecastEngine {
    /// Baseline, Holt-Winters and, when regressors are supplied, an OLS fit.
    /// Diagnostics score Holt-Winters on the null-filtered series.
    ///
    /// Non-finite values are treated as missing. Regression failure fails
    /// the whole request with `SingularMatrixError`.
    pub fn run(request: &ForecastRequest) -> Result<ForecastResult, ClassifiedError> {
        let series: Vec<Option<f64>> = request
            .series
            .iter()
            .map(|v| v.filter(|x| x.is_finite()))
            .collect();
        let season = request.season_length.max(1);
        let params = request.smoothing;

        let baseline_forecast = seasonal_naive(&series, season, request.horizon);

        let (seasonal_trend_forecast, seasonal_confident) =
            match fit_holt_winters(&series, season, params) {
                Some(fit) => (
                    fit.forecast(request.horizon).into_iter().map(Some).collect(),
                    fit.seasonal_confident,
                ),
                None => (seasonal_naive(&series, season, request.horizon), true),
            };

        let regression = match &request.regressors {
            Some(regressors) => Some(regress(&series, regressors)?),
            None => None,
        };

        let clean: Vec<f64> = series.iter().flatten().copied().collect();
        let diagnostics = rolling_origin(&clean, request.test_size, |train, horizon| {
            holt_winters(train, season, horizon, params)
        });

        Ok(ForecastResult {
            tag: OutputTag::ModelOutput,
            series_label: request.series_label.clone(),
            baseline_forecast,
            seasonal_trend_forecast,
            regression,
            diagnostics,
            seasonal_confident,
        })
    }
}

/// OLS over the observations whose response is present.
fn regress(
    series: &[Option<f64>],
    regressors: &[Vec<f64>],
) -> Result<RegressionResult, ClassifiedError> {
    if regressors.len() != series.len() {
        return Err(singular(format!(
            "{} regressor rows for a series of {} observations",
            regressors.len(),
            series.len()
        )));
    }

    let (x, y): (Vec<Vec<f64>>, Vec<f64>) = series
        .iter()
        .zip(regressors)
        .filter_map(|(value, row)| value.map(|v| (row.clone(), v)))
        .unzip();

    let fit = ols(&x, &y).map_err(|e| singular(e.to_string()))?;
    let actual: Vec<Option<f64>> = y.iter().copied().map(Some).collect();
    let fitted: Vec<Option<f64>> = fit.fitted.iter().copied().map(Some).collect();

    Ok(RegressionResult {
        rmse: rmse(&actual, &fitted),
        mape: mape(&actual, &fitted),
        coefficients: fit.coefficients,
        fitted: fit.fitted,
        residuals: fit.residuals,
    })
}

fn singular(message: String) -> ClassifiedError {
    ClassifiedError::new(ErrorKind::SingularMatrixError, message)
}
