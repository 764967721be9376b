//! Forecasting over cleaned annual series. Every output is model output,
//! tagged as such, and never written back as fact data.

pub mod engine;
pub mod evaluation;
pub mod holt_winters;
pub mod regression;
pub mod seasonal_naive;
pub mod worker;

pub use engine::ForecastEngine;
pub use evaluation::{mape, rmse, rolling_origin};
pub use holt_winters::{fit_holt_winters, holt_winters, HoltWintersFit};
pub use regression::{ols, OlsFit, RegressionError};
pub use seasonal_naive::seasonal_naive;
pub use worker::{ForecastReceiver, ForecastSender, ForecastWorker, WorkerError};
