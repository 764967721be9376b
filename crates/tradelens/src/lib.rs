//! TradeLens - trade and macro data acquisition with model forecasts
//!
//! Pulls bilateral trade and macroeconomic series from public statistical
//! APIs, reconciles them into canonical records, and forecasts each series
//! on an isolated worker.
//!
//! # Library Usage
//!
//! ```rust,no_run
//! use tradelens::loader::{LoaderConfig, Pipeline, SourceJob};
//! use tradelens::forecast::{ForecastEngine, ForecastWorker};
//! use tradelens::models::{MacroFact, TradeFact, ForecastRequest};
//! ```

pub use tradelens_cache as cache;
pub use tradelens_forecast as forecast;
pub use tradelens_loader as loader;
pub use tradelens_models as models;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tradelens_cache::CacheStore;
use tradelens_forecast::ForecastWorker;
use tradelens_loader::{
    Daemon, HttpClient, LoaderConfig, Pipeline, RefreshReport, RequestExecutor, ReqwestHttpClient,
};
use tradelens_models::{ForecastConfig, ForecastRequest, ForecastResponse};

/// Wired-up acquisition stack.
pub struct TradeLens {
    config: LoaderConfig,
    cache: Arc<CacheStore>,
    pipeline: Arc<Pipeline>,
}

impl TradeLens {
    /// Build with the reqwest transport.
    pub fn from_config(config: LoaderConfig) -> Result<Self, anyhow::Error> {
        let client = Arc::new(ReqwestHttpClient::new()?);
        Self::with_client(config, client)
    }

    /// Build with any transport.
    pub fn with_client(
        config: LoaderConfig,
        client: Arc<dyn HttpClient>,
    ) -> Result<Self, anyhow::Error> {
        let cache = Arc::new(CacheStore::from_config(&config.cache)?);
        let executor = Arc::new(RequestExecutor::new(
            client,
            Arc::clone(&cache),
            config.executor.clone(),
        ));
        let pipeline = Arc::new(Pipeline::new(
            executor,
            config.sources.clone(),
            &config.planner,
        ));
        Ok(Self {
            config,
            cache,
            pipeline,
        })
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    pub fn daemon(&self) -> Daemon {
        Daemon::new(
            &self.config,
            Arc::clone(&self.pipeline),
            Arc::clone(&self.cache),
        )
    }

    /// Refresh every configured job once, then forecast each resulting series.
    pub async fn snapshot(&self, cancel: &CancellationToken) -> Result<Snapshot, anyhow::Error> {
        let report = self.pipeline.refresh(&self.config.jobs, cancel).await;
        let requests = forecast_requests(&report, &self.config.forecast);
        let forecasts = run_forecasts(requests, self.config.forecast.worker_buffer).await?;
        Ok(Snapshot {
            summary: Summary::of(&report),
            report,
            forecasts,
        })
    }
}

/// Counts a caller can show without walking the report.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Summary {
    pub jobs: usize,
    pub fetched: usize,
    pub valid_records: usize,
    pub invalid_records: usize,
    pub errors: usize,
}

impl Summary {
    pub fn of(report: &RefreshReport) -> Self {
        Self {
            jobs: report.outcomes.len(),
            fetched: report.fetched_count(),
            valid_records: report.valid_count(),
            invalid_records: report.invalid_count(),
            errors: report.errors().len(),
        }
    }
}

/// One refresh and the forecasts computed from it. Forecasts are model
/// output and stay separate from the fact records in `report`.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub summary: Summary,
    pub report: RefreshReport,
    pub forecasts: Vec<ForecastResponse>,
}

/// Group valid records into date-ordered series, one forecast request each.
///
/// Macro series are keyed `country:indicator`, trade series
/// `reporter>partner:flow:product:level:frequency`. Series with no values are skipped.
pub fn forecast_requests(report: &RefreshReport, config: &ForecastConfig) -> Vec<ForecastRequest> {
    let mut series: BTreeMap<String, BTreeMap<String, Option<f64>>> = BTreeMap::new();

    for fact in report.macro_facts() {
        series
            .entry(format!("{}:{}", fact.country, fact.indicator_code))
            .or_default()
            .insert(fact.date.clone(), fact.value);
    }
    for fact in report.trade_facts() {
        series
            .entry(format!(
                "{}>{}:{}:{}:{}:{}",
                fact.reporter,
                fact.partner,
                fact.flow.as_str(),
                fact.product_code,
                fact.product_level.as_str(),
                fact.frequency.as_str()
            ))
            .or_default()
            .insert(fact.date.clone(), fact.value_usd);
    }

    series
        .into_iter()
        .filter(|(_, points)| points.values().any(Option::is_some))
        .map(|(label, points)| {
            ForecastRequest::new(label, points.into_values().collect()).with_config(config)
        })
        .collect()
}

/// Push every request through a fresh forecast worker and collect the responses.
pub async fn run_forecasts(
    requests: Vec<ForecastRequest>,
    buffer: usize,
) -> Result<Vec<ForecastResponse>, anyhow::Error> {
    let expected = requests.len();
    if expected == 0 {
        return Ok(Vec::new());
    }
    let (sender, mut receiver) = ForecastWorker::spawn(buffer);

    let submit = tokio::spawn(async move {
        for request in requests {
            sender.submit(request).await?;
        }
        Ok::<_, tradelens_forecast::WorkerError>(())
    });

    let mut responses = Vec::with_capacity(expected);
    while responses.len() < expected {
        match receiver.recv().await {
            Some(response) => responses.push(response),
            None => break,
        }
    }
    submit.await??;
    tracing::info!(forecasts = responses.len(), "Forecasts complete");
    Ok(responses)
}
