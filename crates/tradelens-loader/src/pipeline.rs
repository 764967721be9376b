use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tradelens_models::{
    CandidateRecord, CanonicalRecord, ClassifiedError, InvalidRecord, MacroFact, TradeFact,
};

use crate::config::{ttl, PlannerConfig, SourcesConfig};
use crate::executor::{CacheMode, RequestDescriptor, RequestExecutor};
use crate::normalize::{normalize, SourceContext, SourceDescriptor};
use crate::planner::DimensionRules;
use crate::sources::comtrade::{self, ComtradeQuery};
use crate::sources::frankfurter::{self, FrankfurterQuery};
use crate::sources::wits::{self, WitsQuery};
use crate::sources::world_bank::{self, WorldBankQuery};
use crate::sources::Provider;
use crate::validate::validate;

/// One configured fetch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum SourceJob {
    Wits(WitsQuery),
    WorldBank(WorldBankQuery),
    Frankfurter(FrankfurterQuery),
    Comtrade(ComtradeQuery),
}

impl SourceJob {
    /// Stable identity, also the key for last-known-good fallback.
    pub fn label(&self) -> String {
        match self {
            Self::Wits(q) => q.label(),
            Self::WorldBank(q) => q.label(),
            Self::Frankfurter(q) => q.label(),
            Self::Comtrade(q) => q.label(),
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            Self::Wits(_) => Provider::Wits,
            Self::WorldBank(_) => Provider::WorldBank,
            Self::Frankfurter(_) => Provider::Frankfurter,
            Self::Comtrade(_) => Provider::Comtrade,
        }
    }
}

/// Validated output of one successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SourceBatch {
    pub label: String,
    pub provider: Provider,
    pub records: Vec<CanonicalRecord>,
    pub invalid: Vec<InvalidRecord>,
    /// Set when validation rejected anything. Does not fail the job.
    pub drift: Option<ClassifiedError>,
    pub requests: usize,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SourceOutcome {
    Fetched(SourceBatch),
    Failed {
        error: ClassifiedError,
        /// The last batch this job produced successfully, if any.
        fallback: Option<SourceBatch>,
    },
    Skipped {
        reason: String,
    },
    Cancelled,
    /// The job's task panicked.
    Aborted {
        reason: String,
        fallback: Option<SourceBatch>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JobOutcome {
    pub label: String,
    pub provider: Provider,
    pub elapsed_ms: u64,
    pub outcome: SourceOutcome,
}

impl JobOutcome {
    /// Fresh batch, or the fallback for a failed job.
    pub fn batch(&self) -> Option<&SourceBatch> {
        match &self.outcome {
            SourceOutcome::Fetched(batch) => Some(batch),
            SourceOutcome::Failed { fallback, .. } | SourceOutcome::Aborted { fallback, .. } => {
                fallback.as_ref()
            }
            SourceOutcome::Skipped { .. } | SourceOutcome::Cancelled => None,
        }
    }

    pub fn is_fetched(&self) -> bool {
        matches!(self.outcome, SourceOutcome::Fetched(_))
    }
}

/// Per-job outcomes of one refresh, in job order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RefreshReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<JobOutcome>,
}

impl RefreshReport {
    /// Batches the caller should present: fresh ones plus last-known-good fallbacks.
    pub fn batches(&self) -> impl Iterator<Item = &SourceBatch> {
        self.outcomes.iter().filter_map(JobOutcome::batch)
    }

    pub fn records(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.batches().flat_map(|b| b.records.iter())
    }

    pub fn trade_facts(&self) -> Vec<&TradeFact> {
        self.records().filter_map(CanonicalRecord::as_trade).collect()
    }

    pub fn macro_facts(&self) -> Vec<&MacroFact> {
        self.records().filter_map(CanonicalRecord::as_macro).collect()
    }

    pub fn valid_count(&self) -> usize {
        self.batches().map(|b| b.records.len()).sum()
    }

    pub fn invalid_count(&self) -> usize {
        self.batches().map(|b| b.invalid.len()).sum()
    }

    /// Terminal job failures plus schema drift on fresh batches.
    pub fn errors(&self) -> Vec<&ClassifiedError> {
        self.outcomes
            .iter()
            .filter_map(|o| match &o.outcome {
                SourceOutcome::Failed { error, .. } => Some(error),
                SourceOutcome::Fetched(batch) => batch.drift.as_ref(),
                _ => None,
            })
            .collect()
    }

    pub fn fetched_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_fetched()).count()
    }

    pub fn outcome(&self, label: &str) -> Option<&SourceOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.label == label)
            .map(|o| &o.outcome)
    }
}

/// Everything a job task needs, shared by all tasks of a refresh.
struct JobContext {
    executor: Arc<RequestExecutor>,
    sources: SourcesConfig,
    rules: DimensionRules,
    cache_mode: CacheMode,
}

enum JobRun {
    Fetched(SourceBatch),
    Failed(ClassifiedError),
    Skipped(String),
    Cancelled,
}

/// Fan-out acquisition over the configured sources.
///
/// Jobs run concurrently; one job's failure never aborts the others. The
/// last successful batch per job label is retained and attached to a later
/// failure of the same job.
pub struct Pipeline {
    context: Arc<JobContext>,
    last_good: Mutex<HashMap<String, SourceBatch>>,
}

impl Pipeline {
    pub fn new(executor: Arc<RequestExecutor>, sources: SourcesConfig, planner: &PlannerConfig) -> Self {
        Self::with_cache_mode(executor, sources, planner, CacheMode::Use)
    }

    pub fn with_cache_mode(
        executor: Arc<RequestExecutor>,
        sources: SourcesConfig,
        planner: &PlannerConfig,
        cache_mode: CacheMode,
    ) -> Self {
        Self {
            context: Arc::new(JobContext {
                executor,
                sources,
                rules: DimensionRules::from_config(planner),
                cache_mode,
            }),
            last_good: Mutex::new(HashMap::new()),
        }
    }

    pub fn executor(&self) -> &Arc<RequestExecutor> {
        &self.context.executor
    }

    pub fn last_known_good(&self, label: &str) -> Option<SourceBatch> {
        self.last_good
            .lock()
            .ok()
            .and_then(|map| map.get(label).cloned())
    }

    /// Run every job concurrently and collect one outcome per job.
    ///
    /// Cancelling `cancel` stops jobs from issuing further requests; their
    /// outcome is `Cancelled`. Results already delivered are kept.
    pub async fn refresh(&self, jobs: &[SourceJob], cancel: &CancellationToken) -> RefreshReport {
        let started_at = Utc::now();
        tracing::info!(jobs = jobs.len(), "Starting refresh");

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            let context = Arc::clone(&self.context);
            let job = job.clone();
            let cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let started = Instant::now();
                let run = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => JobRun::Cancelled,
                    run = run_job(&context, &job) => run,
                };
                (run, started.elapsed().as_millis() as u64)
            }));
        }

        let mut outcomes = Vec::with_capacity(jobs.len());
        for (job, handle) in jobs.iter().zip(handles) {
            let label = job.label();
            let provider = job.provider();
            let (outcome, elapsed_ms) = match handle.await {
                Ok((JobRun::Fetched(batch), elapsed_ms)) => {
                    tracing::info!(
                        source = %label,
                        valid = batch.records.len(),
                        invalid = batch.invalid.len(),
                        requests = batch.requests,
                        elapsed_ms,
                        "Source fetched"
                    );
                    self.remember(&batch);
                    (SourceOutcome::Fetched(batch), elapsed_ms)
                }
                Ok((JobRun::Failed(error), elapsed_ms)) => {
                    let fallback = self.last_known_good(&label);
                    tracing::warn!(
                        source = %label,
                        kind = %error.kind,
                        error = %error.message,
                        has_fallback = fallback.is_some(),
                        elapsed_ms,
                        "Source failed"
                    );
                    (SourceOutcome::Failed { error, fallback }, elapsed_ms)
                }
                Ok((JobRun::Skipped(reason), elapsed_ms)) => {
                    tracing::info!(source = %label, reason = %reason, "Source skipped");
                    (SourceOutcome::Skipped { reason }, elapsed_ms)
                }
                Ok((JobRun::Cancelled, elapsed_ms)) => {
                    tracing::info!(source = %label, "Source cancelled");
                    (SourceOutcome::Cancelled, elapsed_ms)
                }
                Err(e) => {
                    tracing::error!(source = %label, error = %e, "Source task panicked");
                    (
                        SourceOutcome::Aborted {
                            reason: e.to_string(),
                            fallback: self.last_known_good(&label),
                        },
                        0,
                    )
                }
            };
            outcomes.push(JobOutcome {
                label,
                provider,
                elapsed_ms,
                outcome,
            });
        }

        let report = RefreshReport {
            started_at,
            finished_at: Utc::now(),
            outcomes,
        };
        tracing::info!(
            fetched = report.fetched_count(),
            total = jobs.len(),
            valid = report.valid_count(),
            "Refresh complete"
        );
        report
    }

    fn remember(&self, batch: &SourceBatch) {
        match self.last_good.lock() {
            Ok(mut map) => {
                map.insert(batch.label.clone(), batch.clone());
            }
            Err(e) => tracing::warn!(error = %e, "Last-known-good map poisoned"),
        }
    }
}

async fn run_job(context: &JobContext, job: &SourceJob) -> JobRun {
    let provider = job.provider();
    let label = job.label();

    if let SourceJob::Comtrade(_) = job {
        if !context.sources.comtrade.enabled {
            return JobRun::Skipped("comtrade source is disabled".to_string());
        }
    }

    match fetch_candidates(context, job).await {
        Ok((candidates, requests)) => {
            let report = validate(candidates, provider.schema());
            let drift = report
                .drift_error()
                .map(|e| e.with_source(provider.display_name()));
            JobRun::Fetched(SourceBatch {
                label,
                provider,
                records: report.valid,
                invalid: report.invalid,
                drift,
                requests,
                fetched_at: Utc::now(),
            })
        }
        Err(error) => JobRun::Failed(error.with_source(provider.display_name())),
    }
}

/// Execute every request a job needs and normalize each payload.
async fn fetch_candidates(
    context: &JobContext,
    job: &SourceJob,
) -> Result<(Vec<CandidateRecord>, usize), ClassifiedError> {
    let executor = context.executor.as_ref();
    let sources = &context.sources;
    let mut candidates = Vec::new();
    let mut requests = 0;

    match job {
        SourceJob::Wits(query) => {
            let range = query.year_range.unwrap_or(sources.wits.fallback_range);
            let plan = context.rules.plan(&query.dimensions(), range)?;
            for sub in plan {
                let url = wits::query_url(&sources.wits.base_url, &sources.wits.datasource, &sub);
                let payload = executor
                    .execute(&descriptor(&url, context.cache_mode, sources.wits.ttl_seconds, true))
                    .await?;
                requests += 1;
                let source = SourceDescriptor::new(SourceContext::Wits(sub), url);
                candidates.extend(normalize(&payload, &source));
            }
        }
        SourceJob::WorldBank(query) => {
            let pages = world_bank::fetch_world_bank_indicator(
                executor,
                &sources.world_bank,
                query,
                context.cache_mode,
            )
            .await?;
            for page in pages {
                requests += 1;
                let source =
                    SourceDescriptor::new(SourceContext::WorldBank(query.clone()), page.url);
                candidates.extend(normalize(&page.payload, &source));
            }
        }
        SourceJob::Frankfurter(query) => {
            let url = frankfurter::query_url(&sources.frankfurter.base_url, query);
            let payload = executor
                .execute(&descriptor(
                    &url,
                    context.cache_mode,
                    sources.frankfurter.ttl_seconds,
                    false,
                ))
                .await?;
            requests += 1;
            let source = SourceDescriptor::new(SourceContext::Frankfurter(query.clone()), url);
            candidates.extend(normalize(&payload, &source));
        }
        SourceJob::Comtrade(query) => {
            let url = comtrade::query_url(
                &sources.comtrade.base_url,
                query,
                sources.comtrade.api_key.as_deref(),
            );
            // The subscription key stays out of cache keys, events and provenance.
            let fingerprint = comtrade::query_url(&sources.comtrade.base_url, query, None);
            let payload = executor
                .execute(
                    &descriptor(&url, context.cache_mode, sources.comtrade.ttl_seconds, false)
                        .with_identity(fingerprint.clone()),
                )
                .await?;
            requests += 1;
            let source = SourceDescriptor::new(SourceContext::Comtrade(query.clone()), fingerprint);
            candidates.extend(normalize(&payload, &source));
        }
    }

    Ok((candidates, requests))
}

fn descriptor(url: &str, mode: CacheMode, ttl_seconds: Option<u64>, tree: bool) -> RequestDescriptor {
    let mut descriptor = if tree {
        RequestDescriptor::tree(url)
    } else {
        RequestDescriptor::json(url)
    };
    descriptor.cache_ttl = ttl(ttl_seconds);
    descriptor.with_cache_mode(mode)
}
