//! Query legalisation against dimensionally constrained sources.
//!
//! A source declares named dimensions, a cap on how many may be wildcarded at
//! once, and optionally a pair that may never both be wildcarded. An illegal
//! query is split along the chunk dimension (time, for WITS) into fixed-size
//! blocks; each block is re-validated and the still-illegal ones dropped.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradelens_models::{ClassifiedError, ErrorKind};

use crate::config::PlannerConfig;

/// The wildcard member value.
pub const WILDCARD: &str = "all";

/// Inclusive year range used to enumerate a wildcarded time dimension.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct YearRange {
    pub start: i32,
    pub end: i32,
}

impl YearRange {
    /// Bounds are reordered if given backwards.
    pub fn new(start: i32, end: i32) -> Self {
        Self {
            start: start.min(end),
            end: start.max(end),
        }
    }

    pub fn years(&self) -> impl Iterator<Item = i32> {
        self.start..=self.end
    }

    pub fn len(&self) -> usize {
        (self.end - self.start + 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

/// One value per named dimension. Absent dimensions read as the wildcard.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DimensionQuery {
    values: BTreeMap<String, String>,
}

impl DimensionQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, dimension: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(dimension, value);
        self
    }

    pub fn set(&mut self, dimension: impl Into<String>, value: impl Into<String>) {
        self.values.insert(dimension.into(), value.into());
    }

    pub fn get(&self, dimension: &str) -> &str {
        self.values
            .get(dimension)
            .map(String::as_str)
            .unwrap_or(WILDCARD)
    }

    pub fn is_wildcard(&self, dimension: &str) -> bool {
        self.get(dimension).eq_ignore_ascii_case(WILDCARD)
    }

    pub fn dimensions(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

/// Why a query is illegal.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error("unknown dimension '{0}'")]
    UnknownDimension(String),

    #[error("{count} dimensions wildcarded ({}), at most {max} allowed", .dimensions.join(", "))]
    TooManyWildcards {
        count: usize,
        max: usize,
        dimensions: Vec<String>,
    },

    #[error("'{first}' and '{second}' may not both be wildcarded")]
    ExclusivePair { first: String, second: String },
}

/// A source's dimensional constraints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimensionRules {
    pub dimensions: Vec<String>,
    pub max_wildcards: usize,
    pub exclusive_pair: Option<(String, String)>,
    /// Dimension enumerated when decomposing an illegal query.
    pub chunk_dimension: String,
    pub chunk_size: usize,
}

impl DimensionRules {
    /// WITS: at most two of five dimensions wildcarded, never reporter and
    /// partner together, decomposed by year in five-year blocks.
    pub fn wits() -> Self {
        Self::from_config(&PlannerConfig::default())
    }

    pub fn from_config(config: &PlannerConfig) -> Self {
        Self {
            dimensions: ["reporter", "year", "partner", "product", "indicator"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_wildcards: config.max_wildcards,
            exclusive_pair: config
                .exclusive_pair
                .clone()
                .map(|[first, second]| (first, second)),
            chunk_dimension: config.chunk_dimension.clone(),
            chunk_size: config.chunk_size.max(1),
        }
    }

    pub fn wildcarded(&self, query: &DimensionQuery) -> Vec<String> {
        self.dimensions
            .iter()
            .filter(|d| query.is_wildcard(d))
            .cloned()
            .collect()
    }

    pub fn validate(&self, query: &DimensionQuery) -> Result<(), Violation> {
        if let Some((unknown, _)) = query
            .dimensions()
            .find(|(d, _)| !self.dimensions.iter().any(|known| known.as_str() == *d))
        {
            return Err(Violation::UnknownDimension(unknown.to_string()));
        }

        let wildcarded = self.wildcarded(query);
        if wildcarded.len() > self.max_wildcards {
            return Err(Violation::TooManyWildcards {
                count: wildcarded.len(),
                max: self.max_wildcards,
                dimensions: wildcarded,
            });
        }

        if let Some((first, second)) = &self.exclusive_pair {
            if query.is_wildcard(first) && query.is_wildcard(second) {
                return Err(Violation::ExclusivePair {
                    first: first.clone(),
                    second: second.clone(),
                });
            }
        }
        Ok(())
    }

    /// Legalise `query`. A legal query comes back unchanged as a one-element plan.
    ///
    /// Fails with `QueryLimitExceeded` carrying the original violation when no
    /// legal sub-query exists. That is a configuration problem, not "no data".
    pub fn plan(
        &self,
        query: &DimensionQuery,
        fallback_range: YearRange,
    ) -> Result<Vec<DimensionQuery>, ClassifiedError> {
        let violation = match self.validate(query) {
            Ok(()) => return Ok(vec![query.clone()]),
            Err(violation) => violation,
        };

        let mut plan = Vec::new();
        let decomposable = !matches!(violation, Violation::UnknownDimension(_))
            && query.is_wildcard(&self.chunk_dimension);
        if decomposable {
            let years: Vec<i32> = fallback_range.years().collect();
            for block in years.chunks(self.chunk_size) {
                let member = block
                    .iter()
                    .map(i32::to_string)
                    .collect::<Vec<_>>()
                    .join(";");
                let sub = query.clone().with(self.chunk_dimension.clone(), member);
                match self.validate(&sub) {
                    Ok(()) => plan.push(sub),
                    Err(e) => tracing::debug!(reason = %e, "Dropping illegal sub-query"),
                }
            }
        }

        if plan.is_empty() {
            return Err(ClassifiedError::new(
                ErrorKind::QueryLimitExceeded,
                format!("no legal sub-query: {violation}"),
            ));
        }

        tracing::debug!(
            original = %violation,
            sub_queries = plan.len(),
            "Decomposed illegal query"
        );
        Ok(plan)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> DimensionQuery {
        pairs
            .iter()
            .fold(DimensionQuery::new(), |q, (d, v)| q.with(*d, *v))
    }

    #[test]
    fn absent_dimension_is_wildcard() {
        let q = query(&[("reporter", "IND")]);
        assert!(q.is_wildcard("partner"));
        assert!(!q.is_wildcard("reporter"));
        assert!(query(&[("year", "ALL")]).is_wildcard("year"));
    }

    #[test]
    fn legal_query_is_returned_unchanged() {
        let rules = DimensionRules::wits();
        let q = query(&[
            ("reporter", "IND"),
            ("year", "2020"),
            ("partner", "all"),
            ("product", "all"),
            ("indicator", "XPRT-TRD-VL"),
        ]);
        let plan = rules.plan(&q, YearRange::new(2000, 2024)).unwrap();
        assert_eq!(plan, vec![q]);
    }

    #[test]
    fn too_many_wildcards_is_a_violation() {
        let rules = DimensionRules::wits();
        let q = query(&[("reporter", "IND"), ("indicator", "XPRT-TRD-VL")]);
        match rules.validate(&q) {
            Err(Violation::TooManyWildcards { count, max, .. }) => {
                assert_eq!(count, 3);
                assert_eq!(max, 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn exclusive_pair_is_a_violation() {
        let rules = DimensionRules::wits();
        let q = query(&[
            ("year", "2020"),
            ("product", "total"),
            ("indicator", "XPRT-TRD-VL"),
        ]);
        assert_eq!(
            rules.validate(&q),
            Err(Violation::ExclusivePair {
                first: "reporter".to_string(),
                second: "partner".to_string(),
            })
        );
    }

    #[test]
    fn unknown_dimension_is_not_decomposed() {
        let rules = DimensionRules::wits();
        let q = query(&[("currency", "USD")]);
        let err = rules.plan(&q, YearRange::new(2000, 2001)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueryLimitExceeded);
        assert!(err.message.contains("currency"));
    }

    #[test]
    fn decomposes_year_into_blocks() {
        let rules = DimensionRules::wits();
        let q = query(&[
            ("partner", "WLD"),
            ("indicator", "XPRT-TRD-VL"),
        ]);
        let plan = rules.plan(&q, YearRange::new(2000, 2011)).unwrap();
        let years: Vec<&str> = plan.iter().map(|q| q.get("year")).collect();
        assert_eq!(
            years,
            vec![
                "2000;2001;2002;2003;2004",
                "2005;2006;2007;2008;2009",
                "2010;2011"
            ]
        );
        for sub in &plan {
            assert!(rules.validate(sub).is_ok());
            assert_eq!(sub.get("partner"), "WLD");
        }
    }

    #[test]
    fn pair_violation_survives_year_chunking() {
        let rules = DimensionRules::wits();
        let q = query(&[("product", "total"), ("indicator", "XPRT-TRD-VL")]);
        let err = rules.plan(&q, YearRange::new(2000, 2024)).unwrap_err();
        assert_eq!(err.kind, ErrorKind::QueryLimitExceeded);
        assert!(err.message.contains("reporter"));
        assert!(!err.retryable());
    }

    #[test]
    fn year_range_reorders_bounds() {
        let range = YearRange::new(2024, 2020);
        assert_eq!(range.start, 2020);
        assert_eq!(range.len(), 5);
        assert_eq!(range.years().last(), Some(2024));
    }
}
