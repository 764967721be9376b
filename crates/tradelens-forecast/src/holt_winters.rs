use tradelens_models::SmoothingParams;

use crate::seasonal_naive::seasonal_naive;

/// Smoothed state after absorbing a history.
#[derive(Debug, Clone, PartialEq)]
pub struct HoltWintersFit {
    pub level: f64,
    pub trend: f64,
    /// Additive offsets, one per season slot. All zero when `season_length == 1`.
    pub seasonal: Vec<f64>,
    /// Length of the history the fit consumed, including nulls.
    pub observations: usize,
    /// False when a first-season slot was missing and its offset started at zero.
    pub seasonal_confident: bool,
}

impl HoltWintersFit {
    /// `level + trend * h + seasonal[(n + h - 1) mod s]` for `h = 1..=horizon`.
    pub fn forecast(&self, horizon: usize) -> Vec<f64> {
        let season = self.seasonal.len().max(1);
        (1..=horizon)
            .map(|h| {
                let offset = self
                    .seasonal
                    .get((self.observations + h - 1) % season)
                    .copied()
                    .unwrap_or(0.0);
                self.level + self.trend * h as f64 + offset
            })
            .collect()
    }
}

/// Fit additive Holt-Winters. `None` when the history is shorter than two
/// seasons or either of the first two seasons has no observations.
///
/// Level starts at the first season's mean, trend at the difference of the
/// first two seasons' means divided by the season length. Nulls after the
/// first season leave the state untouched.
pub fn fit_holt_winters(
    history: &[Option<f64>],
    season_length: usize,
    params: SmoothingParams,
) -> Option<HoltWintersFit> {
    let season = season_length.max(1);
    let n = history.len();
    if n < 2 * season {
        return None;
    }

    let first = mean(&history[..season])?;
    let second = mean(&history[season..2 * season])?;
    let mut level = first;
    let mut trend = (second - first) / season as f64;

    let mut seasonal = vec![0.0; season];
    let mut seasonal_confident = true;
    if season > 1 {
        for (slot, value) in history[..season].iter().enumerate() {
            match value {
                Some(v) => seasonal[slot] = v - first,
                None => seasonal_confident = false,
            }
        }
    }

    let SmoothingParams { alpha, beta, gamma } = params;
    for (t, value) in history.iter().enumerate().skip(season) {
        let Some(v) = *value else {
            continue;
        };
        let slot = t % season;
        let previous = level;
        level = alpha * (v - seasonal[slot]) + (1.0 - alpha) * (previous + trend);
        trend = beta * (level - previous) + (1.0 - beta) * trend;
        if season > 1 {
            seasonal[slot] = gamma * (v - level) + (1.0 - gamma) * seasonal[slot];
        }
    }

    Some(HoltWintersFit {
        level,
        trend,
        seasonal,
        observations: n,
        seasonal_confident,
    })
}

/// Additive Holt-Winters forecast, or the seasonal-naive one when the
/// history cannot support a fit.
pub fn holt_winters(
    history: &[Option<f64>],
    season_length: usize,
    horizon: usize,
    params: SmoothingParams,
) -> Vec<Option<f64>> {
    match fit_holt_winters(history, season_length, params) {
        Some(fit) => fit.forecast(horizon).into_iter().map(Some).collect(),
        None => seasonal_naive(history, season_length, horizon),
    }
}

fn mean(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().collect();
    if present.is_empty() {
        return None;
    }
    Some(present.iter().sum::<f64>() / present.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANDOM_WALK: SmoothingParams = SmoothingParams {
        alpha: 1.0,
        beta: 0.0,
        gamma: 0.0,
    };

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn assert_close(actual: &[Option<f64>], expected: &[f64]) {
        assert_eq!(actual.len(), expected.len());
        for (a, e) in actual.iter().zip(expected) {
            let a = a.expect("forecast value");
            assert!((a - e).abs() < 1e-9, "{a} != {e}");
        }
    }

    #[test]
    fn full_alpha_no_beta_is_random_walk_with_drift() {
        let history = some(&[100.0, 110.0, 121.0, 133.1]);
        let fit = fit_holt_winters(&history, 1, RANDOM_WALK).unwrap();
        // Level tracks the last observation, drift stays at the initial step.
        assert!((fit.level - 133.1).abs() < 1e-9);
        assert!((fit.trend - 10.0).abs() < 1e-9);
        assert_close(
            &holt_winters(&history, 1, 3, RANDOM_WALK),
            &[143.1, 153.1, 163.1],
        );
    }

    #[test]
    fn constant_seasonal_series_is_flat() {
        let history = some(&[5.0, 5.0, 5.0, 5.0, 5.0, 5.0]);
        let forecast = holt_winters(&history, 2, 4, SmoothingParams::default());
        assert_close(&forecast, &[5.0, 5.0, 5.0, 5.0]);
    }

    #[test]
    fn nulls_are_not_absorbed() {
        let history = vec![Some(100.0), Some(110.0), None, Some(130.0)];
        let fit = fit_holt_winters(&history, 1, RANDOM_WALK).unwrap();
        assert!((fit.level - 130.0).abs() < 1e-9);
        assert_close(&holt_winters(&history, 1, 1, RANDOM_WALK), &[140.0]);
    }

    #[test]
    fn short_history_delegates_to_seasonal_naive() {
        let history = some(&[1.0, 5.0, 3.0]);
        assert!(fit_holt_winters(&history, 2, SmoothingParams::default()).is_none());
        assert_eq!(
            holt_winters(&history, 2, 2, SmoothingParams::default()),
            seasonal_naive(&history, 2, 2)
        );
    }

    #[test]
    fn missing_first_season_slot_is_flagged() {
        let history = vec![None, Some(4.0), Some(3.0), Some(5.0), Some(4.0), Some(6.0)];
        let fit = fit_holt_winters(&history, 2, SmoothingParams::default()).unwrap();
        assert!(!fit.seasonal_confident);
        assert_eq!(fit.forecast(3).len(), 3);

        let complete = some(&[2.0, 4.0, 3.0, 5.0, 4.0, 6.0]);
        assert!(
            fit_holt_winters(&complete, 2, SmoothingParams::default())
                .unwrap()
                .seasonal_confident
        );
    }

    #[test]
    fn seasonal_offsets_alternate() {
        let history = some(&[12.0, 8.0, 12.0, 8.0, 12.0, 8.0, 12.0, 8.0]);
        let forecast = holt_winters(&history, 2, 2, SmoothingParams::default());
        let (high, low) = (forecast[0].unwrap(), forecast[1].unwrap());
        assert!(high > low, "{high} should exceed {low}");
    }
}
