use tradelens_models::Diagnostics;

/// Fewest training points a rolling-origin split leaves.
pub const MIN_TRAIN: usize = 3;

/// Root mean squared error over pairs where both sides are present.
pub fn rmse(actual: &[Option<f64>], predicted: &[Option<f64>]) -> Option<f64> {
    let squared: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter_map(|pair| match pair {
            (Some(a), Some(p)) => Some((a - p).powi(2)),
            _ => None,
        })
        .collect();
    if squared.is_empty() {
        return None;
    }
    Some((squared.iter().sum::<f64>() / squared.len() as f64).sqrt())
}

/// Mean absolute percentage error, in percent. Zero actuals are skipped.
pub fn mape(actual: &[Option<f64>], predicted: &[Option<f64>]) -> Option<f64> {
    let ratios: Vec<f64> = actual
        .iter()
        .zip(predicted)
        .filter_map(|pair| match pair {
            (Some(a), Some(p)) if *a != 0.0 => Some(((a - p) / a).abs()),
            _ => None,
        })
        .collect();
    if ratios.is_empty() {
        return None;
    }
    Some(ratios.iter().sum::<f64>() / ratios.len() as f64 * 100.0)
}

/// Hold out the last `test_size` points, train `forecaster` on the rest and
/// score its forecast of the hold-out.
///
/// Series shorter than `test_size + 3` yield empty diagnostics.
pub fn rolling_origin<F>(series: &[f64], test_size: usize, forecaster: F) -> Diagnostics
where
    F: Fn(&[Option<f64>], usize) -> Vec<Option<f64>>,
{
    if test_size == 0 || series.len() < test_size + MIN_TRAIN {
        return Diagnostics::default();
    }

    let split = series.len() - test_size;
    let train: Vec<Option<f64>> = series[..split].iter().copied().map(Some).collect();
    let actual: Vec<Option<f64>> = series[split..].iter().copied().map(Some).collect();
    let predicted = forecaster(&train, test_size);

    let residuals = actual
        .iter()
        .zip(&predicted)
        .filter_map(|pair| match pair {
            (Some(a), Some(p)) => Some(a - p),
            _ => None,
        })
        .collect();

    Diagnostics {
        rmse: rmse(&actual, &predicted),
        mape: mape(&actual, &predicted),
        residuals,
        train_size: split,
        test_size,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seasonal_naive::seasonal_naive;

    #[test]
    fn rmse_and_mape_skip_missing_pairs() {
        let actual = [Some(100.0), None, Some(200.0), Some(0.0)];
        let predicted = [Some(110.0), Some(5.0), Some(180.0), Some(3.0)];
        // Pairs: (100,110), (200,180), (0,3).
        let expected_rmse = ((100.0 + 400.0 + 9.0) / 3.0_f64).sqrt();
        assert!((rmse(&actual, &predicted).unwrap() - expected_rmse).abs() < 1e-9);
        // Zero actual is excluded: (10% + 10%) / 2.
        assert!((mape(&actual, &predicted).unwrap() - 10.0).abs() < 1e-9);
        assert_eq!(rmse(&[None], &[Some(1.0)]), None);
        assert_eq!(mape(&[Some(0.0)], &[Some(1.0)]), None);
    }

    #[test]
    fn short_series_gives_null_metrics() {
        let diagnostics = rolling_origin(&[1.0, 2.0, 3.0, 4.0, 5.0], 3, |h, n| {
            seasonal_naive(h, 1, n)
        });
        assert_eq!(diagnostics.rmse, None);
        assert_eq!(diagnostics.mape, None);
        assert!(diagnostics.residuals.is_empty());
    }

    #[test]
    fn linear_series_is_forecast_exactly() {
        let series: Vec<f64> = (0..10).map(|i| 50.0 + 5.0 * i as f64).collect();
        let diagnostics = rolling_origin(&series, 3, |h, n| seasonal_naive(h, 1, n));
        assert_eq!(diagnostics.train_size, 7);
        assert_eq!(diagnostics.test_size, 3);
        assert_eq!(diagnostics.residuals.len(), 3);
        assert!(diagnostics.rmse.unwrap() < 1e-9);
        assert!(diagnostics.mape.unwrap() < 1e-9);
    }

    #[test]
    fn residuals_are_actual_minus_forecast() {
        let series = [10.0, 10.0, 10.0, 10.0, 12.0];
        let diagnostics = rolling_origin(&series, 1, |h, n| seasonal_naive(h, 1, n));
        assert_eq!(diagnostics.residuals, vec![2.0]);
        assert_eq!(diagnostics.rmse, Some(2.0));
    }
}
