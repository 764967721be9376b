/// Seasonal-naive forecast with an additive trend.
///
/// The trend is the mean of every season-over-season difference where both
/// ends are present. Step `h` repeats the same-season value from the last
/// observed season and adds `trend * ceil(h / season_length)`. If that value
/// is missing, the latest earlier value in the same season is used.
///
/// Histories no longer than one season produce `horizon` nulls.
pub fn seasonal_naive(
    history: &[Option<f64>],
    season_length: usize,
    horizon: usize,
) -> Vec<Option<f64>> {
    let season = season_length.max(1);
    let n = history.len();
    if n <= season {
        return vec![None; horizon];
    }

    let diffs: Vec<f64> = (season..n)
        .filter_map(|i| match (history[i], history[i - season]) {
            (Some(current), Some(previous)) => Some(current - previous),
            _ => None,
        })
        .collect();
    let trend = if diffs.is_empty() {
        0.0
    } else {
        diffs.iter().sum::<f64>() / diffs.len() as f64
    };

    (1..=horizon)
        .map(|step| {
            let slot = n - season + (step - 1) % season;
            let cycles = step.div_ceil(season) as f64;
            same_season_base(history, slot, season).map(|base| base + trend * cycles)
        })
        .collect()
}

fn same_season_base(history: &[Option<f64>], slot: usize, season: usize) -> Option<f64> {
    let mut index = slot;
    loop {
        if let Some(value) = history[index] {
            return Some(value);
        }
        index = index.checked_sub(season)?;
    }
}
