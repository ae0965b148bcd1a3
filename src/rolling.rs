//! Trailing moving averages and change metrics per project series.
//!
//! Windows are counted in rows, not calendar days: a gap in a project's dates
//! does not shorten its window. The first rows of a series use every row seen
//! so far (a minimum period of one), so every row has a moving average.

use crate::error::AppError;
use crate::models::{AggregatedCostPoint, EnrichedCostPoint, WindowStats};

/// Trailing mean over `window` rows with a minimum period of one.
///
/// Each mean is a fresh left-to-right sum of its window, so the value at `i` is
/// exactly the mean of `values[i.saturating_sub(window - 1)..=i]`.
pub fn moving_average(values: &[f64], window: usize) -> Vec<f64> {
    let window = window.max(1);
    (0..values.len())
        .map(|i| {
            let start = (i + 1).saturating_sub(window);
            let slice = &values[start..=i];
            slice.iter().sum::<f64>() / slice.len() as f64
        })
        .collect()
}

/// Returns `(Change_%, Change_$)`. The percentage is undefined (`None`) when
/// the moving average is zero.
pub fn change_metrics(value: f64, moving_average: f64) -> (Option<f64>, f64) {
    let change_abs = value - moving_average;
    let change_pct = if moving_average == 0.0 {
        None
    } else {
        Some(change_abs / moving_average * 100.0)
    };
    (change_pct, change_abs)
}

fn check_sorted(points: &[AggregatedCostPoint]) -> Result<(), AppError> {
    for pair in points.windows(2) {
        let (a, b) = (&pair[0], &pair[1]);
        let ordered = match a.project_id.cmp(&b.project_id) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Equal => a.usage_date < b.usage_date,
            std::cmp::Ordering::Greater => false,
        };
        if !ordered {
            return Err(AppError::Unsorted(format!(
                "({}, {}) followed by ({}, {})",
                a.project_id, a.usage_date, b.project_id, b.usage_date
            )));
        }
    }
    Ok(())
}

/// Enriches aggregated points, which must be sorted by
/// `(project_id, usage_date)` with unique keys.
pub fn enrich(
    points: &[AggregatedCostPoint],
    windows: &[usize],
) -> Result<Vec<EnrichedCostPoint>, AppError> {
    check_sorted(points)?;

    let mut out = Vec::with_capacity(points.len());
    for partition in points.chunk_by(|a, b| a.project_id == b.project_id) {
        let costs: Vec<f64> = partition.iter().map(|p| p.total_cost).collect();
        let averages: Vec<Vec<f64>> = windows
            .iter()
            .map(|&w| moving_average(&costs, w))
            .collect();

        for (i, point) in partition.iter().enumerate() {
            let stats = windows
                .iter()
                .zip(&averages)
                .map(|(&window, ma)| {
                    let (change_pct, change_abs) = change_metrics(point.total_cost, ma[i]);
                    WindowStats {
                        window,
                        moving_average: ma[i],
                        change_pct,
                        change_abs,
                    }
                })
                .collect();
            out.push(EnrichedCostPoint {
                project_id: point.project_id.clone(),
                usage_date: point.usage_date,
                total_cost: point.total_cost,
                windows: stats,
            });
        }
    }

    Ok(out)
}
