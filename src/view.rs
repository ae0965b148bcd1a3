//! Read-only filtering over the enriched table.
//!
//! Used by the interactive dashboard and by `export`. Nothing here aggregates:
//! rows are selected by date, change thresholds, a dollar range and project.

use crate::models::{CostDataset, EnrichedCostPoint};
use chrono::{Days, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeType {
    Increase,
    Decrease,
    #[default]
    Both,
}

impl ChangeType {
    pub const ALL: [ChangeType; 3] = [ChangeType::Increase, ChangeType::Decrease, ChangeType::Both];

    pub fn as_label(self) -> &'static str {
        match self {
            ChangeType::Increase => "increase",
            ChangeType::Decrease => "decrease",
            ChangeType::Both => "both",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "increase" => Some(ChangeType::Increase),
            "decrease" => Some(ChangeType::Decrease),
            "both" => Some(ChangeType::Both),
            _ => None,
        }
    }

    /// Threshold test on a `Change_%` value. Undefined values never match.
    pub fn matches(self, change_pct: Option<f64>, min_change_pct: f64) -> bool {
        let Some(pct) = change_pct else {
            return false;
        };
        match self {
            ChangeType::Increase => pct >= min_change_pct,
            ChangeType::Decrease => pct <= -min_change_pct,
            ChangeType::Both => pct >= min_change_pct || pct <= -min_change_pct,
        }
    }
}

/// One row of the filtered table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ViewRow {
    pub project_id: String,
    pub usage_date: NaiveDate,
    pub moving_average: f64,
    pub total_cost: f64,
    pub change_pct: Option<f64>,
    pub change_abs: f64,
}

impl ViewRow {
    fn from_point(point: &EnrichedCostPoint, window: usize) -> Option<Self> {
        let stats = point.stats(window)?;
        Some(Self {
            project_id: point.project_id.clone(),
            usage_date: point.usage_date,
            moving_average: stats.moving_average,
            total_cost: point.total_cost,
            change_pct: stats.change_pct,
            change_abs: stats.change_abs,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FilterParams {
    pub window: usize,
    pub date: NaiveDate,
    pub change_type: ChangeType,
    pub min_change_pct: f64,
    /// Inclusive `Change_$` bounds; `None` keeps every row.
    pub dollar_range: Option<(f64, f64)>,
    /// `None` selects every project.
    pub projects: Option<BTreeSet<String>>,
}

/// First date at least `window` days after `min_date`, or `None` past the end
/// of the calendar.
fn first_valid_date(min_date: NaiveDate, window: usize) -> Option<NaiveDate> {
    u64::try_from(window)
        .ok()
        .and_then(|w| min_date.checked_add_days(Days::new(w)))
}

/// Dates on which a `window`-row average is meaningful: at least `window` days
/// after the first date in the table. Newest first.
pub fn available_dates(dataset: &CostDataset, window: usize) -> Vec<NaiveDate> {
    let Some((min_date, _)) = dataset.date_range() else {
        return Vec::new();
    };
    let Some(valid_start) = first_valid_date(min_date, window) else {
        return Vec::new();
    };
    let dates: BTreeSet<NaiveDate> = dataset
        .rows
        .iter()
        .map(|r| r.usage_date)
        .filter(|d| *d >= valid_start)
        .collect();
    dates.into_iter().rev().collect()
}

/// Rows on `date` whose `Change_%` passes the change-type threshold.
pub fn select_by_change(
    dataset: &CostDataset,
    window: usize,
    date: NaiveDate,
    change_type: ChangeType,
    min_change_pct: f64,
) -> Vec<ViewRow> {
    dataset
        .rows
        .iter()
        .filter(|r| r.usage_date == date)
        .filter_map(|r| ViewRow::from_point(r, window))
        .filter(|r| change_type.matches(r.change_pct, min_change_pct))
        .collect()
}

/// `(min, max)` of `Change_$` over `rows`, or `(0, 0)` when empty.
pub fn dollar_bounds(rows: &[ViewRow]) -> (f64, f64) {
    let mut iter = rows.iter().map(|r| r.change_abs);
    let Some(first) = iter.next() else {
        return (0.0, 0.0);
    };
    iter.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v)))
}

pub fn apply_filters(dataset: &CostDataset, params: &FilterParams) -> Vec<ViewRow> {
    select_by_change(
        dataset,
        params.window,
        params.date,
        params.change_type,
        params.min_change_pct,
    )
    .into_iter()
    .filter(|r| match params.dollar_range {
        Some((lo, hi)) => r.change_abs >= lo && r.change_abs <= hi,
        None => true,
    })
    .filter(|r| match &params.projects {
        Some(selected) => selected.contains(&r.project_id),
        None => true,
    })
    .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrendPoint {
    pub date: NaiveDate,
    pub total_cost: f64,
    pub moving_average: f64,
}

/// Daily series for one project, gaps forward-filled from the previous
/// observation, clipped to `[first valid date, end]` and trimmed to the last
/// `days` points.
pub fn trend_series(
    dataset: &CostDataset,
    project_id: &str,
    window: usize,
    end: NaiveDate,
    days: usize,
) -> Vec<TrendPoint> {
    let Some((min_date, _)) = dataset.date_range() else {
        return Vec::new();
    };
    let Some(valid_start) = first_valid_date(min_date, window) else {
        return Vec::new();
    };

    let observed: BTreeMap<NaiveDate, (f64, f64)> = dataset
        .rows
        .iter()
        .filter(|r| r.project_id == project_id)
        .filter_map(|r| {
            r.stats(window)
                .map(|s| (r.usage_date, (r.total_cost, s.moving_average)))
        })
        .collect();
    let (Some(&first), Some(&last)) = (observed.keys().next(), observed.keys().next_back()) else {
        return Vec::new();
    };

    let mut filled = Vec::new();
    let mut current = None;
    let mut day = first;
    while day <= last && day <= end {
        if let Some(&values) = observed.get(&day) {
            current = Some(values);
        }
        if let Some((total_cost, moving_average)) = current {
            if day >= valid_start {
                filled.push(TrendPoint {
                    date: day,
                    total_cost,
                    moving_average,
                });
            }
        }
        match day.succ_opt() {
            Some(next) => day = next,
            None => break,
        }
    }

    let skip = filled.len().saturating_sub(days);
    filled.split_off(skip)
}

/// Change to the selected dollar range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DollarAction {
    SetMin(f64),
    SetMax(f64),
    SetRange(f64, f64),
    /// New bounds after the underlying rows changed; resets the selection to
    /// the full range.
    Rebound(f64, f64),
}

/// Single source of truth for the dollar filter. The min/max inputs and the
/// range control all read `selection` and write through [`DollarRange::apply`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DollarRange {
    bounds: (f64, f64),
    selection: (f64, f64),
}

impl DollarRange {
    pub fn new(lo: f64, hi: f64) -> Self {
        let bounds = if lo <= hi { (lo, hi) } else { (hi, lo) };
        Self {
            bounds,
            selection: bounds,
        }
    }

    pub fn bounds(&self) -> (f64, f64) {
        self.bounds
    }

    pub fn selection(&self) -> (f64, f64) {
        self.selection
    }

    fn clamp(&self, v: f64) -> f64 {
        v.clamp(self.bounds.0, self.bounds.1)
    }

    /// Keeps `lo <= min <= max <= hi`. Moving one end past the other drags the
    /// other end along.
    pub fn apply(&mut self, action: DollarAction) {
        match action {
            DollarAction::SetMin(v) => {
                let min = self.clamp(v);
                self.selection = (min, self.selection.1.max(min));
            }
            DollarAction::SetMax(v) => {
                let max = self.clamp(v);
                self.selection = (self.selection.0.min(max), max);
            }
            DollarAction::SetRange(a, b) => {
                let (a, b) = (self.clamp(a), self.clamp(b));
                self.selection = if a <= b { (a, b) } else { (b, a) };
            }
            DollarAction::Rebound(lo, hi) => {
                *self = Self::new(lo, hi);
            }
        }
    }
}
