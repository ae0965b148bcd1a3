use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_WINDOWS: [usize; 6] = [7, 15, 30, 60, 90, 120];

/// Calendar month, ordered by (year, month).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct YearMonth {
    pub year: i32,
    pub month: u32,
}

impl YearMonth {
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    pub fn of(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: date.month(),
        }
    }

    pub fn first_day(self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
    }
}

impl fmt::Display for YearMonth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for YearMonth {
    type Err = String;

    /// Accepts `YYYY_MM` (export file names, config) and `YYYY-MM`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let (year, month) = raw
            .split_once(['_', '-'])
            .ok_or_else(|| format!("invalid year-month '{raw}', expected YYYY_MM"))?;
        if year.len() != 4 || month.len() != 2 {
            return Err(format!("invalid year-month '{raw}', expected YYYY_MM"));
        }
        let year: i32 = year
            .parse()
            .map_err(|_| format!("invalid year in '{raw}'"))?;
        let month: u32 = month
            .parse()
            .map_err(|_| format!("invalid month in '{raw}'"))?;
        Self::new(year, month).ok_or_else(|| format!("month out of range in '{raw}'"))
    }
}

impl TryFrom<String> for YearMonth {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<YearMonth> for String {
    fn from(value: YearMonth) -> Self {
        value.to_string()
    }
}

/// One line item from a billing export.
#[derive(Debug, Clone, PartialEq)]
pub struct RawUsageRecord {
    pub project_id: String,
    pub usage_date: NaiveDate,
    pub total_cost: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedCostPoint {
    pub project_id: String,
    pub usage_date: NaiveDate,
    pub total_cost: f64,
}

/// Rolling statistics of one row for one window length.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WindowStats {
    pub window: usize,
    pub moving_average: f64,
    /// `None` when the moving average is zero.
    pub change_pct: Option<f64>,
    pub change_abs: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCostPoint {
    pub project_id: String,
    pub usage_date: NaiveDate,
    pub total_cost: f64,
    pub windows: Vec<WindowStats>,
}

impl EnrichedCostPoint {
    pub fn stats(&self, window: usize) -> Option<&WindowStats> {
        self.windows.iter().find(|w| w.window == window)
    }
}

/// The enriched table shared by the dashboard and the export command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CostDataset {
    pub windows: Vec<usize>,
    pub rows: Vec<EnrichedCostPoint>,
}

impl CostDataset {
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let min = self.rows.iter().map(|r| r.usage_date).min()?;
        let max = self.rows.iter().map(|r| r.usage_date).max()?;
        Some((min, max))
    }

    pub fn project_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.rows.iter().map(|r| r.project_id.clone()).collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ds: NaiveDate,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonthlyForecastTotal {
    pub month: YearMonth,
    pub monthly_total_cost: f64,
}
