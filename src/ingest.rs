//! Reading billing exports and grouping them into daily per-project costs.

use crate::error::AppError;
use crate::models::{AggregatedCostPoint, RawUsageRecord};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Deserialize)]
struct UsageRow {
    project_id: String,
    usage_date: String,
    total_cost: String,
}

/// Parses an ISO-style date. Timestamps keep only their calendar date.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(d);
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
        return Some(dt.date());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(dt.date());
    }
    DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.date_naive())
}

pub fn parse_cost(raw: &str) -> Option<f64> {
    raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Reads one export file. Any bad row fails the whole file.
pub fn read_usage_file(path: &Path) -> Result<Vec<RawUsageRecord>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::csv_at(path, e))?;
    let headers = reader.headers().map_err(|e| AppError::csv_at(path, e))?.clone();
    let mut out = Vec::new();

    for result in reader.records() {
        let malformed = |line: u64, message: String| AppError::MalformedRow {
            path: path.to_path_buf(),
            line,
            message,
        };
        let record = result.map_err(|e| AppError::csv_at(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let row: UsageRow = record
            .deserialize(Some(&headers))
            .map_err(|e| malformed(line, e.to_string()))?;

        let usage_date = parse_date(&row.usage_date).ok_or_else(|| {
            malformed(line, format!("unparseable usage_date '{}'", row.usage_date))
        })?;
        let total_cost = parse_cost(&row.total_cost).ok_or_else(|| {
            malformed(line, format!("non-numeric total_cost '{}'", row.total_cost))
        })?;

        out.push(RawUsageRecord {
            project_id: row.project_id,
            usage_date,
            total_cost,
        });
    }

    Ok(out)
}

/// Sums costs per `(project_id, usage_date)`, sorted by that key.
///
/// Each group is summed in ascending value order, so the result does not
/// depend on the order records arrive in.
pub fn aggregate<I>(records: I) -> Vec<AggregatedCostPoint>
where
    I: IntoIterator<Item = RawUsageRecord>,
{
    let mut groups: BTreeMap<(String, NaiveDate), Vec<f64>> = BTreeMap::new();
    for r in records {
        groups
            .entry((r.project_id, r.usage_date))
            .or_default()
            .push(r.total_cost);
    }

    groups
        .into_iter()
        .map(|((project_id, usage_date), mut costs)| {
            costs.sort_by(f64::total_cmp);
            AggregatedCostPoint {
                project_id,
                usage_date,
                total_cost: costs.iter().sum(),
            }
        })
        .collect()
}
