use crate::error::AppError;
use crate::ingest::{parse_cost, parse_date};
use crate::models::{
    CostDataset, EnrichedCostPoint, ForecastPoint, MonthlyForecastTotal, SeriesPoint, WindowStats,
};
use csv::StringRecord;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

/// An output written to a temporary file next to its destination, not yet
/// visible under its final name.
#[derive(Debug)]
pub struct StagedFile {
    tmp: NamedTempFile,
    target: PathBuf,
}

impl StagedFile {
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn commit(self) -> Result<(), AppError> {
        self.tmp.persist(&self.target)?;
        Ok(())
    }
}

/// Runs `write` against a temporary file in the destination directory.
/// Dropping the result without committing removes the temporary file.
pub fn stage<F>(path: &Path, write: F) -> Result<StagedFile, AppError>
where
    F: FnOnce(&mut File) -> Result<(), AppError>,
{
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    write(tmp.as_file_mut())?;
    tmp.as_file_mut().flush()?;
    tmp.as_file().sync_all()?;
    Ok(StagedFile {
        tmp,
        target: path.to_path_buf(),
    })
}

/// Renames every staged file into place. Callers stage all outputs first so
/// that a failed write leaves none of them behind.
pub fn commit_all(files: Vec<StagedFile>) -> Result<(), AppError> {
    for file in files {
        debug!(target = %file.target().display(), "committing staged output");
        file.commit()?;
    }
    Ok(())
}

/// Writes `path` through a temporary file in the same directory and renames it
/// into place only after `write` succeeded.
pub fn write_atomic<F>(path: &Path, write: F) -> Result<(), AppError>
where
    F: FnOnce(&mut File) -> Result<(), AppError>,
{
    stage(path, write)?.commit()
}

pub fn ma_column(window: usize) -> String {
    format!("MA_{window}")
}

pub fn pct_column(window: usize) -> String {
    format!("Change_%_{window}")
}

pub fn abs_column(window: usize) -> String {
    format!("Change_$_{window}")
}

pub fn dataset_header(windows: &[usize]) -> Vec<String> {
    let mut header = vec![
        "project_id".to_string(),
        "usage_date".to_string(),
        "total_cost".to_string(),
    ];
    header.extend(windows.iter().map(|&w| ma_column(w)));
    for &w in windows {
        header.push(pct_column(w));
        header.push(abs_column(w));
    }
    header
}

fn dataset_record(row: &EnrichedCostPoint, windows: &[usize]) -> Result<Vec<String>, AppError> {
    let mut record = vec![
        row.project_id.clone(),
        row.usage_date.to_string(),
        row.total_cost.to_string(),
    ];
    let stats = windows
        .iter()
        .map(|&w| {
            row.stats(w).ok_or_else(|| {
                AppError::Config(format!(
                    "row ({}, {}) has no statistics for window {w}",
                    row.project_id, row.usage_date
                ))
            })
        })
        .collect::<Result<Vec<&WindowStats>, AppError>>()?;

    record.extend(stats.iter().map(|s| s.moving_average.to_string()));
    for s in &stats {
        record.push(s.change_pct.map(|v| v.to_string()).unwrap_or_default());
        record.push(s.change_abs.to_string());
    }
    Ok(record)
}

/// Persists the enriched table. An undefined `Change_%` is an empty cell.
pub fn write_dataset(path: &Path, dataset: &CostDataset) -> Result<(), AppError> {
    write_atomic(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(dataset_header(&dataset.windows))?;
        for row in &dataset.rows {
            writer.write_record(dataset_record(row, &dataset.windows)?)?;
        }
        writer.flush()?;
        Ok(())
    })
}

fn column(headers: &StringRecord, name: &str, path: &Path) -> Result<usize, AppError> {
    headers
        .iter()
        .position(|h| h == name)
        .ok_or_else(|| AppError::MalformedRow {
            path: path.to_path_buf(),
            line: 1,
            message: format!("missing column '{name}'"),
        })
}

struct WindowColumns {
    window: usize,
    ma: usize,
    pct: usize,
    abs: usize,
}

/// Loads an enriched table written by [`write_dataset`]. The window set is
/// recovered from the `MA_*` columns.
pub fn read_dataset(path: &Path) -> Result<CostDataset, AppError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| AppError::csv_at(path, e))?;
    let headers = reader.headers().map_err(|e| AppError::csv_at(path, e))?.clone();

    let project_col = column(&headers, "project_id", path)?;
    let date_col = column(&headers, "usage_date", path)?;
    let cost_col = column(&headers, "total_cost", path)?;

    let mut windows: Vec<usize> = headers
        .iter()
        .filter_map(|h| h.strip_prefix("MA_"))
        .filter_map(|w| w.parse().ok())
        .collect();
    windows.sort_unstable();
    windows.dedup();

    let columns = windows
        .iter()
        .map(|&window| {
            Ok(WindowColumns {
                window,
                ma: column(&headers, &ma_column(window), path)?,
                pct: column(&headers, &pct_column(window), path)?,
                abs: column(&headers, &abs_column(window), path)?,
            })
        })
        .collect::<Result<Vec<_>, AppError>>()?;

    let mut rows = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AppError::csv_at(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let malformed = |message: String| AppError::MalformedRow {
            path: path.to_path_buf(),
            line,
            message,
        };
        let field = |idx: usize| record.get(idx).unwrap_or("");
        let number = |idx: usize| {
            parse_cost(field(idx)).ok_or_else(|| malformed(format!("invalid number '{}'", field(idx))))
        };

        let usage_date = parse_date(field(date_col))
            .ok_or_else(|| malformed(format!("invalid usage_date '{}'", field(date_col))))?;

        let mut stats = Vec::with_capacity(columns.len());
        for c in &columns {
            let change_pct = if field(c.pct).is_empty() {
                None
            } else {
                Some(number(c.pct)?)
            };
            stats.push(WindowStats {
                window: c.window,
                moving_average: number(c.ma)?,
                change_pct,
                change_abs: number(c.abs)?,
            });
        }

        rows.push(EnrichedCostPoint {
            project_id: field(project_col).to_string(),
            usage_date,
            total_cost: number(cost_col)?,
            windows: stats,
        });
    }

    Ok(CostDataset { windows, rows })
}

pub fn stage_daily_forecast(path: &Path, points: &[ForecastPoint]) -> Result<StagedFile, AppError> {
    stage(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["ds", "yhat", "yhat_lower", "yhat_upper"])?;
        for p in points {
            writer.serialize((p.ds, p.yhat, p.yhat_lower, p.yhat_upper))?;
        }
        writer.flush()?;
        Ok(())
    })
}

pub fn stage_monthly_forecast(
    path: &Path,
    totals: &[MonthlyForecastTotal],
) -> Result<StagedFile, AppError> {
    stage(path, |file| {
        let mut writer = csv::Writer::from_writer(file);
        writer.write_record(["month", "monthly_total_cost"])?;
        for t in totals {
            writer.serialize((t.month.to_string(), t.monthly_total_cost))?;
        }
        writer.flush()?;
        Ok(())
    })
}

/// Reads the forecast input: `usage_date,total_cost` (or `ds,y`), sorted by
/// date on return.
pub fn read_series(path: &Path) -> Result<Vec<SeriesPoint>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AppError::csv_at(path, e))?;
    let headers = reader.headers().map_err(|e| AppError::csv_at(path, e))?.clone();
    let date_col = column(&headers, "usage_date", path).or_else(|_| column(&headers, "ds", path))?;
    let value_col = column(&headers, "total_cost", path).or_else(|_| column(&headers, "y", path))?;

    let mut points = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AppError::csv_at(path, e))?;
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        let raw_date = record.get(date_col).unwrap_or("");
        let raw_value = record.get(value_col).unwrap_or("");
        let ds = parse_date(raw_date).ok_or_else(|| AppError::MalformedRow {
            path: path.to_path_buf(),
            line,
            message: format!("unparseable date '{raw_date}'"),
        })?;
        let y = parse_cost(raw_value).ok_or_else(|| AppError::MalformedRow {
            path: path.to_path_buf(),
            line,
            message: format!("non-numeric value '{raw_value}'"),
        })?;
        points.push(SeriesPoint { ds, y });
    }

    points.sort_by_key(|p| p.ds);
    Ok(points)
}
