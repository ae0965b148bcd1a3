use crate::config::{normalize_windows, AppConfig};
use crate::discovery::discover_files;
use crate::error::AppError;
use crate::forecast::plot::render_svg;
use crate::forecast::seasonal::SeasonalModel;
use crate::forecast::{future_dates, monthly_totals, FittedModel, Forecaster};
use crate::ingest::{aggregate, read_usage_file};
use crate::models::{CostDataset, YearMonth};
use crate::rolling::enrich;
use crate::storage::{
    commit_all, read_series, stage, stage_daily_forecast, stage_monthly_forecast, write_dataset,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, info_span};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRequest {
    pub data_dir: PathBuf,
    pub start: YearMonth,
    pub end: YearMonth,
    pub output: PathBuf,
    pub windows: Vec<usize>,
}

impl ProcessRequest {
    pub fn from_config(cfg: &AppConfig) -> Self {
        Self {
            data_dir: cfg.ingest.data_dir.clone(),
            start: cfg.ingest.start_month,
            end: cfg.ingest.end_month,
            output: cfg.ingest.output_path.clone(),
            windows: cfg.ingest.windows.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessSummary {
    pub files: usize,
    pub raw_rows: usize,
    pub points: usize,
    pub projects: usize,
    pub output: PathBuf,
}

fn file_progress(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let style = ProgressStyle::with_template("{spinner:.green} {msg} [{bar:30}] {pos}/{len} files")
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message("Reading CSVs");
    pb
}

/// Discovers, aggregates and enriches the exports, then writes the table.
/// Nothing is written unless every stage succeeds.
pub fn run_process(req: &ProcessRequest) -> Result<ProcessSummary, AppError> {
    let _span = info_span!("process").entered();

    if req.start > req.end {
        return Err(AppError::Config(format!(
            "start month {} is after end month {}",
            req.start, req.end
        )));
    }
    let windows = normalize_windows(&req.windows);
    if windows.is_empty() {
        return Err(AppError::Config(
            "at least one positive moving-average window is required".into(),
        ));
    }

    let files = discover_files(&req.data_dir, req.start, req.end)?;
    if files.is_empty() {
        return Err(AppError::NoData(format!(
            "no export files between {} and {} in {}",
            req.start,
            req.end,
            req.data_dir.display()
        )));
    }
    info!(count = files.len(), start = %req.start, end = %req.end, "matched export files");
    for f in &files {
        info!(file = %f.display(), "queued");
    }

    let pb = file_progress(files.len());
    let mut records = Vec::new();
    for path in &files {
        let rows = match read_usage_file(path) {
            Ok(rows) => rows,
            Err(e) => {
                pb.abandon();
                return Err(e);
            }
        };
        info!(file = %path.display(), rows = rows.len(), "loaded");
        records.extend(rows);
        pb.inc(1);
    }
    pb.finish_and_clear();

    let raw_rows = records.len();
    if raw_rows == 0 {
        return Err(AppError::NoData(format!(
            "{} matched files contain no rows",
            files.len()
        )));
    }

    let points = aggregate(records);
    info!(raw_rows, points = points.len(), "aggregated by project and date");

    let rows = enrich(&points, &windows)?;
    let dataset = CostDataset { windows, rows };
    let projects = dataset.project_ids().len();
    info!(projects, windows = ?dataset.windows, "computed moving averages and changes");

    write_dataset(&req.output, &dataset)?;
    info!(output = %req.output.display(), "processing complete");

    Ok(ProcessSummary {
        files: files.len(),
        raw_rows,
        points: dataset.rows.len(),
        projects,
        output: req.output.clone(),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastRequest {
    pub input: PathBuf,
    pub daily_output: PathBuf,
    pub monthly_output: PathBuf,
    pub plot_output: PathBuf,
    pub horizon_days: u32,
    pub interval_width: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSummary {
    pub observations: usize,
    pub forecast_rows: usize,
    pub months: usize,
}

/// Fits the seasonal model to `req.input` and writes the daily and monthly
/// forecasts plus the chart. All three are staged before any is committed.
pub fn run_forecast(req: &ForecastRequest) -> Result<ForecastSummary, AppError> {
    let _span = info_span!("forecast").entered();

    if !req.input.is_file() {
        return Err(AppError::Config(format!(
            "input file {} does not exist or is not readable",
            req.input.display()
        )));
    }

    let series = read_series(&req.input)?;
    info!(observations = series.len(), input = %req.input.display(), "loaded cost series");

    let model = SeasonalModel::default().with_interval_width(req.interval_width);
    let fit = model.fit(&series)?;
    let dates = future_dates(&series, req.horizon_days)?;
    let forecast = fit.predict(&dates)?;
    let monthly = monthly_totals(&forecast);
    info!(
        rows = forecast.len(),
        months = monthly.len(),
        last_observed = %fit.last_observed(),
        periods = ?fit.periods(),
        "forecast complete"
    );

    let svg = render_svg(&series, &forecast, fit.last_observed());
    let staged = vec![
        stage_daily_forecast(&req.daily_output, &forecast)?,
        stage_monthly_forecast(&req.monthly_output, &monthly)?,
        stage(&req.plot_output, |file| {
            file.write_all(svg.as_bytes())?;
            Ok(())
        })?,
    ];
    commit_all(staged)?;
    info!(
        daily = %req.daily_output.display(),
        monthly = %req.monthly_output.display(),
        plot = %req.plot_output.display(),
        "wrote forecast outputs"
    );

    Ok(ForecastSummary {
        observations: series.len(),
        forecast_rows: forecast.len(),
        months: monthly.len(),
    })
}
