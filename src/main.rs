mod config;
mod discovery;
mod error;
mod forecast;
mod ingest;
mod logging;
mod models;
mod pipeline;
mod rolling;
mod storage;
mod ui;
mod view;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use config::{ensure_initialized, load_config, AppConfig};
use error::AppError;
use pipeline::{run_forecast, run_process, ForecastRequest, ProcessRequest};
use std::collections::BTreeSet;
use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use storage::read_dataset;
use ui::run::run_dashboard;
use view::{apply_filters, available_dates, ChangeType, FilterParams, ViewRow};

#[derive(Debug, Parser)]
#[command(name = "costscope")]
#[command(about = "Cloud billing export analysis and cost forecasting")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    Init,
    /// Aggregate monthly exports and compute moving averages.
    Process {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        start: Option<models::YearMonth>,
        #[arg(long)]
        end: Option<models::YearMonth>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Fit the seasonal model and write daily and monthly forecasts.
    Forecast {
        #[arg(long = "input")]
        input: PathBuf,
        #[arg(long = "daily_output")]
        daily_output: PathBuf,
        #[arg(long = "monthly_output")]
        monthly_output: PathBuf,
        #[arg(long = "plot_output")]
        plot_output: Option<PathBuf>,
    },
    Dashboard {
        #[arg(long)]
        input: Option<PathBuf>,
    },
    /// Print the filtered view of the processed table.
    Export {
        #[arg(long)]
        input: Option<PathBuf>,
        #[arg(long)]
        window: Option<usize>,
        #[arg(long)]
        date: Option<NaiveDate>,
        #[arg(long, default_value = "both")]
        change_type: String,
        #[arg(long, default_value_t = 0.0)]
        min_pct: f64,
        #[arg(long)]
        min_dollar: Option<f64>,
        #[arg(long)]
        max_dollar: Option<f64>,
        #[arg(long = "project")]
        projects: Vec<String>,
        #[arg(long, default_value = "json")]
        format: String,
    },
}

fn process_request(
    cfg: &AppConfig,
    data_dir: Option<PathBuf>,
    start: Option<models::YearMonth>,
    end: Option<models::YearMonth>,
    output: Option<PathBuf>,
) -> ProcessRequest {
    let mut req = ProcessRequest::from_config(cfg);
    if let Some(dir) = data_dir {
        req.data_dir = dir;
    }
    if let Some(start) = start {
        req.start = start;
    }
    if let Some(end) = end {
        req.end = end;
    }
    if let Some(output) = output {
        req.output = output;
    }
    req
}

fn validate_change_type(input: &str) -> Result<ChangeType, AppError> {
    ChangeType::parse(input).ok_or_else(|| {
        AppError::Config("Unsupported change type. Use increase, decrease, or both.".into())
    })
}

fn dollar_range(min: Option<f64>, max: Option<f64>) -> Option<(f64, f64)> {
    match (min, max) {
        (None, None) => None,
        (lo, hi) => Some((lo.unwrap_or(f64::NEG_INFINITY), hi.unwrap_or(f64::INFINITY))),
    }
}

fn print_rows(rows: &[ViewRow], format: &str) -> Result<(), AppError> {
    if format.eq_ignore_ascii_case("json") {
        println!("{}", serde_json::to_string_pretty(rows)?);
    } else if format.eq_ignore_ascii_case("csv") {
        let mut writer = csv::Writer::from_writer(io::stdout());
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    } else {
        return Err(AppError::Config(
            "Unsupported export format. Use json or csv".into(),
        ));
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let default_level = match cli.command {
        Commands::Dashboard { .. } => "warn",
        _ => "info",
    };
    logging::init(default_level);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    match cli.command {
        Commands::Init => {
            ensure_initialized()?;
            println!(
                "Initialized costscope config at {}",
                config::config_path()?.display()
            );
        }
        Commands::Process {
            data_dir,
            start,
            end,
            output,
        } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let req = process_request(&cfg, data_dir, start, end, output);
            let summary = run_process(&req)?;
            println!(
                "Processed {} files ({} rows) into {} points for {} projects: {}",
                summary.files,
                summary.raw_rows,
                summary.points,
                summary.projects,
                summary.output.display()
            );
        }
        Commands::Forecast {
            input,
            daily_output,
            monthly_output,
            plot_output,
        } => {
            if !input.is_file() {
                return Err(AppError::Config(format!(
                    "input file {} does not exist or is not readable",
                    input.display()
                )));
            }
            ensure_initialized()?;
            let cfg = load_config()?;
            let req = ForecastRequest {
                input,
                daily_output,
                monthly_output,
                plot_output: plot_output.unwrap_or_else(|| cfg.forecast.plot_path.clone()),
                horizon_days: cfg.forecast.horizon_days,
                interval_width: cfg.forecast.interval_width,
            };
            let summary = run_forecast(&req)?;
            println!(
                "Forecast {} days from {} observations across {} months",
                summary.forecast_rows, summary.observations, summary.months
            );
        }
        Commands::Dashboard { input } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let input = input.unwrap_or_else(|| cfg.ingest.output_path.clone());
            run_dashboard(&input, cfg.dashboard.trend_days)?;
        }
        Commands::Export {
            input,
            window,
            date,
            change_type,
            min_pct,
            min_dollar,
            max_dollar,
            projects,
            format,
        } => {
            ensure_initialized()?;
            let cfg = load_config()?;
            let change_type = validate_change_type(&change_type)?;
            let input = input.unwrap_or_else(|| cfg.ingest.output_path.clone());
            let dataset = read_dataset(&input)?;

            let window = match window {
                Some(w) if dataset.windows.contains(&w) => w,
                Some(w) => {
                    return Err(AppError::Config(format!(
                        "window {w} is not in {}; available: {:?}",
                        input.display(),
                        dataset.windows
                    )))
                }
                None => dataset.windows.first().copied().ok_or_else(|| {
                    AppError::NoData(format!("{} has no moving-average columns", input.display()))
                })?,
            };
            let date = match date {
                Some(d) => d,
                None => available_dates(&dataset, window).first().copied().ok_or_else(|| {
                    AppError::NoData(format!(
                        "no dates at least {window} days after the first row in {}",
                        input.display()
                    ))
                })?,
            };

            let params = FilterParams {
                window,
                date,
                change_type,
                min_change_pct: min_pct,
                dollar_range: dollar_range(min_dollar, max_dollar),
                projects: (!projects.is_empty())
                    .then(|| projects.into_iter().collect::<BTreeSet<String>>()),
            };
            print_rows(&apply_filters(&dataset, &params), &format)?;
        }
    }

    Ok(())
}
