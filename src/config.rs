use crate::error::AppError;
use crate::models::{YearMonth, DEFAULT_WINDOWS};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const SERVICE_NAME: &str = "costscope";
pub const HOME_ENV: &str = "COSTSCOPE_HOME";

fn app_home_dir() -> Result<PathBuf, AppError> {
    if let Ok(custom) = std::env::var(HOME_ENV) {
        return Ok(PathBuf::from(custom));
    }

    if let Some(dirs) = ProjectDirs::from("com", "costscope", SERVICE_NAME) {
        let candidate = dirs.data_local_dir().to_path_buf();
        if fs::create_dir_all(&candidate).is_ok() {
            return Ok(candidate);
        }
    }

    let cwd = std::env::current_dir()?;
    Ok(cwd.join(".costscope"))
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub ingest: IngestSettings,
    pub forecast: ForecastSettings,
    pub dashboard: DashboardSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestSettings {
    pub data_dir: PathBuf,
    pub start_month: YearMonth,
    pub end_month: YearMonth,
    pub output_path: PathBuf,
    pub windows: Vec<usize>,
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("exports"),
            start_month: YearMonth { year: 2022, month: 9 },
            end_month: YearMonth { year: 2023, month: 9 },
            output_path: PathBuf::from("processed_data.csv"),
            windows: DEFAULT_WINDOWS.to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ForecastSettings {
    pub horizon_days: u32,
    pub interval_width: f64,
    pub plot_path: PathBuf,
}

impl Default for ForecastSettings {
    fn default() -> Self {
        Self {
            horizon_days: 730,
            interval_width: 0.95,
            plot_path: PathBuf::from("forecast_plot.svg"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DashboardSettings {
    pub trend_days: usize,
}

impl Default for DashboardSettings {
    fn default() -> Self {
        Self { trend_days: 120 }
    }
}

pub fn config_dir() -> Result<PathBuf, AppError> {
    Ok(app_home_dir()?.join("config"))
}

pub fn config_path() -> Result<PathBuf, AppError> {
    Ok(config_dir()?.join("config.toml"))
}

pub fn ensure_dirs() -> Result<(), AppError> {
    fs::create_dir_all(config_dir()?)?;
    Ok(())
}

/// Sorts and dedupes the window set, dropping zero-length windows.
pub fn normalize_windows(windows: &[usize]) -> Vec<usize> {
    let mut out: Vec<usize> = windows.iter().copied().filter(|w| *w > 0).collect();
    out.sort_unstable();
    out.dedup();
    out
}

fn normalize_config(config: &mut AppConfig) -> bool {
    let normalized = normalize_windows(&config.ingest.windows);
    let changed = normalized != config.ingest.windows;
    config.ingest.windows = normalized;
    changed
}

pub fn validate_config(config: &AppConfig) -> Result<(), AppError> {
    let ingest = &config.ingest;
    if ingest.start_month > ingest.end_month {
        return Err(AppError::Config(format!(
            "start_month {} is after end_month {}",
            ingest.start_month, ingest.end_month
        )));
    }
    if normalize_windows(&ingest.windows).is_empty() {
        return Err(AppError::Config(
            "at least one positive moving-average window is required".into(),
        ));
    }
    let width = config.forecast.interval_width;
    if !(width > 0.0 && width < 1.0) {
        return Err(AppError::Config(format!(
            "interval_width must be between 0 and 1, got {width}"
        )));
    }
    Ok(())
}

pub fn load_config() -> Result<AppConfig, AppError> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(AppConfig::default());
    }

    let raw_str = fs::read_to_string(&path)?;
    let mut parsed: AppConfig = toml::from_str(&raw_str)?;

    // Persist the normalized window list so the file matches what runs.
    if normalize_config(&mut parsed) {
        save_config(&parsed)?;
    }

    validate_config(&parsed)?;
    Ok(parsed)
}

pub fn save_config(config: &AppConfig) -> Result<(), AppError> {
    ensure_dirs()?;
    let path = config_path()?;
    let raw = toml::to_string_pretty(config)?;
    fs::write(path, raw)?;
    Ok(())
}

pub fn ensure_initialized() -> Result<(), AppError> {
    ensure_dirs()?;
    let cfg_path = config_path()?;
    if !Path::new(&cfg_path).exists() {
        save_config(&AppConfig::default())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_windows_sorts_dedupes_and_drops_zero() {
        assert_eq!(normalize_windows(&[30, 7, 0, 30, 15]), vec![7, 15, 30]);
    }

    #[test]
    fn normalize_config_reports_changes() {
        let mut cfg = AppConfig::default();
        assert!(!normalize_config(&mut cfg));

        cfg.ingest.windows = vec![120, 7, 7];
        assert!(normalize_config(&mut cfg));
        assert_eq!(cfg.ingest.windows, vec![7, 120]);
    }

    #[test]
    fn validate_rejects_inverted_month_range() {
        let mut cfg = AppConfig::default();
        cfg.ingest.start_month = YearMonth { year: 2024, month: 1 };
        cfg.ingest.end_month = YearMonth { year: 2023, month: 12 };
        let err = validate_config(&cfg).expect_err("inverted range");
        assert!(err.to_string().contains("is after end_month"));
    }

    #[test]
    fn validate_rejects_empty_windows_and_bad_interval() {
        let mut cfg = AppConfig::default();
        cfg.ingest.windows = vec![0];
        assert!(validate_config(&cfg).is_err());

        let mut cfg = AppConfig::default();
        cfg.forecast.interval_width = 1.0;
        assert!(validate_config(&cfg).is_err());
    }

    #[test]
    fn partial_config_falls_back_to_defaults() {
        let cfg: AppConfig = toml::from_str(
            r#"
            [ingest]
            data_dir = "/srv/exports"
            start_month = "2023_01"
            "#,
        )
        .expect("parse partial config");
        assert_eq!(cfg.ingest.data_dir, PathBuf::from("/srv/exports"));
        assert_eq!(cfg.ingest.start_month, YearMonth { year: 2023, month: 1 });
        assert_eq!(cfg.ingest.end_month, YearMonth { year: 2023, month: 9 });
        assert_eq!(cfg.forecast.horizon_days, 730);
        assert_eq!(cfg.dashboard.trend_days, 120);
    }

    #[test]
    fn default_config_survives_toml_round_trip() {
        let raw = toml::to_string_pretty(&AppConfig::default()).expect("serialize");
        let back: AppConfig = toml::from_str(&raw).expect("parse");
        assert_eq!(back, AppConfig::default());
    }
}
