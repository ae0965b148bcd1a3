//! Export file discovery and month-range filtering.

use crate::error::AppError;
use crate::models::YearMonth;
use regex::Regex;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{debug, warn};

static EXPORT_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d{4}_\d{2})_data_.*\.csv$").expect("static export file pattern")
});

/// Why a directory entry was not selected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    PatternMismatch,
    BadMonthToken(String),
    OutOfRange(YearMonth),
}

/// Classifies one file name against the `YYYY_MM_data_*.csv` convention.
pub fn classify(file_name: &str, start: YearMonth, end: YearMonth) -> Result<YearMonth, Skip> {
    let caps = EXPORT_NAME
        .captures(file_name)
        .ok_or(Skip::PatternMismatch)?;
    let token = &caps[1];
    let month: YearMonth = token
        .parse()
        .map_err(|_| Skip::BadMonthToken(token.to_string()))?;
    if month < start || month > end {
        return Err(Skip::OutOfRange(month));
    }
    Ok(month)
}

/// Returns the export files in `dir` whose month lies in `[start, end]`, sorted
/// by file name. Unrecognized names are logged and skipped.
pub fn discover_files(
    dir: &Path,
    start: YearMonth,
    end: YearMonth,
) -> Result<Vec<PathBuf>, AppError> {
    let entries = fs::read_dir(dir).map_err(|e| {
        AppError::Io(std::io::Error::new(
            e.kind(),
            format!("cannot read export directory {}: {e}", dir.display()),
        ))
    })?;

    let mut selected = Vec::new();
    for entry in entries {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            warn!(path = %path.display(), "skipping file with non UTF-8 name");
            continue;
        };

        match classify(name, start, end) {
            Ok(month) => {
                debug!(file = name, %month, "selected export file");
                selected.push(path);
            }
            Err(Skip::PatternMismatch) => {
                warn!(file = name, "skipping file: name does not match YYYY_MM_data_*.csv");
            }
            Err(Skip::BadMonthToken(token)) => {
                warn!(file = name, token = %token, "skipping file: invalid date format");
            }
            Err(Skip::OutOfRange(month)) => {
                debug!(file = name, %month, "file outside month range");
            }
        }
    }

    selected.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    Ok(selected)
}
