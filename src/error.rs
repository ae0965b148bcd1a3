use crate::forecast::ForecastError;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("no data: {0}")]
    NoData(String),

    #[error("malformed row in {} (line {line}): {message}", path.display())]
    MalformedRow {
        path: PathBuf,
        line: u64,
        message: String,
    },

    #[error("cannot read {}: {source}", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rows out of order: {0}")]
    Unsorted(String),

    #[error("forecast error: {0}")]
    Forecast(#[from] ForecastError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),

    #[error(transparent)]
    Persist(#[from] tempfile::PersistError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    TomlDe(#[from] toml::de::Error),

    #[error(transparent)]
    TomlSer(#[from] toml::ser::Error),
}

impl AppError {
    /// Attaches `path` to a CSV error: I/O failures become [`AppError::Unreadable`],
    /// everything else a [`AppError::MalformedRow`] at the reported line.
    pub fn csv_at(path: &Path, err: csv::Error) -> Self {
        if let csv::ErrorKind::Io(io) = err.kind() {
            return AppError::Unreadable {
                path: path.to_path_buf(),
                source: std::io::Error::new(io.kind(), io.to_string()),
            };
        }
        AppError::MalformedRow {
            path: path.to_path_buf(),
            line: err.position().map(|p| p.line()).unwrap_or(1),
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn csv_errors_name_the_file() {
        let path = Path::new("exports/2023_01_data_0.csv");
        let mut reader = csv::Reader::from_reader(&b"a,b\n1,2,3\n"[..]);
        let err = reader
            .records()
            .find_map(|r| r.err())
            .expect("ragged row");
        let mapped = AppError::csv_at(path, err);
        assert!(matches!(mapped, AppError::MalformedRow { line: 2, .. }), "{mapped:?}");
        assert!(mapped.to_string().contains("2023_01_data_0.csv"));

        let missing = match csv::Reader::from_path("does/not/exist.csv") {
            Err(e) => e,
            Ok(_) => panic!("expected a missing file"),
        };
        let mapped = AppError::csv_at(Path::new("does/not/exist.csv"), missing);
        assert!(matches!(mapped, AppError::Unreadable { .. }));
        assert!(mapped.to_string().contains("does/not/exist.csv"));
    }
}
