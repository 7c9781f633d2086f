use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn a file on disk into a cell grid.
#[derive(Debug, Error)]
pub enum SheetError {
    #[error("failed to open sheet {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("malformed row {row} in {path}: {source}")]
    Row {
        path: PathBuf,
        row: usize,
        #[source]
        source: csv::Error,
    },
}

/// Failure to load a scoring configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Failure to write the per-student CSV export.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("failed to create export {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write export {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },
}
