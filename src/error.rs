use std::path::{Path, PathBuf};

use uuid::Uuid;

/// Run-level failures. Anything raised here aborts the `load`/`process` call;
/// formula failures never reach this type (see [`crate::engine::FieldDiagnostic`]).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Unsupported {kind} format for {path:?}: use .json, .yaml or .yml")]
    UnsupportedFormat { kind: &'static str, path: PathBuf },

    #[error("I/O failure on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid {kind} {path:?}: {detail}")]
    InvalidDocument {
        kind: &'static str,
        path: PathBuf,
        detail: String,
    },

    #[error("{context}: {source}")]
    Csv {
        context: String,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to decode {path:?} as {encoding}")]
    Decode {
        path: PathBuf,
        encoding: &'static str,
    },

    #[error("Unknown encoding '{0}'")]
    UnknownEncoding(String),

    #[error("Duplicate reference key '{key}' in column '{column}'")]
    DuplicateReferenceKey { column: String, key: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Output {path:?} is already being written by job {job}")]
    OutputBusy { path: PathBuf, job: Uuid },
}

impl EngineError {
    pub fn io(path: &Path, source: std::io::Error) -> Self {
        EngineError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn csv(context: impl Into<String>, source: csv::Error) -> Self {
        EngineError::Csv {
            context: context.into(),
            source,
        }
    }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
