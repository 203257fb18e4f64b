//! Error taxonomy for the graph pipeline

use std::path::PathBuf;

use thiserror::Error;

use crate::model::{Language, SkippedFile};

pub type Result<T> = std::result::Result<T, GraphError>;

/// Fatal errors. A run that returns one of these produced no schema at all.
#[derive(Debug, Error)]
pub enum GraphError {
    /// The selected backend needs an interpreter or library that is not installed.
    #[error("{runtime} runtime unavailable: {reason}. {hint}")]
    RuntimeUnavailable {
        runtime: String,
        reason: String,
        hint: String,
    },

    /// No backend is registered for this language.
    #[error("no parser backend for language `{0}`")]
    LanguageUnsupported(Language),

    /// The repository root cannot be inspected at all.
    #[error("cannot analyse {}: {reason}", path.display())]
    MalformedProject { path: PathBuf, reason: String },

    #[error("invalid parse options: {0}")]
    InvalidOptions(String),

    #[error("invalid config file {}: {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("parse cancelled")]
    Cancelled,
}

impl GraphError {
    pub fn malformed(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        GraphError::MalformedProject {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Per-file failure inside a backend. Recovered locally: the file is skipped.
#[derive(Debug, Error)]
pub enum FileProcessingError {
    #[error("{path}: read failed: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: not valid UTF-8")]
    Encoding { path: String },

    #[error("{path}: syntax error: {message}")]
    Syntax { path: String, message: String },

    #[error("{path}: could not start `{program}`: {source}")]
    Spawn {
        path: String,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: interpreter exited with {status}: {stderr}")]
    Interpreter {
        path: String,
        status: String,
        stderr: String,
    },

    #[error("{path}: timed out after {seconds}s")]
    Timeout { path: String, seconds: u64 },

    #[error("{path}: unreadable extractor output: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("{path}: cancelled")]
    Cancelled { path: String },
}

impl FileProcessingError {
    pub fn path(&self) -> &str {
        match self {
            FileProcessingError::Read { path, .. }
            | FileProcessingError::Encoding { path }
            | FileProcessingError::Syntax { path, .. }
            | FileProcessingError::Spawn { path, .. }
            | FileProcessingError::Interpreter { path, .. }
            | FileProcessingError::Timeout { path, .. }
            | FileProcessingError::Decode { path, .. }
            | FileProcessingError::Cancelled { path } => path,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, FileProcessingError::Cancelled { .. })
    }
}

impl From<&FileProcessingError> for SkippedFile {
    fn from(err: &FileProcessingError) -> Self {
        SkippedFile {
            path: err.path().to_string(),
            reason: err.to_string(),
        }
    }
}
