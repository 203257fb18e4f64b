//! The capability interface every parser backend implements

use std::path::Path;

use grove_core::{CancellationFlag, CodeGraphSchema, Language, ParseOptions, Result};
use serde::Serialize;

/// Outcome of a runtime probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Availability {
    Available,
    Unavailable { reason: String },
}

impl Availability {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Availability::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        matches!(self, Availability::Available)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            Availability::Available => None,
            Availability::Unavailable { reason } => Some(reason),
        }
    }
}

pub trait ParserBackend {
    fn language(&self) -> Language;

    /// Check that everything the backend needs at runtime is installed.
    fn probe(&self) -> Availability;

    /// Build a schema for the repository at `root`. `root` is already
    /// canonicalised and probed.
    fn parse(&self, root: &Path, options: &ParseOptions, cancel: &CancellationFlag) -> Result<CodeGraphSchema>;
}
