//! Error types for the resolution and attribution pipeline.

use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Nothing survived the entity-string filter, so there is nothing to resolve.
    #[error("Could not find any characters: {0}")]
    NoCharacters(String),

    /// The edge scoring model is missing or cannot be decoded.
    #[error("Edge scorer unavailable ({path}): {reason}")]
    ScorerUnavailable { path: PathBuf, reason: String },

    /// A required gazetteer/lexicon file is missing or malformed.
    #[error("Language resource {path}: {reason}")]
    Resource { path: PathBuf, reason: String },

    /// Corpus annotations that cannot be used even with best-effort recovery.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn resource(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Resource {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn scorer(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::ScorerUnavailable {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Fatal configuration errors abort the whole run.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Error::NoCharacters(_) | Error::ScorerUnavailable { .. } | Error::Resource { .. }
        )
    }
}
