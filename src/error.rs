use std::time::Duration;

use thiserror::Error;

/// Why a single listing block was dropped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("missing required field `{field}`")]
    MissingRequiredField { field: &'static str },
}

/// Coarse error kinds the pagination driver dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    RenderTimeout,
    FetchFailure,
    FatalSetupFailure,
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    #[error("render marker `{marker}` did not appear within {timeout:?}")]
    RenderTimeout { marker: String, timeout: Duration },

    #[error("failed to fetch {url}: {source}")]
    FetchFailure {
        url: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("renderer setup failed: {0}")]
    FatalSetupFailure(String),
}

impl ScrapeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ScrapeError::RenderTimeout { .. } => ErrorKind::RenderTimeout,
            ScrapeError::FetchFailure { .. } => ErrorKind::FetchFailure,
            ScrapeError::FatalSetupFailure(_) => ErrorKind::FatalSetupFailure,
        }
    }

    pub fn fetch(url: &str, source: impl Into<anyhow::Error>) -> Self {
        ScrapeError::FetchFailure {
            url: url.to_string(),
            source: source.into(),
        }
    }
}
