//! Error types for the session and its transport
use std::path::PathBuf;
use thiserror::Error;

/// User-correctable problems. Never turned into conversation entries.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InputError {
    #[error("no file selected")]
    NoFileSelected,
}

/// A failed round trip to the analyst backend
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("backend returned status {status}")]
    Status { status: u16, detail: Option<String> },

    #[error("request failed: {0}")]
    Network(#[source] reqwest::Error),

    #[error("could not decode backend response: {0}")]
    Decode(#[source] reqwest::Error),

    #[error("could not read {path:?}: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("request task ended unexpectedly: {0}")]
    Aborted(String),
}

impl TransportError {
    /// Structured error message supplied by the backend, if any
    pub fn detail(&self) -> Option<&str> {
        match self {
            TransportError::Status { detail, .. } => detail.as_deref(),
            _ => None,
        }
    }
}

impl From<tokio::task::JoinError> for TransportError {
    fn from(err: tokio::task::JoinError) -> Self {
        TransportError::Aborted(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Input(#[from] InputError),

    #[error(transparent)]
    Transport(#[from] TransportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detail_only_on_status_errors() {
        let with_detail = TransportError::Status {
            status: 400,
            detail: Some("bad column".to_string()),
        };
        assert_eq!(with_detail.detail(), Some("bad column"));

        let without = TransportError::Status { status: 502, detail: None };
        assert_eq!(without.detail(), None);

        let aborted = TransportError::Aborted("panicked".to_string());
        assert_eq!(aborted.detail(), None);
    }

    #[test]
    fn test_input_error_message() {
        let err: SessionError = InputError::NoFileSelected.into();
        assert_eq!(err.to_string(), "no file selected");
    }
}
