//! Error type for the edgequake-docconv library.
//!
//! Every failure a conversion job can hit is a [`ConvertError`]. Each variant
//! maps to exactly one HTTP status and one client-visible message via
//! [`ConvertError::status`] and [`ConvertError::client_message`].
//!
//! Cleanup failures have no variant. They are logged where they happen.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;
use tracing::error;

/// Message returned when the converter exits non-zero without writing to stderr.
pub const GENERIC_CONVERSION_FAILURE: &str = "Conversion failed";

/// Message returned when the converter exits zero but the artifact is absent.
pub const MISSING_OUTPUT_MESSAGE: &str = "Conversion failed to produce an output file";

/// All errors returned by the edgequake-docconv library.
#[derive(Debug, Error)]
pub enum ConvertError {
    // ── Request errors ────────────────────────────────────────────────────
    /// The request is missing the upload or a required field.
    #[error("{0}")]
    Validation(String),

    // ── Converter errors ──────────────────────────────────────────────────
    /// The external converter exited with a non-zero status.
    ///
    /// `stderr` is exactly what the converter printed; it is the only
    /// diagnostic available and is surfaced to the caller unmodified.
    #[error("Converter exited with {status}: {stderr}")]
    ConversionExecution { status: String, stderr: String },

    /// The converter exited zero but the derived output path does not exist.
    #[error("Converter reported success but '{path}' was not produced")]
    MissingOutput { path: PathBuf },

    /// The converter did not finish within the configured deadline and was killed.
    #[error("Conversion timed out after {secs}s")]
    ConversionTimeout { secs: u64 },

    /// The converter program could not be spawned at all.
    #[error("Failed to start converter '{program}': {source}\nIs LibreOffice installed and on PATH?")]
    ConverterUnavailable {
        program: String,
        #[source]
        source: std::io::Error,
    },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Reading the converted artifact for the response failed.
    #[error("Failed to send file: {0}")]
    Transfer(#[source] std::io::Error),

    /// The uploads or converted-files area could not be written.
    #[error("Failed to write '{path}': {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ConvertError {
    /// HTTP status this error is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ConvertError::Validation(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The human-readable string placed in the `error` field of the JSON body.
    ///
    /// Storage and internal errors carry file paths, so the caller only gets
    /// a generic message; the detail goes to the log.
    pub fn client_message(&self) -> String {
        match self {
            ConvertError::Validation(m) => m.clone(),
            ConvertError::ConversionExecution { stderr, .. } => {
                if stderr.trim().is_empty() {
                    GENERIC_CONVERSION_FAILURE.to_string()
                } else {
                    stderr.clone()
                }
            }
            ConvertError::MissingOutput { .. } => MISSING_OUTPUT_MESSAGE.to_string(),
            ConvertError::ConversionTimeout { .. } | ConvertError::Transfer(_) => self.to_string(),
            ConvertError::ConverterUnavailable { program, .. } => {
                format!("Converter '{program}' could not be started")
            }
            ConvertError::Storage { .. } => "Failed to store file".to_string(),
            ConvertError::InvalidConfig(_) | ConvertError::Internal(_) => {
                "internal server error".to_string()
            }
        }
    }
}

/// JSON body of every error response: `{ "error": "<message>" }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ConvertError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "conversion request failed");
        }
        let body = ErrorBody {
            error: self.client_message(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_is_bad_request() {
        let e = ConvertError::Validation("No file uploaded".into());
        assert_eq!(e.status(), StatusCode::BAD_REQUEST);
        assert_eq!(e.client_message(), "No file uploaded");
    }

    #[test]
    fn execution_error_surfaces_stderr_verbatim() {
        let e = ConvertError::ConversionExecution {
            status: "exit status: 1".into(),
            stderr: "Error: source file could not be loaded\n".into(),
        };
        assert_eq!(e.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            e.client_message(),
            "Error: source file could not be loaded\n"
        );
    }

    #[test]
    fn execution_error_without_stderr_is_generic() {
        let e = ConvertError::ConversionExecution {
            status: "exit status: 77".into(),
            stderr: "  \n".into(),
        };
        assert_eq!(e.client_message(), GENERIC_CONVERSION_FAILURE);
    }

    #[test]
    fn transfer_message_includes_io_error() {
        let e = ConvertError::Transfer(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "gone",
        ));
        let msg = e.client_message();
        assert!(msg.starts_with("Failed to send file: "), "got: {msg}");
        assert!(msg.contains("gone"), "got: {msg}");
    }

    #[test]
    fn storage_error_hides_path() {
        let e = ConvertError::Storage {
            path: PathBuf::from("/srv/secret/uploads/abc"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(!e.client_message().contains("/srv/secret"));
        assert!(e.to_string().contains("/srv/secret"));
    }

    #[test]
    fn timeout_display() {
        let e = ConvertError::ConversionTimeout { secs: 30 };
        assert!(e.client_message().contains("30s"));
    }
}
