//! Error types for retina-server crate.

use axum::Json;
use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use retina_inference::InferenceError;
use serde::Serialize;
use thiserror::Error;
use tracing::warn;

/// Errors raised while assembling the server configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Path to the config file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid TOML for [`ServerConfig`](crate::ServerConfig).
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is out of range or inconsistent.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Creates a read error.
    #[must_use]
    pub fn read(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Creates an invalid value error.
    #[must_use]
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }
}

/// Per-request failures. Every variant is answered with `400 {"detail": ...}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The request was not usable multipart data.
    #[error("{0}")]
    BadRequest(String),

    /// No field in the form carried a file.
    #[error("no image uploaded: send the image as multipart field `file`")]
    MissingFile,

    /// Decoding, preprocessing or the forward pass failed.
    #[error(transparent)]
    Inference(#[from] InferenceError),

    /// The blocking inference task did not complete.
    #[error("inference task failed: {0}")]
    Task(String),
}

impl ApiError {
    /// Creates a bad request error.
    #[must_use]
    pub fn bad_request(reason: impl Into<String>) -> Self {
        Self::BadRequest(reason.into())
    }

    /// Creates a task failure error.
    #[must_use]
    pub fn task(reason: impl Into<String>) -> Self {
        Self::Task(reason.into())
    }
}

impl From<MultipartError> for ApiError {
    fn from(err: MultipartError) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            Self::BadRequest(format!("upload too large: {}", err.body_text()))
        } else {
            Self::BadRequest(err.body_text())
        }
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::BadRequest(rejection.body_text())
    }
}

/// JSON body of every error response.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Failure message.
    pub detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let detail = self.to_string();
        warn!(%detail, "rejected prediction request");
        (StatusCode::BAD_REQUEST, Json(ErrorBody { detail })).into_response()
    }
}
