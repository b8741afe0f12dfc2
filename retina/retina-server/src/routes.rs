//! HTTP handlers.

use std::time::Instant;

use axum::Json;
use axum::body::Bytes;
use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use retina_types::Prediction;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiError;
use crate::state::AppState;

/// Canonical multipart field name for the uploaded image.
pub const UPLOAD_FIELD: &str = "file";

/// Message returned by `GET /`.
pub const GREETING: &str = "Retinal DR Classification API";

/// Body of `GET /`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Greeting {
    /// Service banner.
    pub message: String,
}

/// `GET /`
pub async fn root() -> Json<Greeting> {
    Json(Greeting {
        message: GREETING.to_string(),
    })
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `POST /predict`
///
/// Reads the first file field of a multipart form, grades it on a blocking
/// thread and returns the [`Prediction`].
///
/// # Errors
///
/// Every failure is returned as [`ApiError`], answered with 400.
pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let (name, image) = read_upload(&mut multipart?).await?;
    let classifier = state.classifier();
    let start = Instant::now();

    let prediction = tokio::task::spawn_blocking(move || classifier.classify(&image))
        .await
        .map_err(|e| ApiError::task(e.to_string()))??;

    info!(
        upload = %name,
        class = %prediction.class_name,
        confidence = prediction.confidence,
        elapsed_ms = start.elapsed().as_millis(),
        "graded upload"
    );
    Ok(Json(prediction))
}

/// Returns the name and bytes of the first field carrying a file.
///
/// A field counts as a file if it has a filename or is named [`UPLOAD_FIELD`].
async fn read_upload(multipart: &mut Multipart) -> Result<(String, Bytes), ApiError> {
    while let Some(field) = multipart.next_field().await? {
        let name = match (field.file_name(), field.name()) {
            (Some(file_name), _) => file_name.to_string(),
            (None, Some(UPLOAD_FIELD)) => UPLOAD_FIELD.to_string(),
            _ => continue,
        };
        let bytes = field.bytes().await?;
        return Ok((name, bytes));
    }
    Err(ApiError::MissingFile)
}
