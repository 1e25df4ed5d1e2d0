//! Prediction endpoint
//!
//! Accepts a multipart upload with the image in the `file` field and answers
//! with the predicted class, its confidence and a remedy.

use axum::{
    extract::{multipart::MultipartRejection, Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{error, info, warn};

use plantvillage_tl::inference::PredictionResult;
use plantvillage_tl::PlantError;

use crate::state::SharedState;

pub const NO_FILE_PART: &str = "No file part in the request";
pub const NO_FILE_SELECTED: &str = "No file selected for uploading";

/// Form field carrying the uploaded image
pub const FILE_FIELD: &str = "file";

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn bad_request(message: impl Into<String>) -> ApiError {
    api_error(StatusCode::BAD_REQUEST, message)
}

/// Bytes of the `file` field, or the client error describing why there are none
async fn read_upload(multipart: &mut Multipart) -> Result<Vec<u8>, ApiError> {
    loop {
        let field = multipart
            .next_field()
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;

        let Some(field) = field else {
            return Err(bad_request(NO_FILE_PART));
        };

        if field.name() != Some(FILE_FIELD) {
            continue;
        }

        // A plain form value is not an upload
        match field.file_name() {
            None => return Err(bad_request(NO_FILE_PART)),
            Some("") => return Err(bad_request(NO_FILE_SELECTED)),
            Some(_) => {}
        }

        let bytes = field
            .bytes()
            .await
            .map_err(|e| api_error(e.status(), e.body_text()))?;
        return Ok(bytes.to_vec());
    }
}

/// POST /predict - Classify an uploaded leaf image
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictionResult>, ApiError> {
    // A request that is not multipart at all has no file part either
    let mut multipart = multipart.map_err(|_| bad_request(NO_FILE_PART))?;
    let bytes = read_upload(&mut multipart).await?;

    let service = state.service.clone();
    let outcome = tokio::task::spawn_blocking(move || service.diagnose(&bytes))
        .await
        .map_err(|e| {
            error!("Prediction task failed: {}", e);
            api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
        })?;

    match outcome {
        Ok(result) => {
            info!("Predicted '{}' ({:.2}%)", result.prediction, result.confidence);
            Ok(Json(result))
        }
        Err(PlantError::InvalidInput(message)) => {
            warn!("Rejected upload: {}", message);
            Err(bad_request(message))
        }
        Err(e) => {
            error!("Prediction failed: {}", e);
            Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))
        }
    }
}
