use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("model inference failed: {0}")]
    Inference(String),
    #[error("prediction endpoint request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("prediction endpoint returned status {0}")]
    EndpointStatus(reqwest::StatusCode),
    #[error("prediction endpoint response is missing predictions")]
    MalformedResponse,
    #[error("model returned {got} scores for {expected} labels")]
    ScoreShape { got: usize, expected: usize },
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("multipart upload is missing a `file` field")]
    MissingFile,
    #[error("failed to read multipart upload: {0}")]
    InvalidUpload(String),
    #[error("failed to decode image: {0}")]
    ImageDecode(#[from] image::ImageError),
    #[error(transparent)]
    Predictor(#[from] PredictorError),
}

impl ApiError {
    /// Client faults map to 4xx, upstream transport faults to 502 and model
    /// faults to 500.
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::MissingFile | ApiError::InvalidUpload(_) => StatusCode::BAD_REQUEST,
            ApiError::ImageDecode(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Predictor(e) => match e {
                PredictorError::Inference(_) | PredictorError::ScoreShape { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
                PredictorError::Transport(_)
                | PredictorError::EndpointStatus(_)
                | PredictorError::MalformedResponse => StatusCode::BAD_GATEWAY,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!("prediction request failed: {}", self);
        } else {
            tracing::debug!("rejected prediction request: {}", self);
        }

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
