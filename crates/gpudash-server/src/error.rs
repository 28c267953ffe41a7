use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

pub const GPU_DEMOS_UNAVAILABLE: &str = "GPU demos not available";
pub const UNKNOWN_BENCHMARK: &str = "Unknown benchmark type";
pub const CPU_BENCHMARK_UNAVAILABLE: &str = "CPU benchmark not available for this type";
pub const WS_BENCHMARK_UNSUPPORTED: &str = "Benchmark type not supported via WebSocket";
pub const GPU_UNAVAILABLE: &str = "GPU not available";

/// Failure of a request/response operation. Rendered as a JSON `{ "error" }`
/// body with a 4xx/5xx status; the WebSocket path reports the message as a
/// `benchmark_error` event instead.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl AppError {
    pub fn message(&self) -> &str {
        match self {
            AppError::BadRequest(msg) | AppError::Internal(msg) => msg,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match self {
            AppError::BadRequest(msg) | AppError::Internal(msg) => msg,
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
