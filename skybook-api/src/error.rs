use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use skybook_core::BookingError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Booking(#[from] BookingError),

    #[error("{0}")]
    BadRequest(String),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Booking(err) => match err {
                BookingError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
                BookingError::NotFound { .. } => StatusCode::NOT_FOUND,
                BookingError::InsufficientInventory { .. } | BookingError::Conflict(_) => StatusCode::CONFLICT,
                BookingError::StorageUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                BookingError::CodeGenerationExhausted { .. } | BookingError::ReconciliationRequired { .. } => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            AppError::BadRequest(_) => "INVALID_ARGUMENT",
            AppError::Booking(err) => match err {
                BookingError::InvalidArgument(_) => "INVALID_ARGUMENT",
                BookingError::NotFound { .. } => "NOT_FOUND",
                BookingError::InsufficientInventory { .. } => "INSUFFICIENT_INVENTORY",
                BookingError::Conflict(_) => "CONFLICT",
                BookingError::CodeGenerationExhausted { .. } => "CODE_GENERATION_EXHAUSTED",
                BookingError::ReconciliationRequired { .. } => "RECONCILIATION_REQUIRED",
                BookingError::StorageUnavailable(_) => "STORAGE_UNAVAILABLE",
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let body = Json(json!({
            "error": self.kind(),
            "message": self.to_string(),
        }));

        (status, body).into_response()
    }
}
