use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::download::TaskError;

/// Every non-2xx API response carries this body.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub(crate) struct ErrorBody {
    pub(crate) error: String,
}

pub(crate) type ApiError = (StatusCode, Json<ErrorBody>);

pub(crate) fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorBody {
            error: message.into(),
        }),
    )
}

pub(crate) fn task_error_response(err: TaskError) -> ApiError {
    let status = match &err {
        TaskError::Validation(_) => StatusCode::BAD_REQUEST,
        TaskError::NotFound => StatusCode::NOT_FOUND,
        TaskError::InvalidState { .. } => StatusCode::CONFLICT,
        TaskError::Io { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    error_response(status, err.to_string())
}
