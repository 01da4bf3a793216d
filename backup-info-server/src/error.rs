use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use backup_info::{AnnotationFailure, ErrorKind, InfoError};
use serde_json::json;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unprocessable(String),

    #[error(transparent)]
    Annotation(#[from] AnnotationFailure),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::AnnotationConflict => StatusCode::CONFLICT,
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::Parse => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<InfoError> for AppError {
    fn from(e: InfoError) -> Self {
        let msg = e.to_string();
        match e.kind() {
            ErrorKind::NotFound => AppError::NotFound(msg),
            ErrorKind::AnnotationConflict => AppError::Conflict(msg),
            ErrorKind::Validation => AppError::BadRequest(msg),
            ErrorKind::Parse => AppError::Unprocessable(msg),
            ErrorKind::Io => AppError::Internal(anyhow::Error::new(e)),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, msg) = match &self {
            AppError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            AppError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            AppError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            AppError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
            AppError::Annotation(failure) => {
                let status = status_for(failure.source.kind());
                let body = json!({
                    "error": failure.source.to_string(),
                    "server": failure.report.server,
                    "label": failure.report.label,
                    "comments": failure.report.comments,
                });
                return (status, Json(body)).into_response();
            }
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:#}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".into())
            }
        };
        (status, Json(json!({ "error": msg }))).into_response()
    }
}
