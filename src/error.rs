use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::error::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Database integrity error: {0}")]
    Integrity(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl StoreError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Whether this came from a UNIQUE constraint (as opposed to FK, NOT NULL, ...).
    pub fn is_unique_violation(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db.is_unique_violation(),
            _ => false,
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if !matches!(db.kind(), ErrorKind::Other) => {
                StoreError::Integrity(db.message().to_string())
            }
            _ => StoreError::Internal(err.to_string()),
        }
    }
}

impl From<QueryRejection> for StoreError {
    fn from(rejection: QueryRejection) -> Self {
        StoreError::Validation(format!("Invalid query parameters: {}", rejection.body_text()))
    }
}

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            StoreError::Validation(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            StoreError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            StoreError::Integrity(_) => (StatusCode::CONFLICT, self.to_string()),
            StoreError::Internal(detail) => {
                tracing::error!(error = %detail, "internal storage error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_error_kind() {
        let cases = [
            (StoreError::validation("bad"), StatusCode::BAD_REQUEST),
            (StoreError::not_found("Food not found"), StatusCode::NOT_FOUND),
            (StoreError::Integrity("dup".into()), StatusCode::CONFLICT),
            (
                StoreError::Internal("disk on fire".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn row_not_found_is_internal() {
        let err: StoreError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, StoreError::Internal(_)));
    }
}
