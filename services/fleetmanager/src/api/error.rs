//! API error envelope.
//!
//! # Purpose
//! Maps store failures onto consistent HTTP error responses. Handlers do not
//! match `StoreError` variants themselves; [`ApiError::from_store`] owns the
//! variant-to-status mapping so a `NotFound` is always a 404 and a
//! `Conflict` always a 409, whatever resource the handler was touching.
use crate::api::types::ErrorResponse;
use crate::store::StoreError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::IntoResponse;

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            code: "validation_error",
            message: message.into(),
        }
    }

    /// Map a store failure, with `resource` naming what the handler was
    /// operating on. Unexpected failures are logged here and reported to the
    /// client without internal detail.
    pub fn from_store(resource: &'static str, err: StoreError) -> Self {
        match err {
            StoreError::NotFound(_) => Self {
                status: StatusCode::NOT_FOUND,
                code: "not_found",
                message: format!("{resource} not found"),
            },
            StoreError::Conflict(reason) => Self {
                status: StatusCode::CONFLICT,
                code: "conflict",
                message: reason,
            },
            StoreError::Unexpected(err) => {
                tracing::error!(resource, error = ?err, "fleetmanager storage error");
                Self {
                    status: StatusCode::INTERNAL_SERVER_ERROR,
                    code: "internal",
                    message: format!("failed to access {resource}"),
                }
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let body = ErrorResponse {
            code: self.code.to_string(),
            message: self.message,
            request_id: None,
        };
        (self.status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    #[test]
    fn store_variants_map_to_statuses() {
        let err = ApiError::from_store("connector", StoreError::NotFound("connector".into()));
        assert_eq!(err.status, StatusCode::NOT_FOUND);
        assert_eq!(err.message, "connector not found");

        let err = ApiError::from_store("connector", StoreError::Conflict("connector exists".into()));
        assert_eq!(err.status, StatusCode::CONFLICT);
        assert_eq!(err.message, "connector exists");

        let err = ApiError::from_store("connector", StoreError::Unexpected(anyhow!("pool gone")));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.code, "internal");
        // Internal detail stays out of the client-facing message.
        assert!(!err.message.contains("pool gone"));
    }

    #[test]
    fn validation_is_a_bad_request() {
        let err = ApiError::validation("owner is required");
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.code, "validation_error");
    }
}
