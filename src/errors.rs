use std::borrow::Cow;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use convert_case::{Case, Casing};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{ValidationError, ValidationErrors};

/// ApiError
///
/// The single error type returned by handlers. Each variant maps to exactly one
/// HTTP status so the mapping in `into_response` is the whole error contract:
/// validation 422, hidden or missing 404, not the owner 403, not signed in 401.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("resource not found")]
    NotFound,
    #[error("access denied")]
    Forbidden,
    #[error("authentication required")]
    Unauthorized,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("validation failed")]
    Validation(#[from] ValidationErrors),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

impl ApiError {
    /// A single-field validation failure, for checks that need the database
    /// (unknown related article, unknown image) or a multipart body.
    pub fn violation(field: &'static str, code: &'static str, message: &'static str) -> Self {
        let mut errors = ValidationErrors::new();
        errors.add(field, validation_error(code, message));
        ApiError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Database(_) | ApiError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Violation
///
/// One field-level validation failure in a 422 body.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub property_path: String,
    pub message: String,
}

/// ErrorBody
///
/// JSON shape of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorBody {
    pub error: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

pub fn validation_error(code: &'static str, message: &'static str) -> ValidationError {
    let mut error = ValidationError::new(code);
    error.message = Some(Cow::Borrowed(message));
    error
}

/// Flattens `ValidationErrors` into sorted violations. Field names are turned
/// into their camelCase wire names.
pub fn violations(errors: &ValidationErrors) -> Vec<Violation> {
    let mut out: Vec<Violation> = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            let path = field.to_case(Case::Camel);
            errs.iter().map(move |e| Violation {
                property_path: path.clone(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    out.sort_by(|a, b| a.property_path.cmp(&b.property_path));
    out
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            ApiError::Validation(errors) => ErrorBody {
                error: self.to_string(),
                violations: violations(errors),
            },
            ApiError::Database(_) | ApiError::Storage(_) => {
                // Details stay in the logs.
                tracing::error!(error = %self, "request failed");
                ErrorBody {
                    error: "internal server error".to_string(),
                    violations: vec![],
                }
            }
            _ => ErrorBody {
                error: self.to_string(),
                violations: vec![],
            },
        };
        (status, Json(body)).into_response()
    }
}
