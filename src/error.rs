use actix_web::{http::StatusCode, web, HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::repo::RepoError;

/// Machine readable error identifiers carried in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    BadRequest,
    NotFound,
    Conflict,
    BlogNotFound,
    InvalidBlogId,
    InvalidBlogData,
    InvalidCursor,
    InvalidId,
    NotificationNotFound,
    UserNotFound,
    InvalidUserData,
    InvalidRefreshToken,
    InvalidFile,
    Unauthorized,
    Forbidden,
    DatabaseError,
    StorageError,
    InternalServerError,
    ValidationError,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct FieldError {
    pub path: String,
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    pub message: String,
    pub status_code: u16,
    pub error_code: ErrorCode,
    pub details: Option<Vec<FieldError>>,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    BadRequest { message: String, code: ErrorCode },
    #[error("{message}")]
    Validation { message: String, code: ErrorCode, details: Vec<FieldError> },
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{message}")]
    NotFound { message: String, code: ErrorCode },
    #[error("{message}")]
    Internal { message: String, code: ErrorCode },
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, code: ErrorCode) -> Self {
        ApiError::BadRequest { message: message.into(), code }
    }

    pub fn not_found(message: impl Into<String>, code: ErrorCode) -> Self {
        ApiError::NotFound { message: message.into(), code }
    }

    pub fn database(message: impl Into<String>) -> Self {
        ApiError::Internal { message: message.into(), code: ErrorCode::DatabaseError }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    /// Build a validation error listing every violated field, sorted by path.
    pub fn validation(message: impl Into<String>, code: ErrorCode, errors: &ValidationErrors) -> Self {
        ApiError::Validation { message: message.into(), code, details: field_errors(errors) }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            ApiError::BadRequest { code, .. }
            | ApiError::Validation { code, .. }
            | ApiError::NotFound { code, .. }
            | ApiError::Internal { code, .. } => *code,
            ApiError::Unauthorized(_) => ErrorCode::Unauthorized,
            ApiError::Forbidden(_) => ErrorCode::Forbidden,
        }
    }

    pub fn details(&self) -> Option<&[FieldError]> {
        match self {
            ApiError::Validation { details, .. } => Some(details),
            _ => None,
        }
    }
}

/// Flatten `validator` output into `{path, message}` pairs.
pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out: Vec<FieldError> = Vec::new();
    for (field, errs) in errors.field_errors() {
        for e in errs {
            let message = e
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| e.code.to_string());
            // schema-level errors are reported under "__all__"
            let path = if field == "__all__" { String::new() } else { field.to_string() };
            out.push(FieldError { path, message });
        }
    }
    out.sort_by(|a, b| a.path.cmp(&b.path).then_with(|| a.message.cmp(&b.message)));
    out
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::not_found("not found", ErrorCode::NotFound),
            RepoError::Conflict => ApiError::bad_request("conflict", ErrorCode::Conflict),
            RepoError::Internal(msg) => {
                tracing::error!(error = %msg, "unhandled repository error");
                ApiError::database("database error")
            }
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest { .. } | ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error_code = ?self.code(), "{}", self);
        } else {
            tracing::debug!(status = status.as_u16(), error_code = ?self.code(), "{}", self);
        }
        let message = match self.to_string() {
            m if m.is_empty() => "Internal Server Error".to_string(),
            m => m,
        };
        HttpResponse::build(status).json(ApiErrorBody {
            message,
            status_code: status.as_u16(),
            error_code: self.code(),
            details: self.details().map(|d| d.to_vec()),
        })
    }
}

/// Route extractor failures (bad JSON, bad query, bad path) through the
/// common error body instead of actix's plain-text defaults.
pub fn json_config() -> web::JsonConfig {
    web::JsonConfig::default()
        .limit(1024 * 1024)
        .error_handler(|err, _req| ApiError::bad_request(err.to_string(), ErrorCode::BadRequest).into())
}

pub fn query_config() -> web::QueryConfig {
    web::QueryConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string(), ErrorCode::BadRequest).into())
}

pub fn path_config() -> web::PathConfig {
    web::PathConfig::default()
        .error_handler(|err, _req| ApiError::bad_request(err.to_string(), ErrorCode::BadRequest).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use validator::{ValidationError, ValidationErrors};

    #[test]
    fn field_errors_are_sorted_and_use_messages() {
        let mut errs = ValidationErrors::new();
        let mut e = ValidationError::new("length");
        e.message = Some("title must be 5-100 characters".into());
        errs.add("title", e);
        errs.add("content", ValidationError::new("length"));
        let out = field_errors(&errs);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].path, "content");
        assert_eq!(out[0].message, "length");
        assert_eq!(out[1].message, "title must be 5-100 characters");
    }

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(ApiError::unauthorized("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::database("x").status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            ApiError::not_found("x", ErrorCode::BlogNotFound).code(),
            ErrorCode::BlogNotFound
        );
    }
}
