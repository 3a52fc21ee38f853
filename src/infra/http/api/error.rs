use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::application::error::ErrorReport;
use crate::application::repos::RepoError;
use crate::application::todos::TodoError;

pub use todos_api_types::{ApiErrorBody, ApiErrorMessage};

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const INVALID_INPUT: &str = "invalid_input";
    pub const INTEGRITY: &str = "integrity_error";
    pub const DB_TIMEOUT: &str = "db_timeout";
    pub const CACHE_CORRUPT: &str = "cache_corrupt";
    pub const REPO: &str = "repo_error";
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: &'static str,
    hint: Option<String>,
    /// Server-side diagnostic, logged but never sent to the client.
    detail: Option<String>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: &'static str,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message,
            hint,
            detail: None,
        }
    }

    pub fn bad_request(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn not_found(message: &'static str, hint: Option<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, codes::NOT_FOUND, message, hint)
    }

    pub fn internal(code: &'static str, detail: impl Into<String>) -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            code,
            "Internal server error",
            None,
        )
        .with_detail(detail)
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> &'static str {
        self.code
    }

    pub fn from_json_rejection(rejection: JsonRejection) -> Self {
        Self::bad_request("Request body is not valid JSON", Some(rejection.body_text()))
    }

    pub fn from_path_rejection(rejection: PathRejection) -> Self {
        Self::bad_request("Malformed todo id", Some(rejection.body_text()))
    }
}

impl From<TodoError> for ApiError {
    fn from(err: TodoError) -> Self {
        match err {
            TodoError::InvalidInput(inner) => Self::new(
                StatusCode::BAD_REQUEST,
                codes::INVALID_INPUT,
                "Request validation failed",
                Some(inner.to_string()),
            ),
            TodoError::NotFound(id) => Self::not_found("Todo not found", Some(id.to_string())),
            TodoError::CacheCorrupt(detail) => Self::internal(codes::CACHE_CORRUPT, detail),
            TodoError::Store(inner) => Self::from(inner),
        }
    }
}

impl From<RepoError> for ApiError {
    fn from(err: RepoError) -> Self {
        let detail = err.to_string();
        match err {
            RepoError::NotFound => Self::not_found("Todo not found", None),
            RepoError::Duplicate { .. } | RepoError::Integrity { .. } => {
                Self::internal(codes::INTEGRITY, detail)
            }
            RepoError::Timeout => Self::new(
                StatusCode::SERVICE_UNAVAILABLE,
                codes::DB_TIMEOUT,
                "Database timed out",
                None,
            )
            .with_detail(detail),
            RepoError::InvalidInput { .. } | RepoError::Persistence(_) => {
                Self::internal(codes::REPO, detail)
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let diagnostic = self
            .detail
            .clone()
            .or_else(|| self.hint.clone())
            .unwrap_or_else(|| self.message.to_string());
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message.to_string(),
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        ErrorReport::from_message(
            "infra::http::api",
            self.status,
            format!("{}: {}", self.code, diagnostic),
        )
        .attach(&mut response);
        response
    }
}
