use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::json;

use crate::error::Error;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 200;

/// Success envelope: `{"data": ...}`.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn new(data: T) -> Json<Self> {
        Json(Self { data })
    }
}

/// Offset-paginated collection envelope.
#[derive(Debug, Serialize)]
pub struct CollectionResponse<T: Serialize> {
    pub data: Vec<T>,
    pub total: i64,
    pub offset: i64,
    pub limit: i64,
}

impl<T: Serialize> CollectionResponse<T> {
    pub fn new(data: Vec<T>, total: i64, offset: i64, limit: i64) -> Json<Self> {
        Json(Self {
            data,
            total,
            offset,
            limit,
        })
    }
}

/// Cursor-paginated collection envelope. `next_cursor` is the id of the
/// last item on this page, absent when the page came back short.
#[derive(Debug, Serialize)]
pub struct CursorResponse<T: Serialize> {
    pub data: Vec<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_cursor: Option<String>,
}

impl<T: Serialize> CursorResponse<T> {
    pub fn new(data: Vec<T>, next_cursor: Option<String>) -> Json<Self> {
        Json(Self { data, next_cursor })
    }
}

/// Error envelope: `{"data": null, "error": ...}` with an HTTP status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::FORBIDDEN,
            message: message.into(),
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_GATEWAY,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "data": null,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        match e {
            Error::NotFound => ApiError::not_found("not found"),
            Error::Conflict(msg) => ApiError::conflict(msg),
            Error::BadRequest(msg) => ApiError::bad_request(msg),
            Error::Unauthenticated | Error::InvalidTokenFormat | Error::TokenExpired => {
                ApiError::unauthorized("invalid or expired credentials")
            }
            Error::Forbidden => ApiError::forbidden("forbidden"),
            other => {
                tracing::error!("Store operation failed: {}", other);
                ApiError::internal("internal server error")
            }
        }
    }
}

/// Maps store-layer results into API errors at handler seams.
pub trait StoreResultExt<T> {
    fn api_err(self) -> Result<T, ApiError>;
}

impl<T> StoreResultExt<T> for Result<T, Error> {
    fn api_err(self) -> Result<T, ApiError> {
        self.map_err(ApiError::from)
    }
}

pub trait StoreOptionExt<T> {
    fn or_not_found(self, what: &str) -> Result<T, ApiError>;
}

impl<T> StoreOptionExt<T> for Option<T> {
    fn or_not_found(self, what: &str) -> Result<T, ApiError> {
        self.ok_or_else(|| ApiError::not_found(format!("{what} not found")))
    }
}

/// Clamps offset/limit query values to sane bounds.
pub fn clamp_page(offset: Option<i64>, limit: Option<i64>) -> (i64, i64) {
    let offset = offset.unwrap_or(0).max(0);
    let limit = limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    (offset, limit)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_defaults() {
        assert_eq!(clamp_page(None, None), (0, DEFAULT_PAGE_SIZE));
        assert_eq!(clamp_page(Some(-5), Some(0)), (0, 1));
        assert_eq!(clamp_page(Some(10), Some(10_000)), (10, MAX_PAGE_SIZE));
    }

    #[test]
    fn test_store_error_mapping() {
        assert_eq!(
            ApiError::from(Error::NotFound).status,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(Error::Conflict("x".into())).status,
            StatusCode::CONFLICT
        );
        assert_eq!(
            ApiError::from(Error::TokenExpired).status,
            StatusCode::UNAUTHORIZED
        );
    }
}
