//! Error responses of the read API
//!
//! Every failure is rendered as `{"message": ...}` with a status code that
//! tells the caller whether to fix the request, back off, or retry later.

use crate::limiter::AdmissionError;
use crate::storage::StorageError;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing or unknown API key")]
    Unauthorized,

    #[error("Rate limit exceeded, retry in {}s", retry_after_secs(.retry_after))]
    RateLimited { retry_after: Duration },

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Whole seconds a limited caller should wait; never 0
fn retry_after_secs(retry_after: &Duration) -> u64 {
    retry_after.as_secs_f64().ceil().max(1.0) as u64
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<AdmissionError> for ApiError {
    fn from(err: AdmissionError) -> Self {
        match err {
            AdmissionError::Unauthorized => Self::Unauthorized,
            AdmissionError::RateLimited { retry_after } => Self::RateLimited { retry_after },
            AdmissionError::ServiceUnavailable(message) => Self::Unavailable(message),
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::ItemNotFound(id) => Self::NotFound(format!("Item {} not found", id)),
            other => {
                tracing::error!("Storage failure while serving request: {}", other);
                Self::Internal(other.to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let retry_after = match &self {
            Self::RateLimited { retry_after } => Some(retry_after_secs(retry_after)),
            _ => None,
        };

        let mut response = (
            status,
            Json(ErrorBody {
                message: self.to_string(),
            }),
        )
            .into_response();

        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ApiError::from(AdmissionError::RateLimited {
                retry_after: Duration::from_secs(5)
            })
            .status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ApiError::from(AdmissionError::ServiceUnavailable("down".to_string())).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(StorageError::ItemNotFound(4)).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from(StorageError::LockPoisoned).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = ApiError::RateLimited {
            retry_after: Duration::from_millis(1500),
        }
        .into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(
            response.headers().get(header::RETRY_AFTER).unwrap(),
            &HeaderValue::from(2u64)
        );
    }

    #[test]
    fn test_retry_after_is_never_zero() {
        assert_eq!(retry_after_secs(&Duration::ZERO), 1);
        assert_eq!(retry_after_secs(&Duration::from_secs(36)), 36);
    }
}
