//! Authentication and rate limiting in front of every route

use crate::api::error::ApiError;
use crate::api::AppState;
use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;

/// Header carrying the caller's API key
pub const API_KEY_HEADER: &str = "x-api-key";

/// Header reporting whole tokens left after an admitted request
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";

/// Admits the request or answers it with 401, 429 or 503
///
/// The limiter may touch SQLite, so the check runs on the blocking pool.
pub async fn admission(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let api_key = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);

    let limiter = Arc::clone(&state.limiter);
    let checked = tokio::task::spawn_blocking(move || limiter.check(api_key.as_deref())).await;

    let admission = match checked {
        Ok(Ok(admission)) => admission,
        Ok(Err(e)) => return ApiError::from(e).into_response(),
        Err(e) => {
            tracing::error!("Rate limiter task failed: {}", e);
            return ApiError::Unavailable("rate limiter task failed".to_string()).into_response();
        }
    };

    let mut response = next.run(request).await;
    response.headers_mut().insert(
        HeaderName::from_static(RATE_LIMIT_REMAINING_HEADER),
        HeaderValue::from(admission.remaining),
    );
    response
}
