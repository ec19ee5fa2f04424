pub mod accounts;
pub mod lists;
pub mod misc;
pub mod tasks;

use anyhow::Context;
use axum::extract::{FromRequest, FromRequestParts};

use crate::error::{ApiError, ApiResult};

/// `axum::Json` whose rejections render as `{"error": ...}` with 400.
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(ApiError))]
pub struct ApiPath<T>(pub T);

#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(ApiError))]
pub struct ApiQuery<T>(pub T);

/// Runs a store-backed service call off the async workers.
pub(crate) async fn blocking<T, F>(call: F) -> ApiResult<T>
where
    F: FnOnce() -> docket_core::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let joined = tokio::task::spawn_blocking(call)
        .await
        .context("service call panicked or was cancelled")
        .map_err(docket_core::Error::Store)?;
    joined.map_err(ApiError::from)
}

pub(crate) fn non_empty(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
