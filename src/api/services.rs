use axum::{
    Json,
    extract::{Query, State},
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};

use super::{
    models::{HealthResponse, MergeRequest, SignedUrlQuery, SignedUrlResponse},
    state::AppState,
    utils::{first_non_empty, parse_content_type, read_body_limited},
    validation::validate_merge_request,
};
use crate::api::error::ApiError;
use crate::compose::RequestId;
use crate::content::object_response;
use crate::storage::ObjectReader;

/// Header carrying the merge's request id back to the caller
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Download of the configured object (GET /view-file)
///
/// Bucket and object come from configuration (`BUCKET_NAME` / `FILE_NAME`); either one
/// missing is a server-side configuration error.
pub async fn view_file(State(state): State<AppState>) -> Result<Response, ApiError> {
    let (Some(bucket), Some(object)) = (
        state.bucket(),
        state.config.storage.object.as_deref().filter(|o| !o.trim().is_empty()),
    ) else {
        return Err(ApiError::MissingConfig(
            "Bucket name or file name is not set in configuration".to_string(),
        ));
    };

    let reader = state
        .storage
        .get(bucket, object)
        .await
        .map_err(|e| ApiError::Storage(format!("Failed to read file from storage: {e}")))?;

    tracing::info!(bucket, object, size = reader.size, "Serving file");
    state.metrics.file_served();

    Ok(object_response(reader))
}

/// Merge many stored objects into one and stream the result (POST /merge)
///
/// ## Flow:
/// 1. Validate Content-Type and body size, parse `{sources, dest}`
/// 2. Reject empty sources/dest before touching storage
/// 3. Run the batch composer under a fresh request id, bounded by `server.request_timeout`
/// 4. Open `dest` and stream it back as an attachment
pub async fn merge(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: axum::body::Body,
) -> Result<Response, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::InvalidPayload("missing Content-Type header".into()))?;
    parse_content_type(content_type)?;

    let max_body = state.config.server.max_body_bytes.as_usize();
    let body_bytes = read_body_limited(body, max_body).await?;
    if body_bytes.is_empty() {
        return Err(ApiError::InvalidPayload("request body is empty".into()));
    }

    let request: MergeRequest = serde_json::from_slice(&body_bytes)?;
    validate_merge_request(&request).map_err(|e| ApiError::InvalidPayload(e.to_string()))?;

    let bucket = state
        .bucket()
        .ok_or_else(|| ApiError::MissingConfig("Bucket name is not set in configuration".into()))?;

    let request_id = RequestId::new();
    let timeout = state.config.server.request_timeout.as_duration();

    tracing::info!(
        request_id = %request_id,
        bucket,
        dest = %request.dest,
        sources = request.sources.len(),
        "Merge requested"
    );

    let report = match state
        .composer
        .merge_within(timeout, bucket, &request.sources, &request.dest, &request_id)
        .await
    {
        Ok(report) => report,
        Err(e) => {
            state.metrics.merge_failed();
            return Err(e.into());
        }
    };
    state
        .metrics
        .merge_completed(report.compose_calls, report.cleanup_failures);

    let reader: ObjectReader = state
        .storage
        .get(bucket, &request.dest)
        .await
        .map_err(|e| ApiError::Storage(format!("failed to read merged file: {e}")))?;

    let mut response = object_response(reader);
    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }

    Ok(response)
}

/// Mint a signed GET URL (GET /signed-url?bucket=&object=&expiry=)
///
/// Query values win over configured defaults; expiry falls back to the configured
/// default (itself `SIGNED_URL_EXPIRY` or 15 minutes).
pub async fn signed_url(
    State(state): State<AppState>,
    Query(query): Query<SignedUrlQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let bucket = first_non_empty([query.bucket.as_deref(), state.bucket()]);
    let object = first_non_empty([
        query.object.as_deref(),
        state.config.storage.object.as_deref(),
    ]);

    let (Some(bucket), Some(object)) = (bucket, object) else {
        return Err(ApiError::MissingParameter(
            "Bucket name or object name is missing".to_string(),
        ));
    };

    let expiry = state.issuer.resolve_expiry(query.expiry.as_deref());
    let signed = state.issuer.sign(&bucket, &object, expiry).await?;
    state.metrics.url_signed();

    let response = SignedUrlResponse {
        url: signed.url,
        expires_at: signed.expires_at,
        status: "success".to_string(),
        code: StatusCode::OK.as_u16(),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Health check endpoint (GET /health)
pub async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let response = HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        metrics: state.metrics.snapshot(),
    };

    (StatusCode::OK, Json(response))
}
