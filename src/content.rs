//! Content delivery: stream a stored object to an HTTP response
//!
//! The content type comes from a small extension table; anything unknown is served as
//! `application/octet-stream`. Bytes are passed through untouched.

use axum::{
    body::Body,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use futures::TryStreamExt;
use std::path::Path;

use crate::storage::ObjectReader;

/// Served when an object's extension is not in [`CONTENT_TYPES`]
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

/// Extension (lowercase, without the dot) to MIME type
const CONTENT_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
];

/// Look up the MIME type for an object name by its extension (case-insensitive)
pub fn lookup_content_type(object_name: &str) -> Option<&'static str> {
    let ext = Path::new(object_name).extension()?.to_str()?.to_ascii_lowercase();

    CONTENT_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, mime)| *mime)
}

/// MIME type for an object name, falling back to `application/octet-stream`
pub fn content_type_for(object_name: &str) -> &'static str {
    lookup_content_type(object_name).unwrap_or(FALLBACK_CONTENT_TYPE)
}

/// `attachment; filename="<base name>"` for an object key
///
/// Only the last path segment is used, and quotes, backslashes and control characters are
/// dropped so the header value is always valid.
pub fn attachment_disposition(object_name: &str) -> HeaderValue {
    let file_name: String = object_name
        .rsplit('/')
        .next()
        .unwrap_or(object_name)
        .chars()
        .filter(|c| !c.is_control() && *c != '"' && *c != '\\')
        .map(|c| if c.is_ascii() { c } else { '_' })
        .collect();

    HeaderValue::from_str(&format!("attachment; filename=\"{file_name}\""))
        .unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

/// Turn an open object read into a streaming download response
///
/// Errors after the headers are sent cannot change the status any more; they are logged
/// and abort the body.
pub fn object_response(reader: ObjectReader) -> Response {
    let content_type = content_type_for(&reader.key);
    let disposition = attachment_disposition(&reader.key);
    let key = reader.key;

    let stream = reader.stream.inspect_err(move |e| {
        tracing::warn!(object = %key, error = %e, "Failed to send file content");
    });

    (
        StatusCode::OK,
        [
            (header::CONTENT_TYPE, HeaderValue::from_static(content_type)),
            (header::CONTENT_DISPOSITION, disposition),
            (header::CONTENT_LENGTH, HeaderValue::from(reader.size)),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}
