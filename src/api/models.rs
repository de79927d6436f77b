//! Request and response bodies of the HTTP API
//!
//! `POST /merge` body:
//!
//! ```json
//! {
//!   "sources": ["parts/part_0000.pdf", "parts/part_0001.pdf"],
//!   "dest": "merged/report.pdf"
//! }
//! ```
//!
//! `GET /signed-url` answers:
//!
//! ```json
//! {
//!   "url": "https://storage.googleapis.com/reports/latest.pdf?X-Goog-Algorithm=...",
//!   "expires_at": "2024-05-01T10:15:00Z",
//!   "status": "success",
//!   "code": 200
//! }
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::observability::MetricsSnapshot;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct MergeRequest {
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub dest: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignedUrlQuery {
    pub bucket: Option<String>,
    pub object: Option<String>,
    pub expiry: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignedUrlResponse {
    pub url: String,
    pub expires_at: DateTime<Utc>,
    pub status: String,
    pub code: u16,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub metrics: MetricsSnapshot,
}
