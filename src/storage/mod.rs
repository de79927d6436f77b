//! Object storage abstraction for the gateway
//!
//! [`ObjectStoreClient`] is the collaborator the rest of the crate talks to: read a stored
//! object, compose several objects into one, delete an object. [`StorageClient`] implements
//! it over any Apache Arrow `object_store` backend, so the same code runs against GCS, S3,
//! a local directory or an in-memory store. On GCS, compose runs server side through
//! [`GcsJsonApi`]; other backends concatenate through a multipart upload.

mod client;
mod gcs;

pub use client::StorageClient;
pub use gcs::{DEFAULT_GCS_API_ENDPOINT, GcsJsonApi};

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use thiserror::Error;

/// Compose limit of the reference deployment (GCS accepts at most 32 sources per call)
pub const DEFAULT_MAX_COMPOSE_SOURCES: usize = 32;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("compose supports max {limit} objects, got {count}")]
    TooManySources { count: usize, limit: usize },

    #[error("Invalid bucket configuration for '{bucket}': {message}")]
    InvalidBucket { bucket: String, message: String },

    #[error("Object store error: {0}")]
    Backend(object_store::Error),

    #[error("storage API returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("storage authentication failed: {0}")]
    Auth(String),
}

impl From<object_store::Error> for StoreError {
    fn from(value: object_store::Error) -> Self {
        match value {
            object_store::Error::NotFound { path, .. } => StoreError::NotFound(path),
            other => StoreError::Backend(other),
        }
    }
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StoreError>;

/// Byte stream of a stored object
pub type ByteStream = BoxStream<'static, Result<Bytes>>;

/// An open read of a stored object
pub struct ObjectReader {
    pub key: String,
    pub size: u64,
    pub stream: ByteStream,
}

impl std::fmt::Debug for ObjectReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectReader")
            .field("key", &self.key)
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

/// Operations the gateway needs from the object store
///
/// Implementations must be shareable across concurrent requests; every method takes `&self`.
#[async_trait]
pub trait ObjectStoreClient: Send + Sync {
    /// Open a streaming read of `bucket/object`
    async fn get(&self, bucket: &str, object: &str) -> Result<ObjectReader>;

    /// Concatenate `sources` (in argument order) into `dest`
    ///
    /// Fails with [`StoreError::TooManySources`] when handed more than
    /// [`max_compose_sources`](Self::max_compose_sources) names.
    async fn compose(&self, bucket: &str, sources: &[String], dest: &str) -> Result<()>;

    /// Delete `bucket/object`
    async fn delete(&self, bucket: &str, object: &str) -> Result<()>;

    /// Maximum number of sources a single compose call accepts
    fn max_compose_sources(&self) -> usize {
        DEFAULT_MAX_COMPOSE_SOURCES
    }
}
