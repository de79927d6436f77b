use async_trait::async_trait;
use bytes::Bytes;
use futures::{StreamExt, TryStreamExt};
use object_store::{
    ObjectStore, WriteMultipart, aws::AmazonS3Builder, gcp::GoogleCloudStorageBuilder,
    local::LocalFileSystem, memory::InMemory, path::Path as StoragePath,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{
    DEFAULT_MAX_COMPOSE_SOURCES, GcsJsonApi, ObjectReader, ObjectStoreClient, Result, StoreError,
};
use crate::config::{StorageConfig, StorageProvider};

/// Parts buffered in flight while composing into a multipart upload
const COMPOSE_UPLOAD_CONCURRENCY: usize = 8;

/// Storage client wrapping object_store
///
/// `object_store` handles are bound to a single bucket, so one handle is built lazily per
/// bucket name and cached for the lifetime of the client. With a [`GcsJsonApi`] attached,
/// compose is delegated to it instead of being streamed through a multipart upload.
#[derive(Clone)]
pub struct StorageClient {
    config: Arc<StorageConfig>,
    stores: Arc<RwLock<HashMap<String, Arc<dyn ObjectStore>>>>,
    max_compose_sources: usize,
    native_compose: Option<Arc<GcsJsonApi>>,
}

impl StorageClient {
    pub fn new(config: StorageConfig, max_compose_sources: usize) -> Self {
        Self {
            config: Arc::new(config),
            stores: Arc::new(RwLock::new(HashMap::new())),
            max_compose_sources,
            native_compose: None,
        }
    }

    /// Create in-memory storage for testing/development
    pub fn in_memory() -> Self {
        Self::new(StorageConfig::default(), DEFAULT_MAX_COMPOSE_SOURCES)
    }

    /// Register an already-built backend for `bucket`
    pub async fn with_store(self, bucket: &str, store: Arc<dyn ObjectStore>) -> Self {
        self.stores.write().await.insert(bucket.to_string(), store);
        self
    }

    pub fn with_native_compose(mut self, api: Arc<GcsJsonApi>) -> Self {
        self.native_compose = Some(api);
        self
    }

    pub fn with_max_compose_sources(mut self, limit: usize) -> Self {
        self.max_compose_sources = limit;
        self
    }

    async fn bucket_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        if let Some(store) = self.stores.read().await.get(bucket) {
            return Ok(store.clone());
        }

        let mut stores = self.stores.write().await;
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store = self.build_store(bucket).await?;
        tracing::debug!(bucket, provider = ?self.config.provider, "Opened bucket");
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    async fn build_store(&self, bucket: &str) -> Result<Arc<dyn ObjectStore>> {
        let invalid = |message: String| StoreError::InvalidBucket {
            bucket: bucket.to_string(),
            message,
        };

        let store: Arc<dyn ObjectStore> = match self.config.provider {
            StorageProvider::Memory => Arc::new(InMemory::new()),
            StorageProvider::Local => {
                let root = self
                    .config
                    .root
                    .as_ref()
                    .ok_or_else(|| invalid("local provider requires storage.root".into()))?
                    .join(bucket);
                tokio::fs::create_dir_all(&root)
                    .await
                    .map_err(|e| invalid(e.to_string()))?;
                Arc::new(LocalFileSystem::new_with_prefix(&root)?)
            }
            StorageProvider::Gcs => {
                let mut builder = GoogleCloudStorageBuilder::from_env().with_bucket_name(bucket);
                if let Some(ref path) = self.config.credentials_file {
                    builder = builder.with_service_account_path(path.to_string_lossy());
                }
                Arc::new(builder.build()?)
            }
            StorageProvider::S3 => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(bucket);
                if let Some(ref region) = self.config.region {
                    builder = builder.with_region(region);
                }
                if let Some(ref endpoint) = self.config.endpoint {
                    builder = builder.with_endpoint(endpoint);
                }
                Arc::new(builder.build()?)
            }
        };

        Ok(store)
    }

    /// Upload bytes to storage
    pub async fn upload(&self, bucket: &str, key: &str, data: Bytes) -> Result<()> {
        let store = self.bucket_store(bucket).await?;
        let size = data.len();

        store.put(&StoragePath::from(key), data.into()).await?;

        tracing::debug!(bucket, key, size, "Uploaded to storage");
        Ok(())
    }

    /// Download a whole object into memory
    pub async fn download(&self, bucket: &str, key: &str) -> Result<Bytes> {
        let store = self.bucket_store(bucket).await?;
        let bytes = store.get(&StoragePath::from(key)).await?.bytes().await?;

        tracing::debug!(bucket, key, size = bytes.len(), "Downloaded from storage");
        Ok(bytes)
    }

    /// Check if key exists
    pub async fn exists(&self, bucket: &str, key: &str) -> Result<bool> {
        let store = self.bucket_store(bucket).await?;

        match store.head(&StoragePath::from(key)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// List object keys under `prefix`, sorted
    pub async fn list_keys(&self, bucket: &str, prefix: &str) -> Result<Vec<String>> {
        let store = self.bucket_store(bucket).await?;
        let prefix = StoragePath::from(prefix);

        let mut keys: Vec<String> = store
            .list(Some(&prefix))
            .map_ok(|meta| meta.location.to_string())
            .try_collect()
            .await?;
        keys.sort();
        Ok(keys)
    }
}

#[async_trait]
impl ObjectStoreClient for StorageClient {
    async fn get(&self, bucket: &str, object: &str) -> Result<ObjectReader> {
        let store = self.bucket_store(bucket).await?;
        let result = store.get(&StoragePath::from(object)).await?;
        let size = result.meta.size;

        tracing::debug!(bucket, object, size, "Opened object stream");

        Ok(ObjectReader {
            key: object.to_string(),
            size,
            stream: result.into_stream().map_err(StoreError::from).boxed(),
        })
    }

    async fn compose(&self, bucket: &str, sources: &[String], dest: &str) -> Result<()> {
        if sources.len() > self.max_compose_sources {
            return Err(StoreError::TooManySources {
                count: sources.len(),
                limit: self.max_compose_sources,
            });
        }

        if let Some(api) = &self.native_compose {
            return api.compose(bucket, sources, dest).await;
        }

        let store = self.bucket_store(bucket).await?;
        let upload = store.put_multipart(&StoragePath::from(dest)).await?;
        let mut writer = WriteMultipart::new(upload);

        for source in sources {
            if let Err(e) = append_object(&store, source, &mut writer).await {
                if let Err(abort_err) = writer.abort().await {
                    tracing::warn!(bucket, dest, error = %abort_err, "Failed to abort compose upload");
                }
                return Err(e);
            }
        }

        writer.finish().await?;

        tracing::debug!(bucket, dest, sources = sources.len(), "Composed objects");
        Ok(())
    }

    async fn delete(&self, bucket: &str, object: &str) -> Result<()> {
        let store = self.bucket_store(bucket).await?;
        store.delete(&StoragePath::from(object)).await?;
        Ok(())
    }

    fn max_compose_sources(&self) -> usize {
        self.max_compose_sources
    }
}

/// Stream one source object onto the end of a pending multipart upload
async fn append_object(
    store: &Arc<dyn ObjectStore>,
    source: &str,
    writer: &mut WriteMultipart,
) -> Result<()> {
    let mut stream = store.get(&StoragePath::from(source)).await?.into_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        writer.wait_for_capacity(COMPOSE_UPLOAD_CONCURRENCY).await?;
        writer.write(&chunk);
    }

    Ok(())
}
