use std::sync::Arc;

use crate::compose::BatchComposer;
use crate::config::Config;
use crate::observability::Metrics;
use crate::signing::SignedUrlIssuer;
use crate::storage::ObjectStoreClient;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub storage: Arc<dyn ObjectStoreClient>,
    pub composer: Arc<BatchComposer>,
    pub issuer: Arc<SignedUrlIssuer>,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(
        config: Config,
        storage: Arc<dyn ObjectStoreClient>,
        issuer: SignedUrlIssuer,
    ) -> Self {
        let composer = BatchComposer::new(storage.clone(), config.composer_options());

        Self {
            config: Arc::new(config),
            storage,
            composer: Arc::new(composer),
            issuer: Arc::new(issuer),
            metrics: Arc::new(Metrics::new()),
        }
    }

    /// Default bucket, if configured
    pub fn bucket(&self) -> Option<&str> {
        self.config
            .storage
            .bucket
            .as_deref()
            .filter(|bucket| !bucket.trim().is_empty())
    }
}
