use bon::Builder;
use futures::{TryStreamExt, stream};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::error::MergeError;
use super::naming::{RequestId, intermediate_name, intermediate_prefix};
use crate::storage::{DEFAULT_MAX_COMPOSE_SOURCES, ObjectStoreClient};

/// Tuning for [`BatchComposer`]
#[derive(Debug, Clone, Builder)]
pub struct ComposerOptions {
    /// K: the most sources one compose call is given
    #[builder(default = DEFAULT_MAX_COMPOSE_SOURCES)]
    pub max_sources: usize,
    /// Batches of one pass composed at the same time (1 = strictly sequential)
    #[builder(default = 1)]
    pub concurrency: usize,
    /// Report success when the final compose into `dest` fails.
    ///
    /// Off by default. Turning it on reproduces the behaviour of the first gateway release,
    /// where a failed final compose was logged and the merge still answered success (and
    /// still deleted the intermediates it had consumed).
    #[builder(default = false)]
    pub ignore_final_compose_error: bool,
}

impl Default for ComposerOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Summary of a successful merge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeReport {
    pub request_id: RequestId,
    pub sources: usize,
    pub passes: usize,
    pub compose_calls: usize,
    pub intermediates_created: usize,
    pub intermediates_deleted: usize,
    pub cleanup_failures: usize,
}

impl MergeReport {
    fn new(request_id: RequestId, sources: usize) -> Self {
        Self {
            request_id,
            sources,
            passes: 0,
            compose_calls: 0,
            intermediates_created: 0,
            intermediates_deleted: 0,
            cleanup_failures: 0,
        }
    }
}

/// Merges an ordered list of objects into one, working around the store's compose limit
#[derive(Clone)]
pub struct BatchComposer {
    store: Arc<dyn ObjectStoreClient>,
    options: ComposerOptions,
}

impl BatchComposer {
    pub fn new(store: Arc<dyn ObjectStoreClient>, options: ComposerOptions) -> Self {
        Self { store, options }
    }

    pub fn options(&self) -> &ComposerOptions {
        &self.options
    }

    /// Merge `sources` (in order) into `dest`
    ///
    /// Sources that fit in one compose call are composed straight into `dest`. Longer lists
    /// are composed in batches of K into intermediates under `tmp/<request_id>/`, pass after
    /// pass, until the remaining intermediates fit in the final compose.
    pub async fn merge(
        &self,
        bucket: &str,
        sources: &[String],
        dest: &str,
        request_id: &RequestId,
    ) -> Result<MergeReport, MergeError> {
        if sources.is_empty() {
            return Err(MergeError::EmptySources);
        }
        if dest.trim().is_empty() {
            return Err(MergeError::EmptyDestination);
        }

        let max_sources = self.options.max_sources;
        if max_sources < 2 {
            return Err(MergeError::InvariantViolation(format!(
                "compose limit must be at least 2, got {max_sources}"
            )));
        }

        let mut report = MergeReport::new(request_id.clone(), sources.len());
        let mut current: Vec<String> = sources.to_vec();
        // Intermediates that make up `current`; deleted once the step reading them succeeds
        let mut consumed: Vec<String> = Vec::new();
        let mut pass = 0;

        while current.len() > max_sources {
            let outputs = self.run_batch_pass(bucket, &current, pass, request_id).await?;

            report.passes += 1;
            report.compose_calls += outputs.len();
            report.intermediates_created += outputs.len();
            info!(
                request_id = %request_id,
                pass,
                inputs = current.len(),
                intermediates = outputs.len(),
                "Batch pass complete"
            );

            self.cleanup(bucket, &consumed, &mut report).await;
            consumed = outputs.clone();
            current = outputs;
            pass += 1;
        }

        report.passes += 1;
        report.compose_calls += 1;
        match self.compose_batch(bucket, &current, dest, pass).await {
            Ok(()) => {}
            Err(err @ MergeError::Store { .. }) if self.options.ignore_final_compose_error => {
                warn!(
                    request_id = %request_id,
                    dest,
                    error = %err,
                    "Final compose failed; reporting success because ignore_final_compose_error is set"
                );
            }
            Err(err) => return Err(err),
        }

        self.cleanup(bucket, &consumed, &mut report).await;

        info!(
            request_id = %request_id,
            dest,
            sources = report.sources,
            passes = report.passes,
            compose_calls = report.compose_calls,
            "Merge complete"
        );

        Ok(report)
    }

    /// [`merge`](Self::merge) bounded by a wall-clock limit
    ///
    /// When the limit fires the in-flight store call is dropped and no cleanup is attempted:
    /// whatever was written under `tmp/<request_id>/` stays there and the prefix is logged.
    pub async fn merge_within(
        &self,
        limit: Duration,
        bucket: &str,
        sources: &[String],
        dest: &str,
        request_id: &RequestId,
    ) -> Result<MergeReport, MergeError> {
        match tokio::time::timeout(limit, self.merge(bucket, sources, dest, request_id)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    request_id = %request_id,
                    orphan_prefix = %intermediate_prefix(request_id),
                    ?limit,
                    "Merge timed out, intermediates left in storage"
                );
                Err(MergeError::TimedOut(limit))
            }
        }
    }

    /// Compose `inputs` in consecutive batches of K, returning the intermediates in batch order
    async fn run_batch_pass(
        &self,
        bucket: &str,
        inputs: &[String],
        pass: usize,
        request_id: &RequestId,
    ) -> Result<Vec<String>, MergeError> {
        let max_sources = self.options.max_sources;
        let outputs: Vec<String> = (0..inputs.len().div_ceil(max_sources))
            .map(|index| intermediate_name(request_id, pass, index))
            .collect();

        let targets = &outputs;
        stream::iter(inputs.chunks(max_sources).enumerate().map(Ok::<_, MergeError>))
            .try_for_each_concurrent(self.options.concurrency.max(1), move |(index, batch)| {
                self.compose_batch(bucket, batch, &targets[index], pass)
            })
            .await?;

        Ok(outputs)
    }

    async fn compose_batch(
        &self,
        bucket: &str,
        batch: &[String],
        target: &str,
        pass: usize,
    ) -> Result<(), MergeError> {
        if batch.is_empty() || batch.len() > self.options.max_sources {
            return Err(MergeError::InvariantViolation(format!(
                "batch of {} sources for '{}' outside compose limit 1..={}",
                batch.len(),
                target,
                self.options.max_sources
            )));
        }

        debug!(pass, target, sources = batch.len(), "Composing batch");

        self.store
            .compose(bucket, batch, target)
            .await
            .map_err(|source| MergeError::Store {
                pass,
                target: target.to_string(),
                source,
            })
    }

    /// Best-effort delete; failures are logged and counted, never returned
    async fn cleanup(&self, bucket: &str, intermediates: &[String], report: &mut MergeReport) {
        for name in intermediates {
            match self.store.delete(bucket, name).await {
                Ok(()) => report.intermediates_deleted += 1,
                Err(e) => {
                    report.cleanup_failures += 1;
                    warn!(
                        request_id = %report.request_id,
                        intermediate = %name,
                        error = %e,
                        "Failed to delete intermediate"
                    );
                }
            }
        }
    }
}
