//! Recursive batch compose
//!
//! Object stores cap how many sources one compose call may take (32 on GCS). Merging more
//! than that builds a k-way tree: each pass composes consecutive batches of at most K names
//! into intermediate objects under `tmp/<request_id>/`, and the next pass composes those,
//! until at most K remain and a final compose writes the destination.
//!
//! ## Key Components
//!
//! - [`BatchComposer`] - runs a merge against any [`ObjectStoreClient`](crate::storage::ObjectStoreClient)
//! - [`ComposerOptions`] - K, per-pass concurrency and the final-error policy
//! - [`RequestId`] - per-merge namespace for intermediate objects
//! - [`MergeReport`] - what a successful merge did
//!
//! ## Cleanup policy
//!
//! Intermediates are deleted only after the step that consumed them succeeded. A failing
//! step leaves its own inputs (and any outputs it already wrote) in storage; everything
//! consumed earlier has been removed by then.

mod composer;
mod error;
mod naming;

pub use composer::{BatchComposer, ComposerOptions, MergeReport};
pub use error::MergeError;
pub use naming::{RequestId, intermediate_name, intermediate_prefix, plan_passes};
