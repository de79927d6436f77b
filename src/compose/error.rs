use std::time::Duration;
use thiserror::Error;

use crate::storage::StoreError;

#[derive(Debug, Error)]
pub enum MergeError {
    #[error("sources cannot be empty")]
    EmptySources,

    #[error("dest cannot be empty")]
    EmptyDestination,

    /// The composer was asked to do something its own batching should have prevented
    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("compose into '{target}' failed during pass {pass}: {source}")]
    Store {
        pass: usize,
        target: String,
        #[source]
        source: StoreError,
    },

    #[error("merge timed out after {0:?}")]
    TimedOut(Duration),
}

impl MergeError {
    /// True when the request itself was unusable and no store call was made
    pub fn is_precondition(&self) -> bool {
        matches!(self, MergeError::EmptySources | MergeError::EmptyDestination)
    }
}
