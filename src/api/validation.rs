use thiserror::Error;

use super::models::MergeRequest;

#[derive(Debug, Error)]
pub enum MergeRequestError {
    #[error("sources cannot be empty")]
    EmptySources,
    #[error("dest cannot be empty")]
    EmptyDest,
    #[error("source at position {0} has an empty name")]
    BlankSource(usize),
}

/// Validate a merge request before any store call is made
pub fn validate_merge_request(request: &MergeRequest) -> Result<(), MergeRequestError> {
    if request.sources.is_empty() {
        return Err(MergeRequestError::EmptySources);
    }

    if request.dest.trim().is_empty() {
        return Err(MergeRequestError::EmptyDest);
    }

    if let Some(index) = request.sources.iter().position(|s| s.trim().is_empty()) {
        return Err(MergeRequestError::BlankSource(index));
    }

    Ok(())
}
