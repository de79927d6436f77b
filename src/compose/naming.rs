use std::fmt;
use uuid::Uuid;

/// Namespace token for one merge's intermediate objects
///
/// Generated as a UUIDv7: a millisecond timestamp followed by random bits, so ids minted
/// concurrently on different requests do not collide.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<&str> for RequestId {
    fn from(value: &str) -> Self {
        RequestId(value.to_string())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Prefix under which every intermediate of `request_id` lives
pub fn intermediate_prefix(request_id: &RequestId) -> String {
    format!("tmp/{request_id}/")
}

/// Name of the intermediate produced by batch `index` of batch pass `pass`
///
/// The first pass writes `tmp/<id>/intermediate_<i>`; later passes get their own
/// `pass_<p>/` directory so a pass never overwrites the objects it is reading.
pub fn intermediate_name(request_id: &RequestId, pass: usize, index: usize) -> String {
    if pass == 0 {
        format!("tmp/{request_id}/intermediate_{index}")
    } else {
        format!("tmp/{request_id}/pass_{pass}/intermediate_{index}")
    }
}

/// Number of compose passes needed to merge `sources` objects with a K-way compose
///
/// One pass when everything fits in a single call, otherwise one batch pass per level of
/// the tree plus the final compose. Equals `ceil(log_k(sources))` for `sources >= 2`.
pub fn plan_passes(sources: usize, max_sources: usize) -> usize {
    let mut remaining = sources;
    let mut passes = 1;
    while remaining > max_sources {
        remaining = remaining.div_ceil(max_sources);
        passes += 1;
    }
    passes
}
