use thiserror::Error;

use crate::upstream::UpstreamError;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("Malformed upstream data: {0}")]
    MalformedUpstream(String),

    #[error("Storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("Refresh aborted: {0}")]
    RefreshAborted(String),
}

impl From<UpstreamError> for CacheError {
    fn from(err: UpstreamError) -> Self {
        if err.is_malformed() {
            CacheError::MalformedUpstream(err.to_string())
        } else {
            CacheError::UpstreamUnavailable(err.to_string())
        }
    }
}
