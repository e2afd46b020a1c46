//! External metadata lookup. The scanner treats every failure here as
//! "no enrichment", never as a scan failure.

pub mod omdb;

pub use omdb::OmdbProvider;

use async_trait::async_trait;

use crate::media::VideoDetails;

#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("API error: {0}")]
    Api(String),

    #[error("title not found")]
    NotFound,

    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("malformed response: {0}")]
    Parse(String),
}

/// A remote (or local) lookup that resolves a title to descriptive
/// metadata. Implementations may be slow; callers bound each lookup with
/// their own timeout.
#[async_trait]
pub trait MetadataProvider: Send + Sync {
    async fn lookup(&self, title: &str) -> Result<VideoDetails, ProviderError>;

    fn name(&self) -> &'static str;
}
