use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;

/// Ranged reads from the canonical origin.
///
/// A successful call returns exactly `length` bytes starting at `offset`;
/// anything else must be reported as an error.
#[async_trait]
pub trait RemoteFetcher: Send + Sync {
    async fn fetch(&self, uri: &str, offset: u64, length: u64) -> Result<Bytes>;
}
