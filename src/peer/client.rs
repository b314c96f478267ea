use std::io;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use futures_util::{StreamExt, TryStreamExt};
use reqwest::Client;
use tokio_util::codec::FramedRead;
use tokio_util::io::StreamReader;
use tracing::debug;

use super::codec::{PullItem, PullItemCodec, PullRequest};
use crate::config::PULL_ROUTE;
use crate::manifest::FragmentKey;

/// Response of a pull call, consumed item by item until it ends.
pub type PullStream = BoxStream<'static, Result<PullItem>>;

/// Opens pull calls against peer addresses.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn pull(&self, peer: &str, fragment_keys: Vec<FragmentKey>) -> Result<PullStream>;
}

/// Pull client over HTTP. The underlying client pools connections per peer
/// address, so calls to different peers never share a connection.
#[derive(Clone, Default)]
pub struct HttpPeerConnector {
    client: Client,
}

impl HttpPeerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

/// Pull endpoint for a member address (`host:port` or a full base URL).
pub fn pull_url(peer: &str) -> String {
    if peer.starts_with("http://") || peer.starts_with("https://") {
        format!("{}{}", peer.trim_end_matches('/'), PULL_ROUTE)
    } else {
        format!("http://{}{}", peer, PULL_ROUTE)
    }
}

#[async_trait]
impl PeerConnector for HttpPeerConnector {
    async fn pull(&self, peer: &str, fragment_keys: Vec<FragmentKey>) -> Result<PullStream> {
        let url = pull_url(peer);
        debug!("pull call url={} keys={}", url, fragment_keys.len());

        let resp = self
            .client
            .post(&url)
            .json(&PullRequest { fragment_keys })
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(anyhow!("pull from {} failed: HTTP {}", peer, status.as_u16()));
        }

        let body = resp.bytes_stream().map_err(io::Error::other);
        let frames = FramedRead::new(StreamReader::new(body), PullItemCodec::default())
            .map_err(anyhow::Error::from);
        Ok(frames.boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_url() {
        assert_eq!(pull_url("127.0.0.1:5000"), "http://127.0.0.1:5000/pull");
        assert_eq!(pull_url("http://peer:80/"), "http://peer:80/pull");
        assert_eq!(pull_url("https://peer"), "https://peer/pull");
    }
}
