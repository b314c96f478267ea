use std::collections::HashMap;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};
use tracing::{debug, warn};

use super::traits::RemoteFetcher;

/// HTTP range fetcher. One client is shared by every request so connections
/// to the same origin are reused. `headers` go out with every request.
pub struct HttpFetcher {
    client: Client,
    headers: HashMap<String, String>,
}

impl HttpFetcher {
    pub fn new(headers: HashMap<String, String>) -> Self {
        Self::with_client(Client::new(), headers)
    }

    pub fn with_client(client: Client, headers: HashMap<String, String>) -> Self {
        Self { client, headers }
    }

    fn build_request(&self, uri: &str, range_header: &str) -> RequestBuilder {
        let mut req = self.client.get(uri);
        for (k, v) in &self.headers {
            req = req.header(k.as_str(), v.as_str());
        }
        req.header(reqwest::header::RANGE, range_header)
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(HashMap::new())
    }
}

/// `Range` header value for `[offset, offset + length)`.
pub fn range_header(offset: u64, length: u64) -> Option<String> {
    if length == 0 {
        return None;
    }
    let last = offset.checked_add(length - 1)?;
    Some(format!("bytes={}-{}", offset, last))
}

#[async_trait]
impl RemoteFetcher for HttpFetcher {
    async fn fetch(&self, uri: &str, offset: u64, length: u64) -> Result<Bytes> {
        let range = range_header(offset, length)
            .ok_or_else(|| anyhow!("invalid range offset={} length={}", offset, length))?;
        debug!("http fetch uri={} range={}", uri, range);

        let resp = self.build_request(uri, &range).send().await?;
        let status = resp.status();
        if !status.is_success() {
            warn!(
                "http fetch failed status={} uri={} range={}",
                status.as_u16(),
                uri,
                range
            );
            return Err(anyhow!("fetch failed: HTTP {}", status.as_u16()));
        }

        let bytes = resp.bytes().await?;

        // A 200 carries the whole resource; slice out the range ourselves.
        let bytes = if status == StatusCode::OK && bytes.len() as u64 != length {
            let start = offset as usize;
            let end = start.saturating_add(length as usize);
            if end > bytes.len() {
                return Err(anyhow!(
                    "short body: {} bytes, range ends at {}",
                    bytes.len(),
                    end
                ));
            }
            bytes.slice(start..end)
        } else {
            bytes
        };

        if bytes.len() as u64 != length {
            warn!(
                "http fetch length mismatch uri={} range={} got={}",
                uri,
                range,
                bytes.len()
            );
            return Err(anyhow!(
                "fetch returned {} bytes, expected {}",
                bytes.len(),
                length
            ));
        }
        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_header() {
        assert_eq!(range_header(0, 100).as_deref(), Some("bytes=0-99"));
        assert_eq!(
            range_header(4_194_304, 354_455).as_deref(),
            Some("bytes=4194304-4548758")
        );
        assert_eq!(range_header(10, 0), None);
        assert_eq!(range_header(u64::MAX, 2), None);
    }
}
