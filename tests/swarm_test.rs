// Two nodes sharing fragments over the HTTP pull service.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use bytes::Bytes;

use multisource_fetch::api::node::Node;
use multisource_fetch::manifest::{Manifest, ManifestBuilder};
use multisource_fetch::peer::client::HttpPeerConnector;
use multisource_fetch::peer::membership::StaticMembership;
use multisource_fetch::source::traits::RemoteFetcher;
use multisource_fetch::store::memory::MemoryStore;
use multisource_fetch::{Downloader, DownloaderOptions, SessionOutcome};

const REMOTE_URI: &str = "http://origin.test/13w16a.jar";
const FILE_SIZE: usize = 4_548_759;

struct CountingOrigin {
    content: Bytes,
    calls: AtomicUsize,
}

impl CountingOrigin {
    fn new(content: Bytes) -> Self {
        Self {
            content,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl RemoteFetcher for CountingOrigin {
    async fn fetch(&self, uri: &str, offset: u64, length: u64) -> Result<Bytes> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if uri != REMOTE_URI {
            return Err(anyhow!("404 {}", uri));
        }
        let start = offset as usize;
        let end = (start + length as usize).min(self.content.len());
        Ok(self.content.slice(start..end))
    }
}

fn content() -> Bytes {
    (0..FILE_SIZE)
        .map(|i| (i * 7 % 253) as u8)
        .collect::<Vec<u8>>()
        .into()
}

fn manifest() -> Arc<Manifest> {
    Arc::new(
        ManifestBuilder::new(2_097_152, 1_048_576)
            .add_file("out/13w16a.jar", REMOTE_URI, FILE_SIZE as u64)
            .build()
            .unwrap(),
    )
}

fn options(base: &std::path::Path, bias: f64) -> DownloaderOptions {
    DownloaderOptions {
        local_base_path: base.to_path_buf(),
        remote_vs_peer_bias: bias,
        loop_interval_ms: 0,
        ..Default::default()
    }
}

#[tokio::test]
async fn test_second_node_downloads_entirely_from_first() {
    let content = content();
    let manifest = manifest();

    let dir_b = tempfile::tempdir().unwrap();
    let origin_b = Arc::new(CountingOrigin::new(content.clone()));
    let b = Downloader::new(
        options(dir_b.path(), 0.0),
        manifest.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticMembership::default()),
        Arc::new(HttpPeerConnector::new()),
        origin_b.clone(),
    )
    .unwrap();
    let node_b = Node::start(b, "127.0.0.1:0").await.unwrap();
    let outcome_b = node_b.spawn_session().await.unwrap().unwrap();
    assert_eq!(outcome_b, SessionOutcome::Completed);
    assert_eq!(origin_b.calls.load(Ordering::SeqCst), 3);

    let dir_a = tempfile::tempdir().unwrap();
    let origin_a = Arc::new(CountingOrigin::new(content.clone()));
    let a = Downloader::new(
        options(dir_a.path(), 1.0),
        manifest.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticMembership::new(vec![node_b.peer_address()])),
        Arc::new(HttpPeerConnector::new()),
        origin_a.clone(),
    )
    .unwrap();
    let node_a = Node::start(a, "127.0.0.1:0").await.unwrap();
    let outcome_a = tokio::time::timeout(Duration::from_secs(30), node_a.spawn_session())
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(outcome_a, SessionOutcome::Completed);
    assert_eq!(origin_a.calls.load(Ordering::SeqCst), 0);
    assert_eq!(
        std::fs::read(dir_a.path().join("out/13w16a.jar")).unwrap(),
        content.to_vec()
    );

    let served = node_b.downloader().stats().snapshot().served_bytes;
    assert!(served >= FILE_SIZE as u64);
    assert_eq!(
        node_a.downloader().stats().snapshot().peer_bytes,
        FILE_SIZE as u64
    );

    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test]
async fn test_two_concurrent_nodes_both_complete() {
    let content = content();
    let manifest = manifest();
    let origin = Arc::new(CountingOrigin::new(content.clone()));

    let dir_a = tempfile::tempdir().unwrap();
    let dir_b = tempfile::tempdir().unwrap();
    let members_a = Arc::new(StaticMembership::default());
    let members_b = Arc::new(StaticMembership::default());

    let make = |dir: &std::path::Path, members: Arc<StaticMembership>| {
        Downloader::new(
            options(dir, 0.5),
            manifest.clone(),
            Arc::new(MemoryStore::new()),
            members,
            Arc::new(HttpPeerConnector::new()),
            origin.clone(),
        )
        .unwrap()
    };
    let node_a = Node::start(make(dir_a.path(), members_a.clone()), "127.0.0.1:0")
        .await
        .unwrap();
    let node_b = Node::start(make(dir_b.path(), members_b.clone()), "127.0.0.1:0")
        .await
        .unwrap();
    members_a.add(node_b.peer_address());
    members_b.add(node_a.peer_address());

    let (ra, rb) = tokio::time::timeout(
        Duration::from_secs(30),
        futures_util::future::join(node_a.spawn_session(), node_b.spawn_session()),
    )
    .await
    .unwrap();
    assert_eq!(ra.unwrap().unwrap(), SessionOutcome::Completed);
    assert_eq!(rb.unwrap().unwrap(), SessionOutcome::Completed);

    for dir in [dir_a.path(), dir_b.path()] {
        assert_eq!(
            std::fs::read(dir.join("out/13w16a.jar")).unwrap(),
            content.to_vec()
        );
    }
    // Each node needs at most one origin fetch per segment.
    assert!(origin.calls.load(Ordering::SeqCst) <= 6);

    node_a.shutdown();
    node_b.shutdown();
}

#[tokio::test]
async fn test_completed_node_keeps_serving_until_cancelled() {
    let content = content();
    let manifest = manifest();

    let dir_b = tempfile::tempdir().unwrap();
    let b = Downloader::new(
        options(dir_b.path(), 0.0),
        manifest.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticMembership::default()),
        Arc::new(HttpPeerConnector::new()),
        Arc::new(CountingOrigin::new(content.clone())),
    )
    .unwrap();
    let node_b = Node::start(b, "127.0.0.1:0").await.unwrap();
    let outcome_b = node_b.spawn_session().await.unwrap().unwrap();
    assert_eq!(outcome_b, SessionOutcome::Completed);

    let mut seeding = Box::pin(node_b.serve_until_cancelled());

    let dir_a = tempfile::tempdir().unwrap();
    let origin_a = Arc::new(CountingOrigin::new(content.clone()));
    let a = Downloader::new(
        options(dir_a.path(), 1.0),
        manifest.clone(),
        Arc::new(MemoryStore::new()),
        Arc::new(StaticMembership::new(vec![node_b.peer_address()])),
        Arc::new(HttpPeerConnector::new()),
        origin_a.clone(),
    )
    .unwrap();
    let node_a = Node::start(a, "127.0.0.1:0").await.unwrap();

    let outcome_a = tokio::select! {
        _ = &mut seeding => panic!("seeding ended before cancellation"),
        joined = tokio::time::timeout(Duration::from_secs(30), node_a.spawn_session()) => {
            joined.unwrap().unwrap().unwrap()
        }
    };
    assert_eq!(outcome_a, SessionOutcome::Completed);
    assert_eq!(origin_a.calls.load(Ordering::SeqCst), 0);

    node_b.cancel_token().cancel();
    tokio::time::timeout(Duration::from_secs(1), seeding)
        .await
        .unwrap();

    node_a.shutdown();
    node_b.shutdown();
}
