// A node pairs one download session with the pull service over its store.

use std::sync::Arc;

use anyhow::Result;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::engine::downloader::{Downloader, SessionOutcome};
use crate::error::EngineResult;
use crate::server::handler::PullServer;

pub struct Node {
    downloader: Arc<Downloader>,
    server: PullServer,
    cancel: CancellationToken,
}

impl Node {
    /// Start serving pulls on `bind_addr` (port 0 picks a free port). The
    /// session itself is started separately with [`Node::spawn_session`], so
    /// the address can be published to other nodes first.
    pub async fn start(downloader: Downloader, bind_addr: &str) -> Result<Self> {
        let server = PullServer::start(bind_addr, downloader.pull_service()).await?;
        Ok(Self {
            downloader: Arc::new(downloader),
            server,
            cancel: CancellationToken::new(),
        })
    }

    /// Address other nodes should put in their member lists.
    pub fn peer_address(&self) -> String {
        self.server.peer_address()
    }

    pub fn downloader(&self) -> &Arc<Downloader> {
        &self.downloader
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the download session in the background.
    pub fn spawn_session(&self) -> JoinHandle<EngineResult<SessionOutcome>> {
        let downloader = Arc::clone(&self.downloader);
        let cancel = self.cancel.clone();
        tokio::spawn(async move { downloader.run(cancel).await })
    }

    /// Keep serving pulls until the node's token is cancelled. A session that
    /// already completed leaves the store in place for other nodes.
    pub async fn serve_until_cancelled(&self) {
        self.cancel.cancelled().await;
    }

    /// Stop the session at its next iteration boundary and close the listener.
    pub fn shutdown(self) {
        info!("node {} shutting down", self.server.peer_address());
        self.cancel.cancel();
        self.server.shutdown();
    }
}
