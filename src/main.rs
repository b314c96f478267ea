use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use clap::Parser;
use tracing::{error, info};

use multisource_fetch::api::logging::init_tracing;
use multisource_fetch::api::node::Node;
use multisource_fetch::config::{DownloaderOptions, DEFAULT_LOOP_INTERVAL_MS};
use multisource_fetch::manifest::Manifest;
use multisource_fetch::peer::client::HttpPeerConnector;
use multisource_fetch::peer::membership::StaticMembership;
use multisource_fetch::source::http_source::HttpFetcher;
use multisource_fetch::store::disk::DiskStore;
use multisource_fetch::{Downloader, SessionOutcome};

/// Download the files of a manifest from the origin and from peers, while
/// serving already-held fragments to those peers.
#[derive(Debug, Parser)]
#[command(name = "msfetch", version)]
struct Args {
    /// Manifest JSON describing files, segments and fragments.
    #[arg(long)]
    manifest: PathBuf,

    /// Directory completed files are written under.
    #[arg(long, default_value = ".")]
    base_path: PathBuf,

    /// Directory of the fragment store.
    #[arg(long, default_value = "fragments")]
    store_dir: PathBuf,

    /// Address the pull service listens on.
    #[arg(long, default_value = "127.0.0.1:0")]
    listen: String,

    /// Peer address (`host:port`); repeat for several peers.
    #[arg(long = "peer")]
    peers: Vec<String>,

    /// Probability of pulling from a peer instead of the origin each iteration.
    #[arg(long, default_value_t = 0.5)]
    bias: f64,

    /// Minimum milliseconds between iteration starts.
    #[arg(long, default_value_t = DEFAULT_LOOP_INTERVAL_MS)]
    interval_ms: u64,

    /// Peer batch size as a multiple of fragments per segment.
    #[arg(long, default_value_t = 3.0)]
    peer_factor: f64,

    /// Count fragments already in the store as downloaded.
    #[arg(long)]
    resume: bool,

    /// After completing, keep serving pulls to peers until interrupted.
    #[arg(long)]
    seed: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let manifest = Arc::new(Manifest::load(&args.manifest)?);
    let store = Arc::new(DiskStore::open(&args.store_dir)?);
    let options = DownloaderOptions {
        local_base_path: args.base_path,
        remote_vs_peer_bias: args.bias,
        loop_interval_ms: args.interval_ms,
        peer_fragment_factor: args.peer_factor,
        resume_from_store: args.resume,
    };

    let downloader = Downloader::new(
        options,
        manifest,
        store,
        Arc::new(StaticMembership::new(args.peers)),
        Arc::new(HttpPeerConnector::new()),
        Arc::new(HttpFetcher::default()),
    )?;

    let node = Node::start(downloader, &args.listen).await?;
    info!("serving pulls on {}", node.peer_address());

    let cancel = node.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, stopping after the current iteration");
            cancel.cancel();
        }
    });

    let outcome = node.spawn_session().await?;
    if args.seed && matches!(outcome, Ok(SessionOutcome::Completed)) {
        info!("download complete, seeding on {} until interrupted", node.peer_address());
        node.serve_until_cancelled().await;
    }
    let stats = node.downloader().stats().snapshot();
    node.shutdown();

    match outcome {
        Ok(SessionOutcome::Completed) => {
            info!(
                "finished: remote_bytes={} peer_bytes={} served_bytes={}",
                stats.remote_bytes, stats.peer_bytes, stats.served_bytes
            );
            Ok(())
        }
        Ok(SessionOutcome::Stopped) => Err(anyhow!("stopped before completion")),
        Err(e) => {
            error!("session failed: {}", e);
            Err(e.into())
        }
    }
}
