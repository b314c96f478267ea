// Download engine: the per-session reconciliation loop over origin fetches and peer pulls.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::assembly::write_file;
use super::state::CompletionState;
use super::stats::StatsCollector;
use crate::config::DownloaderOptions;
use crate::error::{EngineError, EngineResult};
use crate::manifest::{split_fragments, FileEntry, Manifest};
use crate::peer::client::PeerConnector;
use crate::peer::membership::MembershipSource;
use crate::sampling::{reservoir_sample, sample_one};
use crate::server::handler::PullService;
use crate::source::traits::RemoteFetcher;
use crate::store::traits::{FragmentStore, FragmentStoreExt};

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Every file was assembled and written.
    Completed,
    /// Cancellation was observed at an iteration boundary.
    Stopped,
}

/// Acquires every file of a manifest by mixing ranged origin fetches with
/// fragment pulls from peers.
pub struct Downloader {
    options: DownloaderOptions,
    manifest: Arc<Manifest>,
    store: Arc<dyn FragmentStore>,
    members: Arc<dyn MembershipSource>,
    connector: Arc<dyn PeerConnector>,
    fetcher: Arc<dyn RemoteFetcher>,
    stats: Arc<StatsCollector>,
}

impl Downloader {
    pub fn new(
        options: DownloaderOptions,
        manifest: Arc<Manifest>,
        store: Arc<dyn FragmentStore>,
        members: Arc<dyn MembershipSource>,
        connector: Arc<dyn PeerConnector>,
        fetcher: Arc<dyn RemoteFetcher>,
    ) -> EngineResult<Self> {
        options.validate()?;
        Ok(Self {
            options,
            manifest,
            store,
            members,
            connector,
            fetcher,
            stats: Arc::new(StatsCollector::new()),
        })
    }

    pub fn manifest(&self) -> &Arc<Manifest> {
        &self.manifest
    }

    pub fn options(&self) -> &DownloaderOptions {
        &self.options
    }

    pub fn stats(&self) -> &Arc<StatsCollector> {
        &self.stats
    }

    /// Pull service over this session's store, for hosting alongside the loop.
    pub fn pull_service(&self) -> PullService {
        PullService::new(Arc::clone(&self.store)).with_stats(Arc::clone(&self.stats))
    }

    /// Run a session with an entropy-seeded generator.
    pub async fn run(&self, cancel: CancellationToken) -> EngineResult<SessionOutcome> {
        let mut rng = StdRng::from_entropy();
        self.run_with_rng(&mut rng, cancel).await
    }

    /// Run a session until every file is written or `cancel` fires.
    ///
    /// Cancellation is checked at the top of each iteration; a fetch or pull
    /// that has started always runs to completion or failure.
    pub async fn run_with_rng<R: Rng + Send>(
        &self,
        rng: &mut R,
        cancel: CancellationToken,
    ) -> EngineResult<SessionOutcome> {
        let mut state = CompletionState::new(&self.manifest);
        if self.options.resume_from_store {
            self.resume(&mut state)?;
        }
        // Zero-length files have no segments to wait for.
        for file in self.manifest.files() {
            self.complete_file_if_known(&mut state, file).await?;
        }

        info!(
            "session started files={} fragments={} bias={} interval_ms={}",
            state.unknown_file_count(),
            state.unknown_fragment_count(),
            self.options.remote_vs_peer_bias,
            self.options.loop_interval_ms
        );
        if state.is_complete() {
            info!("session completed: nothing to download");
            return Ok(SessionOutcome::Completed);
        }

        let interval = Duration::from_millis(self.options.loop_interval_ms);
        loop {
            if cancel.is_cancelled() {
                info!(
                    "session stopped with {} files outstanding",
                    state.unknown_file_count()
                );
                return Ok(SessionOutcome::Stopped);
            }

            let started = Instant::now();
            self.stats.record_iteration();

            let r: f64 = rng.gen();
            if r <= self.options.remote_vs_peer_bias {
                self.peer_step(&mut state, rng).await?;
            } else {
                self.remote_step(&mut state, rng).await?;
            }

            let elapsed = started.elapsed();
            if state.is_complete() {
                let snap = self.stats.snapshot();
                info!(
                    "session completed iterations={} remote_bytes={} peer_bytes={}",
                    snap.iterations, snap.remote_bytes, snap.peer_bytes
                );
                return Ok(SessionOutcome::Completed);
            }

            // Pace iteration starts; the sleep ends early on cancellation.
            if let Some(rest) = interval.checked_sub(elapsed).filter(|d| !d.is_zero()) {
                tokio::select! {
                    _ = tokio::time::sleep(rest) => {}
                    _ = cancel.cancelled() => {}
                }
            }
        }
    }

    /// Fetch one unknown segment from the origin.
    async fn remote_step<R: Rng + Send>(
        &self,
        state: &mut CompletionState,
        rng: &mut R,
    ) -> EngineResult<()> {
        debug!("download segment from remote");
        let Some(segment) = sample_one(state.unknown_segments(&self.manifest), rng) else {
            debug!("no unknown segments left for remote fetch");
            return Ok(());
        };
        let file = self.manifest.file(segment.file_key).ok_or_else(|| {
            EngineError::InvalidManifest(format!("segment {} has no file", segment.key))
        })?;
        let length = self.manifest.segment_len(segment);
        debug!(
            "chose segment {} from file({}, {}) length={}",
            segment.key, file.key, segment.offset_in_file, length
        );

        let data = match self
            .fetcher
            .fetch(&file.remote_path, segment.offset_in_file, length)
            .await
        {
            Ok(data) if data.len() as u64 == length => data,
            Ok(data) => {
                warn!(
                    "remote fetch of segment {} returned {} bytes, expected {}",
                    segment.key,
                    data.len(),
                    length
                );
                self.stats.record_remote_failure();
                return Ok(());
            }
            Err(e) => {
                warn!("remote fetch of segment {} failed: {:#}", segment.key, e);
                self.stats.record_remote_failure();
                return Ok(());
            }
        };
        self.stats.record_remote(length);

        let fragments = split_fragments(&data, self.manifest.fragment_size() as usize);
        if fragments.len() != segment.fragment_keys.len() {
            warn!(
                "segment {} split into {} fragments, manifest lists {}",
                segment.key,
                fragments.len(),
                segment.fragment_keys.len()
            );
            self.stats.record_remote_failure();
            return Ok(());
        }

        for (&key, value) in segment.fragment_keys.iter().zip(fragments) {
            let len = value.len();
            self.store
                .put_fragment(key, value)
                .map_err(EngineError::Store)?;
            state.mark_fragment_known(key);
            debug!("fragment {} saved ({} bytes)", key, len);
        }
        state.mark_segment_known(segment.key);
        debug!("all fragments of segment {} known", segment.key);

        self.complete_file_if_known(state, file).await
    }

    /// Pull a random batch of unknown fragments from one random peer.
    async fn peer_step<R: Rng + Send>(
        &self,
        state: &mut CompletionState,
        rng: &mut R,
    ) -> EngineResult<()> {
        debug!("download fragments from peer");
        let want = (self.manifest.fragments_per_segment() as f64
            * self.options.peer_fragment_factor)
            .floor() as usize;
        let wanted = reservoir_sample(state.unknown_fragments(), rng, want);
        if wanted.is_empty() {
            debug!("no fragments to pull (want={})", want);
            return Ok(());
        }

        let Some(peer) = sample_one(self.members.members(), rng) else {
            warn!("no peers available for pull");
            self.stats.record_peer_failure();
            return Ok(());
        };

        debug!("pull fragments {:?} from peer {}", wanted, peer);
        self.stats.record_peer_pull();
        let mut stream = match self.connector.pull(&peer, wanted).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("pull from peer {} failed: {:#}", peer, e);
                self.stats.record_peer_failure();
                return Ok(());
            }
        };

        let mut received = 0usize;
        while let Some(item) = stream.next().await {
            let item = match item {
                Ok(item) => item,
                Err(e) => {
                    warn!(
                        "pull stream from peer {} failed after {} items: {:#}",
                        peer, received, e
                    );
                    self.stats.record_peer_failure();
                    break;
                }
            };
            let Some(fragment) = self.manifest.fragment(item.fragment_key) else {
                warn!(
                    "peer {} sent fragment {} which is not in the manifest",
                    peer, item.fragment_key
                );
                continue;
            };

            let len = item.fragment_value.len();
            self.store
                .put_fragment(fragment.key, item.fragment_value)
                .map_err(EngineError::Store)?;
            state.mark_fragment_known(fragment.key);
            self.stats.record_peer_bytes(len as u64);
            received += 1;
            debug!("fragment {} saved ({} bytes) from {}", fragment.key, len, peer);

            let Some(segment) = self.manifest.segment(fragment.segment_key) else {
                continue;
            };
            if state.is_segment_known_from_fragments(segment) {
                if state.mark_segment_known(segment.key) {
                    debug!("all fragments of segment {} known", segment.key);
                }
                if let Some(file) = self.manifest.file(segment.file_key) {
                    self.complete_file_if_known(state, file).await?;
                }
            }
        }
        debug!("pull from peer {} finished with {} items", peer, received);
        Ok(())
    }

    async fn complete_file_if_known(
        &self,
        state: &mut CompletionState,
        file: &FileEntry,
    ) -> EngineResult<()> {
        if !state.is_file_pending(file.key) || !state.is_file_known_from_segments(file) {
            return Ok(());
        }
        info!("all segments of file {} known", file.key);
        write_file(
            &self.manifest,
            self.store.as_ref(),
            &self.options.local_base_path,
            file,
        )
        .await?;
        state.mark_file_done(file.key);
        Ok(())
    }

    /// Seed completion state from fragments the store already holds.
    fn resume(&self, state: &mut CompletionState) -> EngineResult<()> {
        let mut present = 0usize;
        for key in self.manifest.fragment_keys() {
            if self
                .store
                .get_fragment(key)
                .map_err(EngineError::Store)?
                .is_some()
            {
                state.mark_fragment_known(key);
                present += 1;
            }
        }
        for segment in self.manifest.segments() {
            if state.is_segment_known_from_fragments(segment) {
                state.mark_segment_known(segment.key);
            }
        }
        info!(
            "resumed from store: {} fragments present, {} segments complete",
            present,
            state.known_segment_count()
        );
        Ok(())
    }
}
