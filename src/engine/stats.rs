// Session statistics: bytes by acquisition strategy, bytes served to peers, loop counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use parking_lot::Mutex;

struct StatsSample {
    at: Instant,
    acquired_bytes: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatsSnapshot {
    pub remote_bytes: u64,
    pub peer_bytes: u64,
    pub served_bytes: u64,
    pub iterations: u64,
    pub remote_fetches: u64,
    pub remote_failures: u64,
    pub peer_pulls: u64,
    pub peer_failures: u64,
    /// Acquisition rate (remote + peer) since the previous snapshot.
    pub download_bps: u64,
}

pub struct StatsCollector {
    remote_bytes: AtomicU64,
    peer_bytes: AtomicU64,
    served_bytes: AtomicU64,
    iterations: AtomicU64,
    remote_fetches: AtomicU64,
    remote_failures: AtomicU64,
    peer_pulls: AtomicU64,
    peer_failures: AtomicU64,
    last_sample: Mutex<StatsSample>,
}

impl StatsCollector {
    pub fn new() -> Self {
        Self {
            remote_bytes: AtomicU64::new(0),
            peer_bytes: AtomicU64::new(0),
            served_bytes: AtomicU64::new(0),
            iterations: AtomicU64::new(0),
            remote_fetches: AtomicU64::new(0),
            remote_failures: AtomicU64::new(0),
            peer_pulls: AtomicU64::new(0),
            peer_failures: AtomicU64::new(0),
            last_sample: Mutex::new(StatsSample {
                at: Instant::now(),
                acquired_bytes: 0,
            }),
        }
    }

    pub fn record_iteration(&self) {
        self.iterations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_remote(&self, bytes: u64) {
        self.remote_fetches.fetch_add(1, Ordering::Relaxed);
        self.remote_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_remote_failure(&self) {
        self.remote_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_pull(&self) {
        self.peer_pulls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_peer_bytes(&self, bytes: u64) {
        self.peer_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn record_peer_failure(&self) {
        self.peer_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_served(&self, bytes: u64) {
        self.served_bytes.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let now = Instant::now();
        let remote_bytes = self.remote_bytes.load(Ordering::Relaxed);
        let peer_bytes = self.peer_bytes.load(Ordering::Relaxed);
        let acquired = remote_bytes + peer_bytes;

        let download_bps = {
            let mut sample = self.last_sample.lock();
            let elapsed = now.duration_since(sample.at).as_secs_f64();
            let bps = if elapsed > 0.1 {
                (acquired.saturating_sub(sample.acquired_bytes) as f64 / elapsed) as u64
            } else {
                0
            };
            sample.at = now;
            sample.acquired_bytes = acquired;
            bps
        };

        StatsSnapshot {
            remote_bytes,
            peer_bytes,
            served_bytes: self.served_bytes.load(Ordering::Relaxed),
            iterations: self.iterations.load(Ordering::Relaxed),
            remote_fetches: self.remote_fetches.load(Ordering::Relaxed),
            remote_failures: self.remote_failures.load(Ordering::Relaxed),
            peer_pulls: self.peer_pulls.load(Ordering::Relaxed),
            peer_failures: self.peer_failures.load(Ordering::Relaxed),
            download_bps,
        }
    }
}

impl Default for StatsCollector {
    fn default() -> Self {
        Self::new()
    }
}
