use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// HTTP route of the peer pull service.
pub const PULL_ROUTE: &str = "/pull";

/// Largest fragment value accepted in a single pull frame (64 MB).
pub const MAX_PULL_FRAME_BYTES: usize = 64 * 1024 * 1024;

/// Default minimum spacing between iteration starts.
pub const DEFAULT_LOOP_INTERVAL_MS: u64 = 1000;

/// Per-session download settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloaderOptions {
    /// Directory that completed files are written under.
    pub local_base_path: PathBuf,
    /// Probability that an iteration pulls from a peer instead of the origin.
    /// A draw `r <= bias` selects the peer strategy.
    pub remote_vs_peer_bias: f64,
    /// Minimum wall-clock spacing between iteration starts, in milliseconds.
    pub loop_interval_ms: u64,
    /// Peer batch size as a multiple of fragments per segment.
    pub peer_fragment_factor: f64,
    /// Seed completion state from fragments already present in the store.
    pub resume_from_store: bool,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            local_base_path: PathBuf::from("."),
            remote_vs_peer_bias: 0.5,
            loop_interval_ms: DEFAULT_LOOP_INTERVAL_MS,
            peer_fragment_factor: 3.0,
            resume_from_store: false,
        }
    }
}

impl DownloaderOptions {
    pub fn validate(&self) -> EngineResult<()> {
        if !(0.0..=1.0).contains(&self.remote_vs_peer_bias) {
            return Err(EngineError::InvalidOptions(format!(
                "remote_vs_peer_bias {} must be within [0, 1]",
                self.remote_vs_peer_bias
            )));
        }
        if !self.peer_fragment_factor.is_finite() || self.peer_fragment_factor < 0.0 {
            return Err(EngineError::InvalidOptions(format!(
                "peer_fragment_factor {} must be a finite non-negative number",
                self.peer_fragment_factor
            )));
        }
        Ok(())
    }
}
