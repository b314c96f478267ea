//! Multi-source file distribution.
//!
//! A [`engine::downloader::Downloader`] session materializes the files of a
//! [`manifest::Manifest`] by repeatedly choosing between a ranged fetch from
//! the origin and a fragment pull from a peer, while a
//! [`server::handler::PullServer`] answers other peers' pulls from the shared
//! fragment store.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod manifest;
pub mod peer;
pub mod sampling;
pub mod server;
pub mod source;
pub mod store;

pub use config::DownloaderOptions;
pub use engine::downloader::{Downloader, SessionOutcome};
pub use error::{EngineError, EngineResult};
pub use manifest::{Manifest, ManifestBuilder};
