// Engine orchestration: session loop, completion tracking, file assembly.

pub mod assembly;
pub mod downloader;
pub(crate) mod state;
pub mod stats;
