// Origin access: ranged fetches of segment bytes from the remote URI.

pub mod http_source;
pub mod traits;
