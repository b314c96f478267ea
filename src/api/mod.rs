// Process-level entry points: tracing setup and node wiring.

pub mod logging;
pub mod node;
