// Peer exchange: pull protocol framing, client side of the pull RPC, and the member list.

pub mod client;
pub mod codec;
pub mod membership;
