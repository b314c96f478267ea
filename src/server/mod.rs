// Inbound peer traffic: the pull service and its HTTP listener.

pub mod handler;
