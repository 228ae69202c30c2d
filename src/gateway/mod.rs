//! Gateway module
//!
//! A ready-made consumer of the selector: every protocol sharing the port
//! is forwarded to its own backend address. This is what the
//! `port-selector` binary runs.

mod forwarder;
mod service;

pub use forwarder::proxy_data;
pub use service::{serve_route, ForwardOptions, Gateway};
