//! Configuration module
//!
//! This module handles the selector configuration: its shape and defaults,
//! loading from files and environment variables, and validation.

pub mod defaults;
mod loader;
mod validator;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::common::Network;
use crate::protocol::MatchMode;

pub use defaults::ENV_PREFIX;
pub use loader::ConfigOverrides;

/// One protocol key and the backend that speaks it
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouteConfig {
    /// Prefix identifying the protocol
    pub key: String,

    /// Backend address (host:port) connections for this key are forwarded to
    pub target: String,
}

/// Selector configuration
///
/// Contains everything needed to bind a selector and, for the gateway
/// binary, where each protocol should be forwarded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SelectorConfig {
    // --- Listener settings ---

    /// Network kind (tcp, tcp4, tcp6)
    pub network: Network,

    /// Host to bind; all interfaces when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Port to bind
    pub port: u16,

    /// Listen backlog of the real socket
    pub listen_backlog: u32,

    // --- Routing settings ---

    /// Number of prefix bytes inspected per connection
    pub header_size: usize,

    /// How prefixes are compared with keys
    pub match_mode: MatchMode,

    /// Prefix read timeout in milliseconds, 0 to wait forever
    pub peek_timeout_ms: u64,

    /// Queued connections per virtual listener, 0 for unbounded
    pub queue_capacity: usize,

    /// Protocol keys and their backends, in matching order
    pub routes: Vec<RouteConfig>,

    /// Backend for connections that match no key; unmatched connections are
    /// closed when absent
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_target: Option<String>,

    // --- General settings ---

    /// Log level (error, warn, info, debug, trace)
    pub log_level: String,

    /// Buffer size for forwarding (in bytes)
    pub buffer_size: usize,

    /// Backend connection timeout in seconds
    pub connection_timeout: u64,
}

impl Default for SelectorConfig {
    fn default() -> Self {
        Self {
            network: defaults::network(),
            host: None,
            port: defaults::port(),
            listen_backlog: defaults::listen_backlog(),
            header_size: defaults::header_size(),
            match_mode: defaults::match_mode(),
            peek_timeout_ms: defaults::peek_timeout_ms(),
            queue_capacity: defaults::queue_capacity(),
            routes: Vec::new(),
            default_target: None,
            log_level: defaults::log_level(),
            buffer_size: defaults::buffer_size(),
            connection_timeout: defaults::connection_timeout(),
        }
    }
}

impl SelectorConfig {
    /// Prefix read timeout, `None` when disabled
    pub fn peek_timeout(&self) -> Option<Duration> {
        (self.peek_timeout_ms > 0).then(|| Duration::from_millis(self.peek_timeout_ms))
    }

    /// Per-listener queue capacity, `None` when unbounded
    pub fn queue_capacity(&self) -> Option<usize> {
        (self.queue_capacity > 0).then_some(self.queue_capacity)
    }

    /// Backend connection timeout
    pub fn connection_timeout(&self) -> Duration {
        Duration::from_secs(self.connection_timeout)
    }

    /// Human readable listen address for logs
    pub fn listen_display(&self) -> String {
        match self.host.as_deref() {
            Some(host) if host.contains(':') => format!("{}://[{}]:{}", self.network, host, self.port),
            Some(host) if !host.is_empty() => format!("{}://{}:{}", self.network, host, self.port),
            _ => format!("{}://*:{}", self.network, self.port),
        }
    }
}
