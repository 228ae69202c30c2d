//! Default configuration values
//!
//! Single source of truth for defaults, shared by serde, the selector options
//! and the command line.

use crate::common::Network;
use crate::protocol::MatchMode;

/// Environment variable prefix for all configuration options
///
/// Variables look like `PORT_SELECTOR_HEADER_SIZE=4`.
pub const ENV_PREFIX: &str = "PORT_SELECTOR";

/// Separator between the prefix and the option name
pub const ENV_PREFIX_SEPARATOR: &str = "_";

/// Separator for nested options
pub const ENV_SEPARATOR: &str = "__";

/// Default configuration file name
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Default log level as string
pub const LOG_LEVEL_STR: &str = "info";

/// Default network
pub fn network() -> Network {
    Network::Tcp
}

/// Default port
pub fn port() -> u16 {
    7000
}

/// Default number of prefix bytes inspected per connection
pub fn header_size() -> usize {
    4
}

/// Default match mode
pub fn match_mode() -> MatchMode {
    MatchMode::Equal
}

/// Default prefix read timeout in milliseconds
pub fn peek_timeout_ms() -> u64 {
    10_000
}

/// Default per-listener queue capacity
pub fn queue_capacity() -> usize {
    1024
}

/// Default listen backlog
pub fn listen_backlog() -> u32 {
    1024
}

/// Default log level
pub fn log_level() -> String {
    LOG_LEVEL_STR.to_string()
}

/// Default buffer size (8KB)
pub fn buffer_size() -> usize {
    8192
}

/// Default backend connection timeout in seconds
pub fn connection_timeout() -> u64 {
    30
}
