//! Port Selector: several protocols on one TCP port
//!
//! This library accepts connections on a single listening socket, reads a
//! fixed number of bytes from each one, and hands the connection to the
//! virtual listener registered for that prefix. The bytes consumed for
//! routing are replayed, so every protocol server reads its stream from the
//! very first byte.
//!
//! # Main Features
//!
//! - Virtual listeners with the same accept/close shape as a `TcpListener`
//! - Pluggable prefix comparison through the `MatchRule` trait
//! - Optional catch-all listener for unrecognized protocols
//! - A ready-made gateway that forwards each protocol to its own backend
//!
//! # Example
//!
//! ```no_run
//! use port_selector::{MatchMode, Result, Selector};
//! use tokio::io::AsyncWriteExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let selector = Selector::bind("tcp", Some("127.0.0.1"), 7000, 4, MatchMode::Equal).await?;
//!     let ping = selector.register_listener("PING")?;
//!
//!     tokio::spawn(async move {
//!         while let Ok((mut conn, _peer)) = ping.accept().await {
//!             // The prefix is replayed: reads start with "PING".
//!             let _ = conn.write_all(b"PONG").await;
//!         }
//!     });
//!
//!     selector.serve().await
//! }
//! ```

pub mod common;
pub mod config;
pub mod gateway;
pub mod protocol;
pub mod selector;

// Re-export commonly used structures and functions for convenience
pub use common::{Result, SelectorError};
pub use protocol::{MatchMode, MatchRule};
pub use selector::{
    Connection, PeekedStream, Selector, SelectorOptions, StreamListener, VirtualListener, MAX_HEADER_SIZE,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
