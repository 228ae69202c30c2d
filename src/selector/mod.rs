//! Selector module
//!
//! This module lets several independent protocols share one TCP port. The
//! `Selector` accepts connections on the real socket, reads a fixed-size
//! prefix from each, and hands the connection, prefix replayed, to the
//! `VirtualListener` registered for that prefix.
//!
//! ```no_run
//! use port_selector::protocol::MatchMode;
//! use port_selector::selector::Selector;
//!
//! # async fn run() -> port_selector::Result<()> {
//! let selector = Selector::bind("tcp", None, 7000, 4, MatchMode::Equal).await?;
//! let rpc = selector.register_listener("PRPC")?;
//! let fallback = selector.register_default_listener()?;
//!
//! tokio::spawn({
//!     let selector = selector.clone();
//!     async move { selector.serve().await }
//! });
//!
//! let (conn, peer) = rpc.accept().await?;
//! # let _ = (conn, peer, fallback);
//! # Ok(())
//! # }
//! ```

mod listener;
mod peeked;
pub(crate) mod registry;
mod server;

pub use listener::{Connection, StreamListener, VirtualListener};
pub use peeked::PeekedStream;
pub use server::{Selector, SelectorOptions, MAX_HEADER_SIZE};
