//! Protocol matching module
//!
//! This module decides which registered protocol a connection speaks by
//! comparing the first bytes it sent with the registered keys.
//!
//! The module uses Rust's trait system to keep the comparison pluggable:
//! the selector only ever talks to a `MatchRule`.

mod matcher;

pub use matcher::{MatchMode, MatchRule};
