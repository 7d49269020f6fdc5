//! Fundamental types for the cross-chain gateway client.
//!
//! This crate defines the value types shared across every other crate in the
//! workspace: 32-byte hashes, 256-bit amounts, selectors, timestamps, network
//! identifiers and custody-network transaction status.

pub mod amount;
pub mod encoding;
pub mod error;
pub mod hash;
pub mod network;
pub mod selector;
pub mod status;
pub mod time;

pub use amount::Amount;
pub use error::TypesError;
pub use hash::Hash32;
pub use network::NetworkId;
pub use selector::{Direction, Route, Selector};
pub use status::TxStatus;
pub use time::{Clock, SystemClock, Timestamp};

/// Re-exported so downstream crates agree on a single 256-bit integer type.
pub use alloy_primitives::U256;
