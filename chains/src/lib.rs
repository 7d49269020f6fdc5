//! Chain capability interfaces.
//!
//! The gateway engine never talks to a blockchain directly. Deposits and
//! burns are observed through a [`SourceChain`]; signed mints are broadcast
//! through a [`DestinationChain`]. Adapters are read-only sources and
//! write-only sinks: all session state stays in the engine.

pub mod chain;
pub mod error;
pub mod types;

pub use chain::{DestinationChain, SourceChain};
pub use error::ChainError;
pub use types::{
    BurnDetails, ChainProgress, Confirmations, DepositEvent, DepositKey, DestinationPayload,
    InputChainTransaction, OutputReference,
};
