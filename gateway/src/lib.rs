//! Gateway session engine.
//!
//! A [`GatewayEngine`] opens [`GatewaySession`]s. A mint session derives a
//! gateway address, watches it for deposits and drives each deposit
//! through confirmation, signing by the custody network and submission to
//! the destination chain. A burn session settles one burn and waits for
//! the network to release the underlying asset.
//!
//! Sessions serialise to a [`SessionRecord`] and can be resumed from it.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod params;
pub mod record;
pub mod session;

pub use config::GatewayConfig;
pub use engine::GatewayEngine;
pub use error::GatewayError;
pub use events::{Operation, SessionEvent};
pub use params::{BurnParams, BurnSource, MintParams, SessionParams};
pub use record::{
    BurnState, ErrorRecord, MintState, ReleaseOutput, SessionRecord, SignedOutput,
    TransactionRecord, TransactionState,
};
pub use session::GatewaySession;
