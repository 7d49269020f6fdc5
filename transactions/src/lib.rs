//! Custody-network transactions.
//!
//! - **request**: builds mint and burn transactions from domain parameters,
//!   deriving pHash, nHash and gHash and the content hash.
//! - **response**: turns a queried transaction back into a mint or burn
//!   output, searching `out`, then `autogen`, then `in` for every field.
//! - **gateway**: the `ren_submitGateway` registration payload.
//! - **schema**: the Pack types of every payload above.

pub mod error;
pub mod gateway;
pub mod request;
pub mod response;
pub mod schema;

pub use error::AssemblerError;
pub use gateway::SubmitGatewayRequest;
pub use request::{
    build_burn_request, build_mint_request, hash_transaction, CrossChainInput, CrossChainParams,
    GatewayTransactionRequest,
};
pub use response::{
    unmarshal_burn_output, unmarshal_mint_output, BurnOutput, GatewayTransactionResponse,
    MintOutput, Outpoint, Unmarshalled,
};
pub use schema::TX_VERSION;
