//! JSON-RPC client for the custody network.
//!
//! - **provider**: multi-node fan-out with per-node bounded retry and a
//!   per-attempt timeout.
//! - **methods**: `ren_submitTx`, `ren_queryTx`, `ren_queryTxs`,
//!   `ren_queryConfig`, `ren_queryBlockState`, `ren_queryBlock`,
//!   `ren_submitGateway`, plus cached shard selection.
//! - **responses**: validation and typed views of method results.
//! - **network**: the [`CustodyNetwork`] trait the gateway engine consumes.

pub mod config;
pub mod error;
pub mod jsonrpc;
pub mod methods;
pub mod network;
pub mod provider;
pub mod responses;
pub mod shard;
pub mod transport;

pub use config::RpcConfig;
pub use error::{RpcError, TransportError};
pub use methods::QueryTxsFilter;
pub use network::CustodyNetwork;
pub use provider::RpcProvider;
pub use responses::{AssetState, ChainFee, NetworkConfig, TxSummary};
pub use shard::{Shard, ShardCache};
pub use transport::{HttpReply, HttpTransport, Transport};
