//! Session parameters.
//!
//! Each way of starting a session is its own variant. The engine resolves
//! whichever variant it is given into one [`SessionRecord`](crate::SessionRecord)
//! before anything else runs.

use serde::{Deserialize, Serialize};

use bridge_chains::BurnDetails;
use bridge_types::{Amount, Hash32};

/// Lock on `from`, mint on `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintParams {
    pub asset: String,
    /// Source chain, where the user deposits.
    pub from: String,
    /// Destination chain, where the asset is minted.
    pub to: String,
    /// Recipient on the destination chain.
    pub recipient: String,
    /// Opaque data passed to the destination contract.
    #[serde(default)]
    pub payload: Vec<u8>,
    /// Random when unset.
    #[serde(default)]
    pub nonce: Option<Hash32>,
    /// Amount the caller expects to deposit, for display only.
    #[serde(default)]
    pub target_amount: Option<Amount>,
}

/// Burn on `from`, release on the asset's native chain `to`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnParams {
    pub asset: String,
    pub from: String,
    pub to: String,
    pub source: BurnSource,
}

/// How the burn is identified.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BurnSource {
    /// The caller already knows the burn transaction.
    Transaction(BurnDetails),
    /// Look the burn up on the source chain by its nonce.
    Nonce { nonce: Hash32 },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum SessionParams {
    Mint(MintParams),
    Burn(BurnParams),
}

impl From<MintParams> for SessionParams {
    fn from(params: MintParams) -> Self {
        Self::Mint(params)
    }
}

impl From<BurnParams> for SessionParams {
    fn from(params: BurnParams) -> Self {
        Self::Burn(params)
    }
}
