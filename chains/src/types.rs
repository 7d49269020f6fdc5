//! Values exchanged between the engine and chain adapters.

use serde::{Deserialize, Serialize};
use std::fmt;

use bridge_types::encoding::{serde_base64, to_base64};
use bridge_types::{Amount, Hash32, Selector};

/// A transaction on the source chain that moves funds into the bridge:
/// a deposit to a gateway address, or a burn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputChainTransaction {
    pub chain: String,
    #[serde(with = "serde_base64")]
    pub txid: Vec<u8>,
    pub txindex: u32,
    pub amount: Amount,
}

impl InputChainTransaction {
    pub fn key(&self) -> DepositKey {
        DepositKey::new(&self.txid, self.txindex)
    }
}

/// Identity of a source transaction: `(txid, txindex)`.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DepositKey(String);

impl DepositKey {
    pub fn new(txid: &[u8], txindex: u32) -> Self {
        Self(format!("{}_{}", to_base64(txid), txindex))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DepositKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pushed by [`SourceChain::watch_deposits`](crate::SourceChain::watch_deposits).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DepositEvent {
    Detected(InputChainTransaction),
    /// A previously reported deposit disappeared (reorg, dropped from mempool).
    Removed(InputChainTransaction),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Confirmations {
    pub current: u64,
    pub target: u64,
}

impl Confirmations {
    pub fn new(current: u64, target: u64) -> Self {
        Self { current, target }
    }

    pub fn is_complete(&self) -> bool {
        self.current >= self.target
    }
}

/// A transaction the destination chain produced.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OutputReference {
    pub chain: String,
    /// Chain-native transaction id.
    pub txid: String,
    #[serde(default)]
    pub explorer_link: Option<String>,
}

impl fmt::Display for OutputReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chain, self.txid)
    }
}

/// Everything the destination needs besides the signed output.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DestinationPayload {
    pub selector: Selector,
    pub to: String,
    pub payload: Vec<u8>,
    pub nonce: Hash32,
}

/// Progress reported by a destination while submitting.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChainProgress {
    Broadcast(OutputReference),
    Confirmations(Confirmations),
}

/// A burn found on the source chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BurnDetails {
    pub transaction: InputChainTransaction,
    /// Release recipient on the asset's native chain.
    pub to: String,
    pub nonce: Hash32,
}
