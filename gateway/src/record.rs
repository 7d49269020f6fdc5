//! The persisted session record.
//!
//! A [`SessionRecord`] is everything needed to resume a session after a
//! restart. Callers store it wherever they like and hand it back to
//! [`GatewayEngine::resume`](crate::GatewayEngine::resume).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use bridge_chains::{Confirmations, DepositKey, InputChainTransaction, OutputReference};
use bridge_crypto::RecoverableSignature;
use bridge_transactions::{BurnOutput, MintOutput, Outpoint};
use bridge_types::encoding::serde_base64;
use bridge_types::{Amount, Direction, Hash32, Selector, Timestamp};

use crate::GatewayError;

/// Per-deposit progress of a mint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintState {
    Detected,
    Confirming,
    Confirmed,
    Signing,
    Signed,
    Submitting,
    Submitted,
    Errored,
}

/// Progress of a burn.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BurnState {
    Created,
    SourceSettling,
    SubmittedToNetwork,
    Released,
    Errored,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "direction", content = "state", rename_all = "lowercase")]
pub enum TransactionState {
    Mint(MintState),
    Burn(BurnState),
}

impl TransactionState {
    /// Position in the forward order. `Errored` has no position.
    fn rank(&self) -> Option<u8> {
        match self {
            Self::Mint(MintState::Errored) | Self::Burn(BurnState::Errored) => None,
            Self::Mint(state) => Some(*state as u8),
            Self::Burn(state) => Some(*state as u8),
        }
    }

    pub fn is_errored(&self) -> bool {
        self.rank().is_none()
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Mint(MintState::Submitted) | Self::Burn(BurnState::Released)
        )
    }

    /// Whether `self` is at or past `other`. Never true across directions.
    pub fn reached(&self, other: TransactionState) -> bool {
        let same_direction = matches!(
            (self, other),
            (Self::Mint(_), Self::Mint(_)) | (Self::Burn(_), Self::Burn(_))
        );
        match (self.rank(), other.rank()) {
            (Some(a), Some(b)) => same_direction && a >= b,
            _ => false,
        }
    }

    pub fn errored(direction: Direction) -> Self {
        match direction {
            Direction::Mint => Self::Mint(MintState::Errored),
            Direction::Burn => Self::Burn(BurnState::Errored),
        }
    }
}

impl fmt::Display for TransactionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mint(state) => write!(f, "mint:{state:?}"),
            Self::Burn(state) => write!(f, "burn:{state:?}"),
        }
    }
}

/// The last failure that stopped a transaction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub kind: String,
    pub message: String,
    #[serde(default)]
    pub raw_response: Option<String>,
    pub at: Timestamp,
}

impl ErrorRecord {
    pub fn from_error(error: &GatewayError, at: Timestamp) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
            raw_response: error.raw_response().map(str::to_string),
            at,
        }
    }
}

/// A verified mint signature from the network.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedOutput {
    pub amount: Amount,
    pub r: Hash32,
    pub s: Hash32,
    pub v: u8,
    pub sighash: Hash32,
    pub phash: Hash32,
    pub nhash: Hash32,
    #[serde(default)]
    pub outpoint: Option<Outpoint>,
}

impl From<&MintOutput> for SignedOutput {
    fn from(output: &MintOutput) -> Self {
        Self {
            amount: output.amount,
            r: Hash32::new(output.signature.r),
            s: Hash32::new(output.signature.s),
            v: output.signature.v,
            sighash: output.sighash,
            phash: output.phash,
            nhash: output.nhash,
            outpoint: output.outpoint.clone(),
        }
    }
}

impl SignedOutput {
    pub fn to_mint_output(&self) -> MintOutput {
        MintOutput {
            amount: self.amount,
            signature: RecoverableSignature {
                r: *self.r.as_bytes(),
                s: *self.s.as_bytes(),
                v: self.v,
            },
            sighash: self.sighash,
            phash: self.phash,
            nhash: self.nhash,
            outpoint: self.outpoint.clone(),
        }
    }
}

/// What the network reported for an executed burn.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseOutput {
    pub amount: Amount,
    #[serde(default)]
    pub release: Option<Outpoint>,
}

impl From<&BurnOutput> for ReleaseOutput {
    fn from(output: &BurnOutput) -> Self {
        Self {
            amount: output.amount,
            release: output.release.clone(),
        }
    }
}

/// One deposit (mint) or burn and everything learned about it so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub source: InputChainTransaction,
    pub state: TransactionState,
    #[serde(default)]
    pub confirmations: Confirmations,
    pub nhash: Hash32,
    /// Custody-network transaction hash, once built.
    #[serde(default)]
    pub custody_hash: Option<Hash32>,
    #[serde(default)]
    pub signed: Option<SignedOutput>,
    #[serde(default)]
    pub released: Option<ReleaseOutput>,
    #[serde(default)]
    pub destination: Option<OutputReference>,
    #[serde(default)]
    pub error: Option<ErrorRecord>,
    /// The state `Errored` interrupted; where an explicit retry resumes.
    #[serde(default)]
    pub interrupted: Option<TransactionState>,
}

impl TransactionRecord {
    pub fn new(source: InputChainTransaction, state: TransactionState, nhash: Hash32) -> Self {
        Self {
            source,
            state,
            confirmations: Confirmations::default(),
            nhash,
            custody_hash: None,
            signed: None,
            released: None,
            destination: None,
            error: None,
            interrupted: None,
        }
    }

    pub fn key(&self) -> DepositKey {
        self.source.key()
    }

    /// Move forward to `next`. Backward or sideways moves are ignored.
    pub fn advance(&mut self, next: TransactionState) -> bool {
        let forward = match (self.state.rank(), next.rank()) {
            (Some(current), Some(next_rank)) => {
                next_rank > current && next.reached(self.state)
            }
            _ => false,
        };
        if forward {
            self.state = next;
        }
        forward
    }

    /// Record a new confirmation count, never lowering `current`.
    pub fn observe_confirmations(&mut self, observed: Confirmations) {
        self.confirmations.current = self.confirmations.current.max(observed.current);
        self.confirmations.target = observed.target;
    }

    pub fn fail(&mut self, error: ErrorRecord, direction: Direction) {
        if !self.state.is_errored() {
            self.interrupted = Some(self.state);
        }
        self.state = TransactionState::errored(direction);
        self.error = Some(error);
    }

    /// Return from `Errored` to the interrupted state.
    pub fn reset(&mut self) -> bool {
        match (self.state.is_errored(), self.interrupted.take()) {
            (true, Some(previous)) => {
                self.state = previous;
                self.error = None;
                true
            }
            (_, previous) => {
                self.interrupted = previous;
                false
            }
        }
    }
}

/// A gateway session: the parameters it was created with and every
/// transaction seen so far.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    pub id: String,
    pub direction: Direction,
    pub asset: String,
    pub selector: Selector,
    pub from_chain: String,
    pub to_chain: String,
    pub nonce: Hash32,
    /// Recipient on the destination (mint) or release (burn) chain.
    pub to: String,
    #[serde(with = "serde_base64", default)]
    pub payload: Vec<u8>,
    pub phash: Hash32,
    pub shash: Hash32,
    pub ghash: Hash32,
    /// Shard key the gateway address was derived from. Empty for burns.
    #[serde(with = "serde_base64", default)]
    pub gpubkey: Vec<u8>,
    #[serde(default)]
    pub gateway_address: Option<String>,
    #[serde(default)]
    pub target_amount: Option<Amount>,
    pub created_at: Timestamp,
    pub expires_at: Timestamp,
    #[serde(default)]
    pub transactions: BTreeMap<DepositKey, TransactionRecord>,
}

impl SessionRecord {
    pub fn is_expired(&self, now: Timestamp) -> bool {
        now >= self.expires_at
    }

    pub fn to_json(&self) -> Result<String, GatewayError> {
        serde_json::to_string(self).map_err(|e| GatewayError::InvalidParams(e.to_string()))
    }

    pub fn from_json(json: &str) -> Result<Self, GatewayError> {
        serde_json::from_str(json).map_err(|e| GatewayError::InvalidParams(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> TransactionRecord {
        TransactionRecord::new(
            InputChainTransaction {
                chain: "Bitcoin".into(),
                txid: vec![1; 32],
                txindex: 0,
                amount: Amount::from_u128(10_000),
            },
            TransactionState::Mint(MintState::Detected),
            Hash32::new([2; 32]),
        )
    }

    #[test]
    fn states_only_move_forward() {
        let mut tx = record();
        assert!(tx.advance(TransactionState::Mint(MintState::Confirming)));
        assert!(tx.advance(TransactionState::Mint(MintState::Signed)));
        assert!(!tx.advance(TransactionState::Mint(MintState::Confirmed)));
        assert!(!tx.advance(TransactionState::Mint(MintState::Signed)));
        assert!(!tx.advance(TransactionState::Burn(BurnState::Released)));
        assert_eq!(tx.state, TransactionState::Mint(MintState::Signed));
    }

    #[test]
    fn errored_cannot_advance_until_reset() {
        let mut tx = record();
        tx.advance(TransactionState::Mint(MintState::Signing));
        let error = ErrorRecord::from_error(&GatewayError::Reverted("x".into()), Timestamp::EPOCH);
        tx.fail(error, Direction::Mint);
        assert!(tx.state.is_errored());
        assert!(!tx.advance(TransactionState::Mint(MintState::Signed)));
        assert!(tx.reset());
        assert_eq!(tx.state, TransactionState::Mint(MintState::Signing));
        assert!(tx.error.is_none());
        assert!(!tx.reset());
    }

    #[test]
    fn confirmations_never_decrease() {
        let mut tx = record();
        tx.observe_confirmations(Confirmations::new(3, 6));
        tx.observe_confirmations(Confirmations::new(2, 6));
        assert_eq!(tx.confirmations, Confirmations::new(3, 6));
        tx.observe_confirmations(Confirmations::new(6, 6));
        assert!(tx.confirmations.is_complete());
    }

    #[test]
    fn reached_compares_within_direction() {
        let signed = TransactionState::Mint(MintState::Signed);
        assert!(signed.reached(TransactionState::Mint(MintState::Confirmed)));
        assert!(!signed.reached(TransactionState::Mint(MintState::Submitted)));
        assert!(!signed.reached(TransactionState::Burn(BurnState::Created)));
        assert!(!TransactionState::Mint(MintState::Errored)
            .reached(TransactionState::Mint(MintState::Detected)));
    }

    #[test]
    fn state_serializes_with_direction() {
        let json = serde_json::to_value(TransactionState::Burn(BurnState::SourceSettling)).unwrap();
        assert_eq!(json, serde_json::json!({"direction": "burn", "state": "source_settling"}));
    }
}
