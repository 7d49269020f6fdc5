use async_trait::async_trait;
use tokio::sync::mpsc;

use bridge_transactions::MintOutput;
use bridge_types::Hash32;
use bridge_utils::CancelToken;

use crate::error::ChainError;
use crate::types::{
    BurnDetails, ChainProgress, Confirmations, DepositEvent, DestinationPayload,
    InputChainTransaction, OutputReference,
};

/// A chain funds leave from: deposits to a gateway address, or burns.
#[async_trait]
pub trait SourceChain: Send + Sync {
    fn name(&self) -> &str;

    /// Whether `asset` originates on this chain.
    fn asset_is_native(&self, asset: &str) -> bool;

    fn asset_is_supported(&self, asset: &str) -> bool;

    fn validate_address(&self, address: &str) -> bool;

    /// Deposit address for a gateway, derived from the shard key and gHash.
    async fn derive_gateway_address(
        &self,
        asset: &str,
        shard_public_key: &[u8],
        ghash: &Hash32,
    ) -> Result<String, ChainError>;

    /// Report deposits to `address` into `sink` until `cancel` fires or the
    /// sink is closed. Duplicate reports are allowed.
    async fn watch_deposits(
        &self,
        asset: &str,
        address: &str,
        sink: mpsc::Sender<DepositEvent>,
        cancel: CancelToken,
    ) -> Result<(), ChainError>;

    async fn confirmations(&self, tx: &InputChainTransaction) -> Result<Confirmations, ChainError>;

    /// Locate a burn by its nonce. Chains without burn lookup return `None`.
    async fn find_burn(
        &self,
        _asset: &str,
        _nonce: &Hash32,
    ) -> Result<Option<BurnDetails>, ChainError> {
        Ok(None)
    }
}

/// A chain signed mints are submitted to.
#[async_trait]
pub trait DestinationChain: Send + Sync {
    fn name(&self) -> &str;

    fn asset_is_supported(&self, asset: &str) -> bool;

    fn validate_address(&self, address: &str) -> bool;

    /// Broadcast the mint. Returns [`ChainError::AlreadySubmitted`] when the
    /// chain already holds it.
    async fn submit(
        &self,
        asset: &str,
        payload: &DestinationPayload,
        output: &MintOutput,
        progress: mpsc::UnboundedSender<ChainProgress>,
    ) -> Result<OutputReference, ChainError>;

    async fn confirmations(&self, reference: &OutputReference) -> Result<Confirmations, ChainError>;
}
