//! Nullable chains: source and destination adapters over explicit state.
//!
//! A [`FakeChainState`] is the whole "blockchain": tests push deposits,
//! burns and failures into it and read back what was minted. Adapters hold
//! an `Arc` to it and never keep state of their own.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use bridge_chains::{
    BurnDetails, ChainError, ChainProgress, Confirmations, DepositEvent, DepositKey,
    DestinationChain, DestinationPayload, InputChainTransaction, OutputReference, SourceChain,
};
use bridge_crypto::keccak256_multi;
use bridge_transactions::MintOutput;
use bridge_types::Hash32;
use bridge_utils::CancelToken;

use crate::lock;

#[derive(Default)]
struct Ledger {
    /// Deposits visible per address.
    deposits: BTreeMap<String, Vec<InputChainTransaction>>,
    confirmations: HashMap<DepositKey, u64>,
    /// Added to a transaction's confirmations after every poll.
    confirmation_step: u64,
    transient_failures: u32,
    fatal: Option<String>,
    burns: HashMap<Hash32, BurnDetails>,
    mints: Vec<Mint>,
    submit_calls: usize,
    confirmation_polls: usize,
}

struct Mint {
    nhash: Hash32,
    reference: OutputReference,
    confirmations: u64,
}

impl Ledger {
    fn take_failure(&mut self) -> Result<(), ChainError> {
        if let Some(reason) = &self.fatal {
            return Err(ChainError::Fatal(reason.clone()));
        }
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(ChainError::Transient("injected failure".into()));
        }
        Ok(())
    }
}

/// Shared, explicitly controlled chain state.
#[derive(Default)]
pub struct FakeChainState {
    ledger: Mutex<Ledger>,
}

impl FakeChainState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_deposit(&self, address: &str, deposit: InputChainTransaction) {
        lock(&self.ledger)
            .deposits
            .entry(address.to_string())
            .or_default()
            .push(deposit);
    }

    /// Drop a deposit, as a reorg would.
    pub fn remove_deposit(&self, address: &str, key: &DepositKey) {
        if let Some(deposits) = lock(&self.ledger).deposits.get_mut(address) {
            deposits.retain(|d| d.key() != *key);
        }
    }

    pub fn set_confirmations(&self, key: &DepositKey, confirmations: u64) {
        lock(&self.ledger)
            .confirmations
            .insert(key.clone(), confirmations);
    }

    /// Confirmations gained per poll. Zero keeps counts where they are.
    pub fn set_confirmation_step(&self, step: u64) {
        lock(&self.ledger).confirmation_step = step;
    }

    /// Fail the next `count` chain calls with a transient error.
    pub fn fail_transiently(&self, count: u32) {
        lock(&self.ledger).transient_failures = count;
    }

    /// Fail every chain call with a fatal error until cleared.
    pub fn fail_fatally(&self, reason: Option<&str>) {
        lock(&self.ledger).fatal = reason.map(str::to_string);
    }

    pub fn add_burn(&self, burn: BurnDetails) {
        lock(&self.ledger).burns.insert(burn.nonce, burn);
    }

    /// Every mint the destination accepted, in order.
    pub fn mints(&self) -> Vec<OutputReference> {
        lock(&self.ledger)
            .mints
            .iter()
            .map(|m| m.reference.clone())
            .collect()
    }

    /// Calls to `submit`, including rejected duplicates and failures.
    pub fn submit_calls(&self) -> usize {
        lock(&self.ledger).submit_calls
    }

    pub fn confirmation_polls(&self) -> usize {
        lock(&self.ledger).confirmation_polls
    }
}

fn address_is_valid(prefix: &str, address: &str) -> bool {
    address.len() > prefix.len() && address.starts_with(prefix)
}

/// A source chain over a [`FakeChainState`].
pub struct NullSourceChain {
    name: String,
    native: Vec<String>,
    supported: Vec<String>,
    address_prefix: String,
    target: u64,
    watch_interval: Duration,
    state: Arc<FakeChainState>,
}

impl NullSourceChain {
    /// A chain that supports nothing, wants 6 confirmations and accepts
    /// any non-empty address.
    pub fn new(name: &str, state: Arc<FakeChainState>) -> Self {
        Self {
            name: name.to_string(),
            native: Vec::new(),
            supported: Vec::new(),
            address_prefix: String::new(),
            target: 6,
            watch_interval: Duration::from_millis(5),
            state,
        }
    }

    /// Asset native to this chain. Implies supported.
    pub fn with_native(mut self, asset: &str) -> Self {
        self.native.push(asset.to_string());
        self.supported.push(asset.to_string());
        self
    }

    pub fn with_asset(mut self, asset: &str) -> Self {
        self.supported.push(asset.to_string());
        self
    }

    pub fn with_target(mut self, confirmations: u64) -> Self {
        self.target = confirmations;
        self
    }

    pub fn with_address_prefix(mut self, prefix: &str) -> Self {
        self.address_prefix = prefix.to_string();
        self
    }
}

#[async_trait]
impl SourceChain for NullSourceChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn asset_is_native(&self, asset: &str) -> bool {
        self.native.iter().any(|a| a == asset)
    }

    fn asset_is_supported(&self, asset: &str) -> bool {
        self.supported.iter().any(|a| a == asset)
    }

    fn validate_address(&self, address: &str) -> bool {
        address_is_valid(&self.address_prefix, address)
    }

    async fn derive_gateway_address(
        &self,
        _asset: &str,
        shard_public_key: &[u8],
        ghash: &Hash32,
    ) -> Result<String, ChainError> {
        lock(&self.state.ledger).take_failure()?;
        let digest = keccak256_multi(&[shard_public_key, ghash.as_bytes()]);
        Ok(format!("{}{}", self.address_prefix, hex::encode(&digest[..20])))
    }

    async fn watch_deposits(
        &self,
        _asset: &str,
        address: &str,
        sink: mpsc::Sender<DepositEvent>,
        cancel: CancelToken,
    ) -> Result<(), ChainError> {
        let mut reported: Vec<InputChainTransaction> = Vec::new();
        loop {
            let visible = lock(&self.state.ledger)
                .deposits
                .get(address)
                .cloned()
                .unwrap_or_default();
            let mut events = Vec::new();
            for deposit in &visible {
                if !reported.iter().any(|r| r.key() == deposit.key()) {
                    events.push(DepositEvent::Detected(deposit.clone()));
                }
            }
            for gone in reported.iter().filter(|r| !visible.iter().any(|d| d.key() == r.key())) {
                events.push(DepositEvent::Removed(gone.clone()));
            }
            reported = visible;
            for event in events {
                if sink.send(event).await.is_err() {
                    return Ok(());
                }
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = tokio::time::sleep(self.watch_interval) => {}
            }
        }
    }

    async fn confirmations(&self, tx: &InputChainTransaction) -> Result<Confirmations, ChainError> {
        let mut ledger = lock(&self.state.ledger);
        ledger.confirmation_polls += 1;
        ledger.take_failure()?;
        let step = ledger.confirmation_step;
        let current = ledger.confirmations.entry(tx.key()).or_insert(0);
        let observed = *current;
        *current += step;
        Ok(Confirmations::new(observed, self.target))
    }

    async fn find_burn(
        &self,
        _asset: &str,
        nonce: &Hash32,
    ) -> Result<Option<BurnDetails>, ChainError> {
        let mut ledger = lock(&self.state.ledger);
        ledger.take_failure()?;
        Ok(ledger.burns.get(nonce).cloned())
    }
}

/// A destination chain over a [`FakeChainState`]. Rejects a second mint
/// of the same nHash with [`ChainError::AlreadySubmitted`].
pub struct NullDestinationChain {
    name: String,
    supported: Vec<String>,
    address_prefix: String,
    target: u64,
    state: Arc<FakeChainState>,
}

impl NullDestinationChain {
    pub fn new(name: &str, state: Arc<FakeChainState>) -> Self {
        Self {
            name: name.to_string(),
            supported: Vec::new(),
            address_prefix: "0x".to_string(),
            target: 12,
            state,
        }
    }

    pub fn with_asset(mut self, asset: &str) -> Self {
        self.supported.push(asset.to_string());
        self
    }

    pub fn with_target(mut self, confirmations: u64) -> Self {
        self.target = confirmations;
        self
    }

    pub fn with_address_prefix(mut self, prefix: &str) -> Self {
        self.address_prefix = prefix.to_string();
        self
    }
}

#[async_trait]
impl DestinationChain for NullDestinationChain {
    fn name(&self) -> &str {
        &self.name
    }

    fn asset_is_supported(&self, asset: &str) -> bool {
        self.supported.iter().any(|a| a == asset)
    }

    fn validate_address(&self, address: &str) -> bool {
        address_is_valid(&self.address_prefix, address)
    }

    async fn submit(
        &self,
        _asset: &str,
        _payload: &DestinationPayload,
        output: &MintOutput,
        progress: mpsc::UnboundedSender<ChainProgress>,
    ) -> Result<OutputReference, ChainError> {
        let reference = {
            let mut ledger = lock(&self.state.ledger);
            ledger.submit_calls += 1;
            ledger.take_failure()?;
            if let Some(existing) = ledger.mints.iter().find(|m| m.nhash == output.nhash) {
                return Err(ChainError::AlreadySubmitted(existing.reference.clone()));
            }
            let reference = OutputReference {
                chain: self.name.clone(),
                txid: format!("0x{}", hex::encode(output.nhash.as_bytes())),
                explorer_link: None,
            };
            ledger.mints.push(Mint {
                nhash: output.nhash,
                reference: reference.clone(),
                confirmations: 0,
            });
            reference
        };
        let _ = progress.send(ChainProgress::Broadcast(reference.clone()));
        let _ = progress.send(ChainProgress::Confirmations(Confirmations::new(0, self.target)));
        Ok(reference)
    }

    /// Each query sees one more confirmation.
    async fn confirmations(&self, reference: &OutputReference) -> Result<Confirmations, ChainError> {
        let mut ledger = lock(&self.state.ledger);
        ledger.take_failure()?;
        let mint = ledger
            .mints
            .iter_mut()
            .find(|m| m.reference == *reference)
            .ok_or_else(|| ChainError::Fatal(format!("unknown transaction {reference}")))?;
        mint.confirmations += 1;
        Ok(Confirmations::new(mint.confirmations, self.target))
    }
}
