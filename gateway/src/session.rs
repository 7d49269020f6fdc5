//! A running gateway session.
//!
//! Every transaction advances through its state machine under its own step
//! lock: concurrent callers driving the same transaction queue up, and the
//! later caller finds the earlier one's result in the record instead of
//! repeating the work. Records only move forward; failures that outlive
//! the step's retries park the transaction in `Errored` until
//! [`GatewaySession::retry_transaction`] is called.

use std::collections::HashMap;
use std::sync::{Arc, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;

use bridge_chains::{
    ChainError, Confirmations, DepositEvent, DepositKey, DestinationChain, DestinationPayload,
    InputChainTransaction, OutputReference, SourceChain,
};
use bridge_crypto::{generate_nhash, generate_shash, generate_sighash, verify_signer, CryptoError};
use bridge_rpc::CustodyNetwork;
use bridge_transactions::{
    build_burn_request, build_mint_request, unmarshal_burn_output, unmarshal_mint_output,
    AssemblerError, CrossChainParams, GatewayTransactionRequest, GatewayTransactionResponse,
    MintOutput, Unmarshalled,
};
use bridge_types::{Clock, Direction, Hash32, Selector, TxStatus};
use bridge_utils::{retry_cancellable, CancelToken};

use crate::config::GatewayConfig;
use crate::events::{Operation, SessionEvent};
use crate::record::{
    BurnState, ErrorRecord, MintState, ReleaseOutput, SessionRecord, SignedOutput,
    TransactionRecord, TransactionState,
};
use crate::GatewayError;

/// Collaborators a session runs against.
pub(crate) struct SessionContext {
    pub network: Arc<dyn CustodyNetwork>,
    /// Deposit chain for mints, burn chain for burns.
    pub source: Arc<dyn SourceChain>,
    /// Mint chain. Unset for burns.
    pub destination: Option<Arc<dyn DestinationChain>>,
    pub config: GatewayConfig,
    pub clock: Arc<dyn Clock>,
}

/// Session fields fixed at creation.
struct SessionTerms {
    id: String,
    direction: Direction,
    asset: String,
    selector: Selector,
    nonce: Hash32,
    to: String,
    payload: Vec<u8>,
    gpubkey: Vec<u8>,
    gateway_address: Option<String>,
}

struct SessionInner {
    ctx: SessionContext,
    terms: SessionTerms,
    record: RwLock<SessionRecord>,
    step_locks: Mutex<HashMap<DepositKey, Arc<Mutex<()>>>>,
    /// Token shared by the calls driving each transaction. Taken without
    /// yielding, so a call is cancellable from the moment it starts.
    tx_tokens: std::sync::Mutex<HashMap<DepositKey, CancelToken>>,
    events: broadcast::Sender<SessionEvent>,
    cancel: CancelToken,
}

/// Handle to a session. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct GatewaySession {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for GatewaySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewaySession")
            .field("id", &self.inner.terms.id)
            .finish_non_exhaustive()
    }
}

impl GatewaySession {
    pub(crate) fn new(ctx: SessionContext, record: SessionRecord) -> Self {
        let terms = SessionTerms {
            id: record.id.clone(),
            direction: record.direction,
            asset: record.asset.clone(),
            selector: record.selector.clone(),
            nonce: record.nonce,
            to: record.to.clone(),
            payload: record.payload.clone(),
            gpubkey: record.gpubkey.clone(),
            gateway_address: record.gateway_address.clone(),
        };
        let (events, _) = broadcast::channel(ctx.config.event_capacity.max(1));
        Self {
            inner: Arc::new(SessionInner {
                ctx,
                terms,
                record: RwLock::new(record),
                step_locks: Mutex::new(HashMap::new()),
                tx_tokens: std::sync::Mutex::new(HashMap::new()),
                events,
                cancel: CancelToken::new(),
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.inner.terms.id
    }

    pub fn direction(&self) -> Direction {
        self.inner.terms.direction
    }

    pub fn selector(&self) -> &Selector {
        &self.inner.terms.selector
    }

    /// Where the user deposits. Only mint sessions have one.
    pub fn gateway_address(&self) -> Option<&str> {
        self.inner.terms.gateway_address.as_deref()
    }

    /// The serialisable record, for persisting and later [`resume`](crate::GatewayEngine::resume).
    pub async fn snapshot(&self) -> SessionRecord {
        self.inner.record.read().await.clone()
    }

    pub async fn transactions(&self) -> Vec<TransactionRecord> {
        self.inner
            .record
            .read()
            .await
            .transactions
            .values()
            .cloned()
            .collect()
    }

    pub async fn transaction(&self, key: &DepositKey) -> Option<TransactionRecord> {
        self.inner.record.read().await.transactions.get(key).cloned()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Stop every in-flight step of this session.
    pub fn cancel(&self) {
        self.inner.cancel.cancel();
    }

    /// Stop every call driving one transaction, including calls queued
    /// behind the running step. Siblings keep running.
    pub fn cancel_transaction(&self, key: &DepositKey) {
        if let Some(token) = self.tokens().get(key) {
            token.cancel();
        }
    }

    // ── Deposits ───────────────────────────────────────────────────────

    /// Record a deposit. Returns `false` if `(txid, txindex)` is already known.
    pub async fn add_deposit(&self, deposit: InputChainTransaction) -> Result<bool, GatewayError> {
        if self.direction() != Direction::Mint {
            return Err(GatewayError::InvalidParams(
                "burn sessions do not accept deposits".into(),
            ));
        }
        let key = deposit.key();
        {
            let mut record = self.inner.record.write().await;
            if record.transactions.contains_key(&key) {
                tracing::debug!(session = %self.id(), deposit = %key, "duplicate deposit ignored");
                return Ok(false);
            }
            if record.is_expired(self.inner.ctx.clock.now()) {
                return Err(GatewayError::Expired);
            }
            let nhash = generate_nhash(&record.nonce, &deposit.txid, deposit.txindex);
            tracing::info!(
                session = %self.id(),
                deposit = %key,
                amount = %deposit.amount,
                "deposit detected"
            );
            record.transactions.insert(
                key.clone(),
                TransactionRecord::new(deposit, TransactionState::Mint(MintState::Detected), nhash),
            );
        }
        self.emit(SessionEvent::DepositDetected(key));
        Ok(true)
    }

    /// Forget a deposit the source chain no longer reports. Deposits past
    /// `Confirming` are kept.
    pub async fn remove_deposit(&self, deposit: &InputChainTransaction) -> bool {
        let key = deposit.key();
        let removed = {
            let mut record = self.inner.record.write().await;
            let removable = record.transactions.get(&key).is_some_and(|tx| {
                matches!(
                    tx.state,
                    TransactionState::Mint(MintState::Detected | MintState::Confirming)
                )
            });
            removable && record.transactions.remove(&key).is_some()
        };
        if removed {
            self.forget(&key).await;
            tracing::info!(session = %self.id(), deposit = %key, "deposit removed");
            self.emit(SessionEvent::DepositRemoved(key));
        } else {
            tracing::warn!(session = %self.id(), deposit = %key, "ignoring removal of unknown or progressed deposit");
        }
        removed
    }

    /// Watch the gateway address in the background. Every new deposit is
    /// processed in its own task. Ends when the session is cancelled, the
    /// source stops reporting or the session expires.
    pub fn watch(&self) -> JoinHandle<Result<(), GatewayError>> {
        let session = self.clone();
        tokio::spawn(async move { session.run_watch().await })
    }

    async fn run_watch(&self) -> Result<(), GatewayError> {
        let address = self
            .gateway_address()
            .ok_or_else(|| GatewayError::InvalidParams("session has no gateway address".into()))?
            .to_string();
        let asset = self.inner.terms.asset.clone();
        let (sink, mut events) = mpsc::channel(self.inner.ctx.config.event_capacity.max(1));
        let cancel = self.inner.cancel.child();
        let source = self.inner.ctx.source.clone();
        let watcher = {
            let cancel = cancel.clone();
            tokio::spawn(async move { source.watch_deposits(&asset, &address, sink, cancel).await })
        };
        tracing::info!(session = %self.id(), gateway = ?self.gateway_address(), "watching for deposits");

        while let Some(event) = events.recv().await {
            match event {
                DepositEvent::Detected(deposit) => {
                    let key = deposit.key();
                    match self.add_deposit(deposit).await {
                        Ok(true) => {
                            // Runs detached; progress lands in the record.
                            let _ = self.process(&key);
                        }
                        Ok(false) => {}
                        Err(GatewayError::Expired) => {
                            tracing::info!(session = %self.id(), "session expired, no longer watching");
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(session = %self.id(), deposit = %key, error = %e, "deposit rejected")
                        }
                    }
                }
                DepositEvent::Removed(deposit) => {
                    self.remove_deposit(&deposit).await;
                }
            }
        }
        cancel.cancel();
        drop(events);
        match watcher.await {
            Ok(result) => result.map_err(GatewayError::from),
            Err(e) => Err(GatewayError::Task(e.to_string())),
        }
    }

    // ── Steps ──────────────────────────────────────────────────────────

    /// Drive a transaction to its terminal state in the background.
    pub fn process(&self, key: &DepositKey) -> Operation<TransactionRecord> {
        let progress = self.subscribe();
        let goal = match self.direction() {
            Direction::Mint => TransactionState::Mint(MintState::Submitted),
            Direction::Burn => TransactionState::Burn(BurnState::Released),
        };
        let cancel = self.tx_token(key);
        let session = self.clone();
        let key = key.clone();
        Operation::new(
            progress,
            tokio::spawn(async move { session.drive(&key, goal, cancel).await }),
        )
    }

    /// Process every transaction that is neither finished nor errored,
    /// e.g. after [`resume`](crate::GatewayEngine::resume).
    pub async fn resume_pending(&self) -> Vec<(DepositKey, Operation<TransactionRecord>)> {
        let pending: Vec<DepositKey> = self
            .inner
            .record
            .read()
            .await
            .transactions
            .iter()
            .filter(|(_, tx)| !tx.state.is_terminal() && !tx.state.is_errored())
            .map(|(key, _)| key.clone())
            .collect();
        pending
            .into_iter()
            .map(|key| {
                let operation = self.process(&key);
                (key, operation)
            })
            .collect()
    }

    /// Wait for the deposit's source confirmations.
    pub async fn confirm(&self, key: &DepositKey) -> Result<Confirmations, GatewayError> {
        self.require(Direction::Mint)?;
        let tx = self
            .drive(key, TransactionState::Mint(MintState::Confirmed), self.tx_token(key))
            .await?;
        Ok(tx.confirmations)
    }

    /// Confirm, then obtain and verify the network's signature.
    pub async fn sign(&self, key: &DepositKey) -> Result<SignedOutput, GatewayError> {
        self.require(Direction::Mint)?;
        let tx = self
            .drive(key, TransactionState::Mint(MintState::Signed), self.tx_token(key))
            .await?;
        tx.signed
            .ok_or_else(|| GatewayError::InvalidParams("signed transaction has no output".into()))
    }

    /// Run every remaining step and submit the mint to the destination.
    /// Once submitted, returns the stored reference without broadcasting.
    pub async fn submit(&self, key: &DepositKey) -> Result<OutputReference, GatewayError> {
        self.require(Direction::Mint)?;
        let tx = self
            .drive(key, TransactionState::Mint(MintState::Submitted), self.tx_token(key))
            .await?;
        tx.destination.ok_or_else(|| {
            GatewayError::InvalidParams("submitted transaction has no reference".into())
        })
    }

    /// Settle the burn and wait for the network to release it.
    pub async fn release(&self) -> Result<ReleaseOutput, GatewayError> {
        self.require(Direction::Burn)?;
        let key = self
            .inner
            .record
            .read()
            .await
            .transactions
            .keys()
            .next()
            .cloned()
            .ok_or_else(|| GatewayError::InvalidParams("burn session has no transaction".into()))?;
        let tx = self
            .drive(&key, TransactionState::Burn(BurnState::Released), self.tx_token(&key))
            .await?;
        tx.released
            .ok_or_else(|| GatewayError::InvalidParams("released transaction has no output".into()))
    }

    /// Return an `Errored` transaction to the state that failed, so the
    /// next step call picks up from there.
    pub async fn retry_transaction(
        &self,
        key: &DepositKey,
    ) -> Result<TransactionState, GatewayError> {
        let lock = self.step_lock(key).await;
        let _guard = lock.lock().await;
        let state = self
            .update(key, |tx| tx.reset().then_some(tx.state))
            .await?
            .ok_or_else(|| GatewayError::NotErrored(key.to_string()))?;
        tracing::info!(session = %self.id(), deposit = %key, %state, "retrying errored transaction");
        self.emit(SessionEvent::StateChanged {
            key: key.clone(),
            state,
        });
        Ok(state)
    }

    /// Confirmations of the destination transaction of a submitted mint.
    pub async fn destination_confirmations(
        &self,
        key: &DepositKey,
    ) -> Result<Confirmations, GatewayError> {
        let destination = self.destination()?;
        let reference = self
            .transaction(key)
            .await
            .ok_or_else(|| GatewayError::UnknownTransaction(key.to_string()))?
            .destination
            .ok_or_else(|| GatewayError::InvalidParams(format!("{key} has not been submitted")))?;
        Ok(destination.confirmations(&reference).await?)
    }

    // ── State machine ──────────────────────────────────────────────────

    /// Run steps until `goal` is reached. `cancel` must be taken when the
    /// call starts, before queueing on the step lock.
    async fn drive(
        &self,
        key: &DepositKey,
        goal: TransactionState,
        cancel: CancelToken,
    ) -> Result<TransactionRecord, GatewayError> {
        let lock = self.step_lock(key).await;
        let _guard = lock.lock().await;
        loop {
            let tx = self
                .transaction(key)
                .await
                .ok_or_else(|| GatewayError::UnknownTransaction(key.to_string()))?;
            if tx.state.reached(goal) {
                return Ok(tx);
            }
            if tx.state.is_errored() {
                let message = tx.error.map(|e| e.message).unwrap_or_default();
                return Err(GatewayError::Errored(message));
            }
            if cancel.is_cancelled() {
                return Err(GatewayError::Cancelled);
            }
            let step = match tx.state {
                TransactionState::Mint(MintState::Detected | MintState::Confirming) => {
                    self.step_confirm(
                        key,
                        &tx,
                        TransactionState::Mint(MintState::Confirming),
                        Some(TransactionState::Mint(MintState::Confirmed)),
                        &cancel,
                    )
                    .await
                }
                TransactionState::Mint(MintState::Confirmed | MintState::Signing) => {
                    self.step_sign(key, &tx, &cancel).await
                }
                TransactionState::Mint(MintState::Signed | MintState::Submitting) => {
                    self.step_submit(key, &tx, &cancel).await
                }
                TransactionState::Burn(BurnState::Created | BurnState::SourceSettling) => {
                    match self
                        .step_confirm(key, &tx, TransactionState::Burn(BurnState::SourceSettling), None, &cancel)
                        .await
                    {
                        Ok(()) => self.step_release(key, &tx, &cancel).await,
                        Err(e) => Err(e),
                    }
                }
                TransactionState::Burn(BurnState::SubmittedToNetwork) => {
                    self.step_release(key, &tx, &cancel).await
                }
                TransactionState::Mint(MintState::Submitted | MintState::Errored)
                | TransactionState::Burn(BurnState::Released | BurnState::Errored) => {
                    return Ok(tx);
                }
            };
            match step {
                Ok(()) => {}
                Err(GatewayError::Cancelled) => {
                    tracing::info!(session = %self.id(), deposit = %key, "step cancelled");
                    return Err(GatewayError::Cancelled);
                }
                Err(e) => {
                    self.mark_errored(key, &e).await;
                    return Err(e);
                }
            }
        }
    }

    /// Poll source confirmations until the target is reached.
    async fn step_confirm(
        &self,
        key: &DepositKey,
        tx: &TransactionRecord,
        during: TransactionState,
        after: Option<TransactionState>,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        self.set_state(key, during).await?;
        let source = &self.inner.ctx.source;
        loop {
            let observed = tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                observed = source.confirmations(&tx.source) => observed,
            };
            match observed {
                Ok(observed) => {
                    let confirmations = self
                        .update(key, |tx| {
                            tx.observe_confirmations(observed);
                            tx.confirmations
                        })
                        .await?;
                    tracing::debug!(
                        session = %self.id(),
                        deposit = %key,
                        current = confirmations.current,
                        target = confirmations.target,
                        "confirmations"
                    );
                    self.emit(SessionEvent::Confirmations {
                        key: key.clone(),
                        confirmations,
                    });
                    if confirmations.is_complete() {
                        if let Some(after) = after {
                            self.set_state(key, after).await?;
                        }
                        return Ok(());
                    }
                }
                Err(e) if e.is_retryable() => {
                    tracing::warn!(session = %self.id(), deposit = %key, error = %e, "confirmation poll failed");
                }
                Err(e) => return Err(e.into()),
            }
            pause(self.inner.ctx.config.poll_interval(), cancel).await?;
        }
    }

    async fn step_sign(
        &self,
        key: &DepositKey,
        tx: &TransactionRecord,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        let terms = &self.inner.terms;
        let request = build_mint_request(&CrossChainParams {
            selector: terms.selector.clone(),
            txid: tx.source.txid.clone(),
            txindex: tx.source.txindex,
            amount: tx.source.amount,
            payload: terms.payload.clone(),
            to: terms.to.clone(),
            nonce: terms.nonce,
            gpubkey: terms.gpubkey.clone(),
        })?;
        let previously_submitted = tx.custody_hash == Some(request.hash);
        self.update(key, |tx| tx.custody_hash = Some(request.hash))
            .await?;
        self.set_state(key, TransactionState::Mint(MintState::Signing))
            .await?;
        tracing::info!(session = %self.id(), deposit = %key, hash = %request.hash, "requesting signature");

        let network = &self.inner.ctx.network;
        let policy = self.inner.ctx.config.session_retry_policy();
        let request = &request;
        let sign_once = |attempt: u32| async move {
            if attempt > 1 {
                network.invalidate_shard(&terms.asset).await;
            }
            self.submit_once(request, previously_submitted || attempt > 1, cancel)
                .await?;
            let output = self
                .wait_for_output(key, &request.hash, unmarshal_mint_output, cancel)
                .await?;
            if output.nhash != tx.nhash {
                return Err(GatewayError::WrongTransaction {
                    expected: tx.nhash.to_string(),
                    returned: output.nhash.to_string(),
                });
            }
            self.verify_signature(&output).await?;
            Ok::<_, GatewayError>(output)
        };
        let output =
            retry_cancellable(&policy, cancel, GatewayError::is_retryable, sign_once).await?;

        self.update(key, |tx| tx.signed = Some(SignedOutput::from(&output)))
            .await?;
        self.set_state(key, TransactionState::Mint(MintState::Signed))
            .await
    }

    async fn step_submit(
        &self,
        key: &DepositKey,
        tx: &TransactionRecord,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        let destination = self.destination()?;
        let output = tx
            .signed
            .as_ref()
            .map(SignedOutput::to_mint_output)
            .ok_or_else(|| GatewayError::InvalidParams(format!("{key} has no signature")))?;
        self.set_state(key, TransactionState::Mint(MintState::Submitting))
            .await?;
        let terms = &self.inner.terms;
        let payload = DestinationPayload {
            selector: terms.selector.clone(),
            to: terms.to.clone(),
            payload: terms.payload.clone(),
            nonce: terms.nonce,
        };

        let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
        let forward = {
            let events = self.inner.events.clone();
            let key = key.clone();
            tokio::spawn(async move {
                while let Some(progress) = progress_rx.recv().await {
                    let _ = events.send(SessionEvent::Destination {
                        key: key.clone(),
                        progress,
                    });
                }
            })
        };

        let policy = self.inner.ctx.config.destination_retry_policy();
        let (destination, payload, output) = (&destination, &payload, &output);
        let result = retry_cancellable(&policy, cancel, GatewayError::is_retryable, |_| {
            let progress_tx = progress_tx.clone();
            async move {
                let submitted = tokio::select! {
                    _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                    submitted = destination.submit(&terms.asset, payload, output, progress_tx) => submitted,
                };
                match submitted {
                    Ok(reference) | Err(ChainError::AlreadySubmitted(reference)) => Ok(reference),
                    Err(e) => Err(GatewayError::from(e)),
                }
            }
        })
        .await;
        drop(progress_tx);
        let _ = forward.await;

        let reference = result?;
        tracing::info!(session = %self.id(), deposit = %key, destination = %reference, "mint submitted");
        self.update(key, |tx| tx.destination = Some(reference))
            .await?;
        self.set_state(key, TransactionState::Mint(MintState::Submitted))
            .await
    }

    async fn step_release(
        &self,
        key: &DepositKey,
        tx: &TransactionRecord,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        let terms = &self.inner.terms;
        let request = build_burn_request(&CrossChainParams {
            selector: terms.selector.clone(),
            txid: tx.source.txid.clone(),
            txindex: tx.source.txindex,
            amount: tx.source.amount,
            payload: terms.payload.clone(),
            to: terms.to.clone(),
            nonce: terms.nonce,
            gpubkey: Vec::new(),
        })?;
        let previously_submitted = tx.custody_hash == Some(request.hash);
        self.update(key, |tx| tx.custody_hash = Some(request.hash))
            .await?;
        tracing::info!(session = %self.id(), burn = %key, hash = %request.hash, "submitting burn");

        let network = &self.inner.ctx.network;
        let policy = self.inner.ctx.config.session_retry_policy();
        let request = &request;
        let release_once = |attempt: u32| async move {
            if attempt > 1 {
                network.invalidate_shard(&terms.asset).await;
            }
            self.submit_once(request, previously_submitted || attempt > 1, cancel)
                .await?;
            self.set_state(key, TransactionState::Burn(BurnState::SubmittedToNetwork))
                .await?;
            self.wait_for_output(key, &request.hash, unmarshal_burn_output, cancel)
                .await
        };
        let output =
            retry_cancellable(&policy, cancel, GatewayError::is_retryable, release_once).await?;

        self.update(key, |tx| tx.released = Some(ReleaseOutput::from(&output)))
            .await?;
        self.set_state(key, TransactionState::Burn(BurnState::Released))
            .await
    }

    /// Submit `request`, unless the network already has it.
    async fn submit_once(
        &self,
        request: &GatewayTransactionRequest,
        check_existing: bool,
        cancel: &CancelToken,
    ) -> Result<(), GatewayError> {
        let network = &self.inner.ctx.network;
        if check_existing {
            let existing = tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                existing = network.query_tx(&request.hash) => existing,
            };
            match existing {
                Ok(_) => return Ok(()),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        tokio::select! {
            _ = cancel.cancelled() => Err(GatewayError::Cancelled),
            submitted = network.submit_tx(request) => submitted.map(|_| ()).map_err(GatewayError::from),
        }
    }

    /// Poll `ren_queryTx` until the output is available.
    async fn wait_for_output<T, U>(
        &self,
        key: &DepositKey,
        hash: &Hash32,
        unmarshal: U,
        cancel: &CancelToken,
    ) -> Result<T, GatewayError>
    where
        U: Fn(&GatewayTransactionResponse) -> Result<Unmarshalled<T>, AssemblerError>,
    {
        let config = &self.inner.ctx.config;
        let limit = config.signature_poll_limit.max(1);
        let mut last_status = None;
        for poll in 0..limit {
            if poll > 0 {
                pause(config.signature_poll_interval(), cancel).await?;
            }
            let queried = tokio::select! {
                _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
                queried = self.inner.ctx.network.query_tx(hash) => queried,
            };
            let response = match queried {
                Ok(response) => response,
                Err(e) if e.is_not_found() || e.is_retryable() => {
                    tracing::debug!(deposit = %key, error = %e, "transaction not available yet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };
            if last_status != Some(response.status) {
                last_status = Some(response.status);
                self.emit(SessionEvent::NetworkStatus {
                    key: key.clone(),
                    status: response.status,
                });
            }
            match unmarshal(&response) {
                Ok(Unmarshalled {
                    status: TxStatus::Reverted,
                    revert_reason,
                    ..
                }) => {
                    return Err(GatewayError::Reverted(revert_reason.unwrap_or_default()));
                }
                Ok(Unmarshalled {
                    output: Some(output),
                    ..
                }) => return Ok(output),
                Ok(_) => {}
                Err(e) if e.is_not_ready() => {
                    tracing::debug!(deposit = %key, error = %e, "output not ready");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(GatewayError::SignatureTimeout(limit))
    }

    /// The signature must recover to the shard key. A mismatch against a
    /// cached key is re-checked once against a freshly selected shard.
    async fn verify_signature(&self, output: &MintOutput) -> Result<(), GatewayError> {
        let terms = &self.inner.terms;
        let network = &self.inner.ctx.network;
        let shard = network.select_shard(&terms.selector).await?;
        match verify_signer(&output.sighash, &output.signature, &shard.public_key) {
            Ok(()) => {}
            Err(mismatch @ CryptoError::SignerMismatch { .. }) => {
                network.invalidate_shard(&terms.asset).await;
                let fresh = network.select_shard(&terms.selector).await?;
                if fresh.public_key == shard.public_key {
                    return Err(GatewayError::from_signer_check(mismatch));
                }
                verify_signer(&output.sighash, &output.signature, &fresh.public_key)
                    .map_err(GatewayError::from_signer_check)?;
            }
            Err(e) => return Err(GatewayError::from_signer_check(e)),
        }

        let shash = generate_shash(&terms.selector);
        let local = generate_sighash(&output.phash, &output.amount, &shash, &terms.to, &output.nhash);
        if let Some(local) = local.filter(|local| *local != output.sighash) {
            tracing::warn!(
                session = %self.id(),
                local = %local,
                network = %output.sighash,
                "network sighash differs from local computation"
            );
        }
        Ok(())
    }

    // ── Helpers ────────────────────────────────────────────────────────

    fn require(&self, direction: Direction) -> Result<(), GatewayError> {
        if self.direction() == direction {
            Ok(())
        } else {
            Err(GatewayError::InvalidParams(format!(
                "not a {} session",
                direction.as_str()
            )))
        }
    }

    fn destination(&self) -> Result<Arc<dyn DestinationChain>, GatewayError> {
        self.inner
            .ctx
            .destination
            .clone()
            .ok_or_else(|| GatewayError::InvalidParams("session has no destination chain".into()))
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.inner.events.send(event);
    }

    async fn update<R>(
        &self,
        key: &DepositKey,
        f: impl FnOnce(&mut TransactionRecord) -> R,
    ) -> Result<R, GatewayError> {
        let mut record = self.inner.record.write().await;
        let tx = record
            .transactions
            .get_mut(key)
            .ok_or_else(|| GatewayError::UnknownTransaction(key.to_string()))?;
        Ok(f(tx))
    }

    async fn set_state(&self, key: &DepositKey, state: TransactionState) -> Result<(), GatewayError> {
        if self.update(key, |tx| tx.advance(state)).await? {
            tracing::info!(session = %self.id(), deposit = %key, %state, "state changed");
            self.emit(SessionEvent::StateChanged {
                key: key.clone(),
                state,
            });
        }
        Ok(())
    }

    async fn mark_errored(&self, key: &DepositKey, error: &GatewayError) {
        let record = ErrorRecord::from_error(error, self.inner.ctx.clock.now());
        let direction = self.direction();
        let updated = self
            .update(key, |tx| {
                tx.fail(record.clone(), direction);
                tx.state
            })
            .await;
        let Ok(state) = updated else {
            return;
        };
        tracing::warn!(session = %self.id(), deposit = %key, kind = %record.kind, error = %record.message, "transaction errored");
        self.emit(SessionEvent::StateChanged {
            key: key.clone(),
            state,
        });
        self.emit(SessionEvent::Errored {
            key: key.clone(),
            error: record,
        });
    }

    async fn step_lock(&self, key: &DepositKey) -> Arc<Mutex<()>> {
        self.inner
            .step_locks
            .lock()
            .await
            .entry(key.clone())
            .or_default()
            .clone()
    }

    /// Token for a call starting now. Calls share the current token until
    /// it is cancelled; the first call after a cancel gets a fresh one.
    fn tx_token(&self, key: &DepositKey) -> CancelToken {
        let mut tokens = self.tokens();
        match tokens.get(key) {
            Some(token) if !token.is_cancelled() => token.clone(),
            _ => {
                let token = self.inner.cancel.child();
                tokens.insert(key.clone(), token.clone());
                token
            }
        }
    }

    fn tokens(&self) -> MutexGuard<'_, HashMap<DepositKey, CancelToken>> {
        self.inner
            .tx_tokens
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Cancel a removed deposit's calls and drop its bookkeeping.
    async fn forget(&self, key: &DepositKey) {
        let token = self.tokens().remove(key);
        if let Some(token) = token {
            token.cancel();
        }
        self.inner.step_locks.lock().await.remove(key);
    }
}

async fn pause(duration: Duration, cancel: &CancelToken) -> Result<(), GatewayError> {
    tokio::select! {
        _ = cancel.cancelled() => Err(GatewayError::Cancelled),
        _ = tokio::time::sleep(duration) => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GatewayEngine, MintParams};
    use bridge_nullables::{
        FakeChainState, NullCustodyNetwork, NullDestinationChain, NullSourceChain,
    };
    use bridge_types::Amount;

    async fn mint_session() -> GatewaySession {
        let network = Arc::new(NullCustodyNetwork::new(7));
        let provider = NullCustodyNetwork::provider(network).unwrap();
        let config = GatewayConfig {
            poll_interval_ms: 2,
            ..GatewayConfig::default()
        };
        // No confirmation step: deposits stay in `Confirming`.
        GatewayEngine::new(Arc::new(provider), config)
            .with_source(Arc::new(
                NullSourceChain::new("Bitcoin", FakeChainState::new()).with_native("BTC"),
            ))
            .with_destination(Arc::new(
                NullDestinationChain::new("Ethereum", FakeChainState::new()).with_asset("BTC"),
            ))
            .create_mint(MintParams {
                asset: "BTC".into(),
                from: "Bitcoin".into(),
                to: "Ethereum".into(),
                recipient: "0x797522Fb74d42bB9fbF6b76dEa24D01A538d5D66".into(),
                payload: Vec::new(),
                nonce: None,
                target_amount: None,
            })
            .await
            .unwrap()
    }

    fn deposit() -> InputChainTransaction {
        InputChainTransaction {
            chain: "Bitcoin".into(),
            txid: vec![1; 32],
            txindex: 0,
            amount: Amount::from_u128(10_000),
        }
    }

    #[tokio::test]
    async fn removed_deposit_drops_its_lock_and_token() {
        let session = mint_session().await;
        let key = deposit().key();
        session.add_deposit(deposit()).await.unwrap();
        let operation = session.process(&key);
        assert!(session.tokens().contains_key(&key));

        tokio::time::timeout(Duration::from_secs(5), async {
            while !session.inner.step_locks.lock().await.contains_key(&key) {
                tokio::time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .unwrap();

        assert!(session.remove_deposit(&deposit()).await);
        assert!(operation.wait().await.is_err());
        assert!(session.tokens().is_empty());
        assert!(session.inner.step_locks.lock().await.is_empty());
    }

    #[tokio::test]
    async fn call_after_a_cancel_gets_a_fresh_token() {
        let session = mint_session().await;
        let key = deposit().key();
        let first = session.tx_token(&key);
        assert!(!session.tx_token(&key).is_cancelled());
        session.cancel_transaction(&key);
        assert!(first.is_cancelled());
        assert!(!session.tx_token(&key).is_cancelled());
    }
}
