use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use bridge_chains::{BurnDetails, InputChainTransaction};
use bridge_gateway::{
    BurnParams, BurnSource, BurnState, GatewayConfig, GatewayEngine, GatewayError, GatewaySession,
    MintParams, MintState, SessionEvent, SessionRecord, TransactionState,
};
use bridge_nullables::{
    FakeChainState, NullClock, NullCustodyNetwork, NullDestinationChain, NullSourceChain,
};
use bridge_transactions::Outpoint;
use bridge_types::{Amount, Hash32};

const RECIPIENT: &str = "0x797522Fb74d42bB9fbF6b76dEa24D01A538d5D66";

struct Harness {
    network: Arc<NullCustodyNetwork>,
    bitcoin: Arc<FakeChainState>,
    ethereum: Arc<FakeChainState>,
    clock: Arc<NullClock>,
}

impl Harness {
    fn new() -> Self {
        let bitcoin = FakeChainState::new();
        bitcoin.set_confirmation_step(2);
        let ethereum = FakeChainState::new();
        ethereum.set_confirmation_step(3);
        Self {
            network: Arc::new(NullCustodyNetwork::new(7)),
            bitcoin,
            ethereum,
            clock: Arc::new(NullClock::new(1_000)),
        }
    }

    fn config() -> GatewayConfig {
        GatewayConfig {
            poll_interval_ms: 2,
            signature_poll_interval_ms: 2,
            signature_poll_limit: 20,
            session_retries: 2,
            destination_retries: 3,
            retry_backoff_ms: 0,
            session_ttl_secs: 3_600,
            ..GatewayConfig::default()
        }
    }

    fn engine_with(&self, config: GatewayConfig) -> GatewayEngine {
        let provider = NullCustodyNetwork::provider(self.network.clone()).unwrap();
        GatewayEngine::new(Arc::new(provider), config)
            .with_clock(self.clock.clone())
            .with_source(Arc::new(
                NullSourceChain::new("Bitcoin", self.bitcoin.clone())
                    .with_native("BTC")
                    .with_address_prefix("bc1"),
            ))
            .with_source(Arc::new(
                NullSourceChain::new("Ethereum", self.ethereum.clone())
                    .with_asset("BTC")
                    .with_address_prefix("0x"),
            ))
            .with_destination(Arc::new(
                NullDestinationChain::new("Ethereum", self.ethereum.clone()).with_asset("BTC"),
            ))
    }

    fn engine(&self) -> GatewayEngine {
        self.engine_with(Self::config())
    }
}

fn mint_params() -> MintParams {
    MintParams {
        asset: "BTC".into(),
        from: "Bitcoin".into(),
        to: "Ethereum".into(),
        recipient: RECIPIENT.into(),
        payload: Vec::new(),
        nonce: Some(Hash32::new([1; 32])),
        target_amount: None,
    }
}

fn deposit(txid: u8) -> InputChainTransaction {
    InputChainTransaction {
        chain: "Bitcoin".into(),
        txid: vec![txid; 32],
        txindex: 0,
        amount: Amount::from_u128(10_000),
    }
}

fn drain(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    seen
}

async fn wait_for_state(session: &GatewaySession, deposit: &InputChainTransaction, state: TransactionState) {
    let key = deposit.key();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if session
                .transaction(&key)
                .await
                .is_some_and(|tx| tx.state == state)
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{key} never reached {state}"));
}

// ── Mint ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn mint_runs_to_submitted() {
    let harness = Harness::new();
    harness.network.set_fee(1_000);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    let address = session.gateway_address().unwrap().to_string();
    assert!(address.starts_with("bc1"));
    assert_eq!(harness.network.gateways(), vec![address]);

    let mut events = session.subscribe();
    assert!(session.add_deposit(deposit(1)).await.unwrap());
    let tx = session.process(&deposit(1).key()).wait().await.unwrap();

    assert_eq!(tx.state, TransactionState::Mint(MintState::Submitted));
    assert_eq!(tx.signed.unwrap().amount, Amount::from_u128(9_000));
    assert_eq!(harness.ethereum.mints(), vec![tx.destination.unwrap()]);

    let seen = drain(&mut events);
    let confirmations: Vec<u64> = seen
        .iter()
        .filter_map(|e| match e {
            SessionEvent::Confirmations { confirmations, .. } => Some(confirmations.current),
            _ => None,
        })
        .collect();
    assert_eq!(confirmations, [0, 2, 4, 6]);
    let confirmed = seen
        .iter()
        .filter(|e| {
            matches!(
                e,
                SessionEvent::StateChanged {
                    state: TransactionState::Mint(MintState::Confirmed),
                    ..
                }
            )
        })
        .count();
    assert_eq!(confirmed, 1);
    assert!(seen
        .iter()
        .any(|e| matches!(e, SessionEvent::Destination { .. })));
}

#[tokio::test]
async fn session_id_is_the_ghash() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    let record = session.snapshot().await;
    assert_eq!(session.id(), record.ghash.to_base64());
    assert_eq!(record.expires_at.as_secs(), 1_000 + 3_600);
    assert_eq!(record.gpubkey, harness.network.signer_key());
}

#[tokio::test]
async fn duplicate_deposits_are_ignored() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    assert!(session.add_deposit(deposit(1)).await.unwrap());
    assert!(!session.add_deposit(deposit(1)).await.unwrap());
    assert!(session.add_deposit(deposit(2)).await.unwrap());
    assert_eq!(session.transactions().await.len(), 2);
}

#[tokio::test]
async fn submit_is_idempotent() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let (a, b) = tokio::join!(session.submit(&key), session.submit(&key));
    let first = a.unwrap();
    assert_eq!(b.unwrap(), first);
    assert_eq!(session.submit(&key).await.unwrap(), first);
    assert_eq!(harness.ethereum.submit_calls(), 1);
    assert_eq!(harness.network.submissions().len(), 1);
}

#[tokio::test]
async fn already_submitted_counts_as_success() {
    let harness = Harness::new();
    let engine = harness.engine();
    let key = deposit(1).key();

    let first = engine.create_mint(mint_params()).await.unwrap();
    first.add_deposit(deposit(1)).await.unwrap();
    let reference = first.submit(&key).await.unwrap();

    // Same nonce and deposit: same nHash, which the destination already holds.
    let second = engine.create_mint(mint_params()).await.unwrap();
    second.add_deposit(deposit(1)).await.unwrap();
    assert_eq!(second.submit(&key).await.unwrap(), reference);
    assert_eq!(harness.ethereum.mints().len(), 1);
}

#[tokio::test]
async fn transient_destination_failures_are_retried() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();
    session.sign(&key).await.unwrap();

    harness.ethereum.fail_transiently(2);
    session.submit(&key).await.unwrap();
    assert_eq!(harness.ethereum.submit_calls(), 3);
}

#[tokio::test]
async fn transient_source_failures_keep_polling() {
    let harness = Harness::new();
    harness.bitcoin.fail_transiently(2);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let confirmations = session.confirm(&deposit(1).key()).await.unwrap();
    assert!(confirmations.is_complete());
    assert_eq!(harness.bitcoin.confirmation_polls(), 6);
}

#[tokio::test]
async fn unreachable_node_is_retried_by_the_client() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();
    session.confirm(&key).await.unwrap();
    harness.network.fail_next(1);
    session.sign(&key).await.unwrap();
}

#[tokio::test]
async fn signature_from_wrong_key_is_fatal() {
    let harness = Harness::new();
    harness
        .network
        .publish_key(NullCustodyNetwork::new(9).signer_key());
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let err = session.sign(&key).await.unwrap_err();
    assert!(matches!(err, GatewayError::SignatureMismatch { .. }), "{err:?}");
    let tx = session.transaction(&key).await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Errored));
    assert_eq!(tx.error.unwrap().kind, "signature_mismatch");
    assert_eq!(tx.interrupted, Some(TransactionState::Mint(MintState::Signing)));
    assert_eq!(harness.ethereum.submit_calls(), 0);

    // An errored transaction stays put until explicitly retried.
    assert!(matches!(
        session.submit(&key).await,
        Err(GatewayError::Errored(_))
    ));
}

#[tokio::test]
async fn reshard_is_picked_up_on_mismatch() {
    let harness = Harness::new();
    let real_key = harness.network.signer_key();
    harness
        .network
        .publish_key(NullCustodyNetwork::new(9).signer_key());
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();
    session.confirm(&key).await.unwrap();

    // The cached key is stale; the network now publishes its real signer.
    harness.network.publish_key(real_key);
    session.sign(&key).await.unwrap();
}

#[tokio::test]
async fn revert_is_fatal() {
    let harness = Harness::new();
    harness.network.set_revert(Some("amount below minimum"));
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let err = session.sign(&deposit(1).key()).await.unwrap_err();
    assert_eq!(err, GatewayError::Reverted("amount below minimum".into()));
    assert_eq!(harness.network.submissions().len(), 1);
}

#[tokio::test]
async fn output_for_another_transfer_is_rejected() {
    let harness = Harness::new();
    harness.network.set_answer_nhash(Some(Hash32::new([0x55; 32])));
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let err = session.process(&key).wait().await.unwrap_err();
    assert!(matches!(err, GatewayError::WrongTransaction { .. }), "{err:?}");
    let tx = session.transaction(&key).await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Errored));
    assert!(tx.signed.is_none());
    assert_eq!(harness.ethereum.submit_calls(), 0);
}

#[tokio::test]
async fn signature_timeout_does_not_resubmit() {
    let harness = Harness::new();
    harness.network.set_polls_until_done(1_000);
    let config = GatewayConfig {
        signature_poll_limit: 3,
        ..Harness::config()
    };
    let session = harness
        .engine_with(config)
        .create_mint(mint_params())
        .await
        .unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let err = session.sign(&deposit(1).key()).await.unwrap_err();
    assert_eq!(err, GatewayError::SignatureTimeout(3));
    // The second attempt finds the transaction already known.
    assert_eq!(harness.network.submissions().len(), 1);
}

#[tokio::test]
async fn errored_transaction_can_be_retried() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();
    session.sign(&key).await.unwrap();

    assert!(matches!(
        session.retry_transaction(&key).await,
        Err(GatewayError::NotErrored(_))
    ));

    harness.ethereum.fail_fatally(Some("nonce too low"));
    assert!(matches!(
        session.submit(&key).await,
        Err(GatewayError::Chain(_))
    ));
    harness.ethereum.fail_fatally(None);

    let state = session.retry_transaction(&key).await.unwrap();
    assert_eq!(state, TransactionState::Mint(MintState::Submitting));
    session.submit(&key).await.unwrap();
    let tx = session.transaction(&key).await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Submitted));
    assert!(tx.error.is_none());
}

#[tokio::test]
async fn cancelling_leaves_state_untouched() {
    let harness = Harness::new();
    harness.bitcoin.set_confirmation_step(0);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let operation = session.process(&key);
    wait_for_state(&session, &deposit(1), TransactionState::Mint(MintState::Confirming)).await;
    session.cancel_transaction(&key);
    assert_eq!(operation.wait().await.unwrap_err(), GatewayError::Cancelled);
    let tx = session.transaction(&key).await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Confirming));
    assert!(tx.error.is_none());

    // The transaction can be driven again afterwards.
    harness.bitcoin.set_confirmation_step(6);
    session.confirm(&key).await.unwrap();
}

#[tokio::test]
async fn cancel_issued_before_the_step_starts_is_honoured() {
    let harness = Harness::new();
    harness.bitcoin.set_confirmation_step(0);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let operation = session.process(&key);
    session.cancel_transaction(&key);
    let result = tokio::time::timeout(Duration::from_secs(2), operation.wait())
        .await
        .expect("cancelled transaction kept running");
    assert_eq!(result.unwrap_err(), GatewayError::Cancelled);
    let tx = session.transaction(&key).await.unwrap();
    assert!(tx.error.is_none());
    assert!(!tx.state.is_errored());
}

#[tokio::test]
async fn cancel_reaches_calls_queued_behind_the_running_step() {
    let harness = Harness::new();
    harness.bitcoin.set_confirmation_step(0);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();

    let running = session.process(&key);
    wait_for_state(&session, &deposit(1), TransactionState::Mint(MintState::Confirming)).await;
    let queued = {
        let session = session.clone();
        let key = key.clone();
        tokio::spawn(async move { session.confirm(&key).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    session.cancel_transaction(&key);
    assert_eq!(running.wait().await.unwrap_err(), GatewayError::Cancelled);
    let queued = tokio::time::timeout(Duration::from_secs(2), queued)
        .await
        .expect("queued call kept running")
        .unwrap();
    assert_eq!(queued.unwrap_err(), GatewayError::Cancelled);
}

#[tokio::test]
async fn cancelling_one_deposit_leaves_its_sibling_running() {
    let harness = Harness::new();
    harness.bitcoin.set_confirmation_step(0);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    session.add_deposit(deposit(2)).await.unwrap();

    let first = session.process(&deposit(1).key());
    let second = session.process(&deposit(2).key());
    wait_for_state(&session, &deposit(1), TransactionState::Mint(MintState::Confirming)).await;
    wait_for_state(&session, &deposit(2), TransactionState::Mint(MintState::Confirming)).await;

    session.cancel_transaction(&deposit(1).key());
    assert_eq!(first.wait().await.unwrap_err(), GatewayError::Cancelled);

    // The sibling is still polling and finishes once its deposit confirms.
    harness.bitcoin.set_confirmations(&deposit(2).key(), 6);
    let tx = second.wait().await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Submitted));
    let first = session.transaction(&deposit(1).key()).await.unwrap();
    assert_eq!(first.state, TransactionState::Mint(MintState::Confirming));
    assert_eq!(harness.ethereum.mints().len(), 1);
}

#[tokio::test]
async fn cancelled_session_stops_every_transaction() {
    let harness = Harness::new();
    harness.bitcoin.set_confirmation_step(0);
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    session.add_deposit(deposit(2)).await.unwrap();
    let first = session.process(&deposit(1).key());
    let second = session.process(&deposit(2).key());
    session.cancel();
    assert_eq!(first.wait().await.unwrap_err(), GatewayError::Cancelled);
    assert_eq!(second.wait().await.unwrap_err(), GatewayError::Cancelled);
}

#[tokio::test]
async fn expired_session_rejects_deposits() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    harness.clock.advance(3_600);
    assert_eq!(
        session.add_deposit(deposit(1)).await.unwrap_err(),
        GatewayError::Expired
    );
}

#[tokio::test]
async fn removed_deposit_is_forgotten_before_signing_only() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    session.add_deposit(deposit(2)).await.unwrap();
    session.sign(&deposit(2).key()).await.unwrap();

    assert!(session.remove_deposit(&deposit(1)).await);
    assert!(!session.remove_deposit(&deposit(2)).await);
    let keys: Vec<_> = session.transactions().await.iter().map(|tx| tx.key()).collect();
    assert_eq!(keys, vec![deposit(2).key()]);
}

#[tokio::test]
async fn snapshot_resumes_where_it_stopped() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    session.add_deposit(deposit(1)).await.unwrap();
    let key = deposit(1).key();
    session.confirm(&key).await.unwrap();
    let polls = harness.bitcoin.confirmation_polls();

    let json = session.snapshot().await.to_json().unwrap();
    drop(session);

    let record = SessionRecord::from_json(&json).unwrap();
    let resumed = harness.engine().resume(record).unwrap();
    let mut pending = resumed.resume_pending().await;
    assert_eq!(pending.len(), 1);
    let (resumed_key, operation) = pending.remove(0);
    assert_eq!(resumed_key, key);
    let tx = operation.wait().await.unwrap();
    assert_eq!(tx.state, TransactionState::Mint(MintState::Submitted));
    assert_eq!(harness.bitcoin.confirmation_polls(), polls);
}

#[tokio::test]
async fn watch_processes_new_deposits() {
    let harness = Harness::new();
    let session = harness.engine().create_mint(mint_params()).await.unwrap();
    let address = session.gateway_address().unwrap().to_string();
    let watcher = session.watch();

    harness.bitcoin.add_deposit(&address, deposit(1));
    wait_for_state(&session, &deposit(1), TransactionState::Mint(MintState::Submitted)).await;

    session.cancel();
    watcher.await.unwrap().unwrap();
    assert_eq!(harness.ethereum.mints().len(), 1);
}

// ── Validation ─────────────────────────────────────────────────────────

#[tokio::test]
async fn invalid_requests_fail_before_any_network_call() {
    let harness = Harness::new();
    let engine = harness.engine();

    let err = engine
        .create_mint(MintParams {
            asset: "DOGE".into(),
            ..mint_params()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedAsset { .. }), "{err:?}");

    let err = engine
        .create_mint(MintParams {
            to: "Solana".into(),
            ..mint_params()
        })
        .await
        .unwrap_err();
    assert_eq!(err, GatewayError::UnsupportedChain("Solana".into()));

    let err = engine
        .create_mint(MintParams {
            recipient: "not-an-address".into(),
            ..mint_params()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidAddress { .. }), "{err:?}");

    assert_eq!(harness.network.total_calls(), 0);
}

#[tokio::test]
async fn selector_must_be_whitelisted() {
    let harness = Harness::new();
    harness.network.set_whitelist(&["ZEC/toEthereum"]);
    let err = harness
        .engine()
        .create_mint(mint_params())
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::UnsupportedAsset { .. }), "{err:?}");
    assert_eq!(harness.network.calls("ren_queryBlockState"), 0);
}

#[tokio::test]
async fn registration_can_be_disabled() {
    let harness = Harness::new();
    let config = GatewayConfig {
        register_gateway: false,
        verify_selector: false,
        ..Harness::config()
    };
    harness
        .engine_with(config)
        .create_mint(mint_params())
        .await
        .unwrap();
    assert!(harness.network.gateways().is_empty());
    assert_eq!(harness.network.calls("ren_queryConfig"), 0);
}

// ── Burn ───────────────────────────────────────────────────────────────

fn burn() -> BurnDetails {
    BurnDetails {
        transaction: InputChainTransaction {
            chain: "Ethereum".into(),
            txid: vec![5; 32],
            txindex: 0,
            amount: Amount::from_u128(50_000),
        },
        to: "bc1qrecipient".into(),
        nonce: Hash32::new([4; 32]),
    }
}

fn burn_params(source: BurnSource) -> BurnParams {
    BurnParams {
        asset: "BTC".into(),
        from: "Ethereum".into(),
        to: "Bitcoin".into(),
        source,
    }
}

#[tokio::test]
async fn burn_is_released() {
    let harness = Harness::new();
    harness.network.set_fee(500);
    harness.ethereum.add_burn(burn());
    let session = harness
        .engine()
        .create_burn(burn_params(BurnSource::Nonce {
            nonce: Hash32::new([4; 32]),
        }))
        .await
        .unwrap();
    assert_eq!(session.selector().to_string(), "BTC/fromEthereum");
    assert!(session.gateway_address().is_none());

    let released = session.release().await.unwrap();
    assert_eq!(released.amount, Amount::from_u128(49_500));
    assert_eq!(
        released.release,
        Some(Outpoint {
            txid: vec![0xee; 32],
            txindex: 0,
        })
    );
    let tx = session.transaction(&burn().transaction.key()).await.unwrap();
    assert_eq!(tx.state, TransactionState::Burn(BurnState::Released));
    assert_eq!(session.id(), tx.nhash.to_base64());
}

#[tokio::test]
async fn burn_with_unknown_nonce_fails() {
    let harness = Harness::new();
    let err = harness
        .engine()
        .create_burn(burn_params(BurnSource::Nonce {
            nonce: Hash32::new([8; 32]),
        }))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::BurnNotFound(_)), "{err:?}");
}

#[tokio::test]
async fn burn_recipient_is_validated_on_release_chain() {
    let harness = Harness::new();
    let mut details = burn();
    details.to = RECIPIENT.into();
    let err = harness
        .engine()
        .create_burn(burn_params(BurnSource::Transaction(details)))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::InvalidAddress { .. }), "{err:?}");
    assert_eq!(harness.network.total_calls(), 0);
}

#[tokio::test]
async fn burn_sessions_take_no_deposits() {
    let harness = Harness::new();
    let session = harness
        .engine()
        .create_burn(burn_params(BurnSource::Transaction(burn())))
        .await
        .unwrap();
    assert!(matches!(
        session.add_deposit(deposit(1)).await,
        Err(GatewayError::InvalidParams(_))
    ));
}
