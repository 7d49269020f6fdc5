//! Nullable custody network: answers JSON-RPC in memory.
//!
//! Plugs into [`RpcProvider`] as its [`Transport`], so tests exercise the
//! real request encoding and response parsing. Submitted transactions are
//! executed after a configurable number of polls: mints are signed with a
//! local shard key, burns get a release reference.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use k256::ecdsa::SigningKey;
use serde_json::{json, Value};

use bridge_crypto::{generate_sighash, generate_shash};
use bridge_pack::json::{typed_from_json, typed_to_json};
use bridge_pack::{PackType, PackValue, TypedValue};
use bridge_rpc::{HttpReply, RpcConfig, RpcError, RpcProvider, Transport, TransportError};
use bridge_transactions::schema::cross_chain_output_type;
use bridge_transactions::CrossChainInput;
use bridge_types::{Amount, Hash32, Selector, U256};

use crate::lock;

/// Node URL the nullable answers on.
pub const NULL_NODE: &str = "http://null-node";

struct StoredTx {
    hash: Hash32,
    version: String,
    selector: Selector,
    input: TypedValue,
    polls: u32,
}

struct NetworkState {
    whitelist: Vec<String>,
    confirmations: BTreeMap<String, u64>,
    /// Key published in block state. Normally the signer's key.
    published_key: Vec<u8>,
    polls_until_done: u32,
    fee: u64,
    revert: Option<String>,
    fail_next: u32,
    release_txid: Vec<u8>,
    answer_nhash: Option<Hash32>,
    txs: HashMap<Hash32, StoredTx>,
    submissions: Vec<Hash32>,
    gateways: Vec<String>,
    calls: Vec<String>,
}

/// An in-memory custody network.
pub struct NullCustodyNetwork {
    signer: SigningKey,
    state: Mutex<NetworkState>,
}

impl NullCustodyNetwork {
    /// A network whose shard key is `[seed; 32]`, with `seed` clamped to
    /// `1..=0x7f`. Whitelists `*`, executes on the first poll and charges
    /// no fee.
    pub fn new(seed: u8) -> Self {
        let signer = shard_key(seed);
        let published_key = compressed(&signer);
        Self {
            signer,
            state: Mutex::new(NetworkState {
                whitelist: vec!["*".into()],
                confirmations: BTreeMap::new(),
                published_key,
                polls_until_done: 1,
                fee: 0,
                revert: None,
                fail_next: 0,
                release_txid: vec![0xee; 32],
                answer_nhash: None,
                txs: HashMap::new(),
                submissions: Vec::new(),
                gateways: Vec::new(),
                calls: Vec::new(),
            }),
        }
    }

    /// A provider talking to `network` with no backoff and a short timeout.
    pub fn provider(network: Arc<Self>) -> Result<RpcProvider, RpcError> {
        let config = RpcConfig {
            nodes: vec![NULL_NODE.to_string()],
            timeout_secs: 5,
            retry_attempts: 2,
            retry_initial_backoff_ms: 0,
            retry_max_backoff_ms: 0,
            ..RpcConfig::default()
        };
        RpcProvider::with_transport(&config, network)
    }

    /// Compressed SEC1 key the network signs with.
    pub fn signer_key(&self) -> Vec<u8> {
        compressed(&self.signer)
    }

    /// Publish a different shard key, e.g. to simulate a reshard or a
    /// signer that does not match.
    pub fn publish_key(&self, key: Vec<u8>) {
        lock(&self.state).published_key = key;
    }

    pub fn set_whitelist(&self, selectors: &[&str]) {
        lock(&self.state).whitelist = selectors.iter().map(|s| s.to_string()).collect();
    }

    pub fn set_confirmations(&self, chain: &str, confirmations: u64) {
        lock(&self.state)
            .confirmations
            .insert(chain.to_string(), confirmations);
    }

    /// Queries needed before a submitted transaction reports `done`.
    pub fn set_polls_until_done(&self, polls: u32) {
        lock(&self.state).polls_until_done = polls;
    }

    /// Deducted from every minted or released amount.
    pub fn set_fee(&self, fee: u64) {
        lock(&self.state).fee = fee;
    }

    /// Make every transaction revert with `reason`.
    pub fn set_revert(&self, reason: Option<&str>) {
        lock(&self.state).revert = reason.map(str::to_string);
    }

    /// Fail the next `count` requests as unreachable.
    pub fn fail_next(&self, count: u32) {
        lock(&self.state).fail_next = count;
    }

    pub fn set_release_txid(&self, txid: Vec<u8>) {
        lock(&self.state).release_txid = txid;
    }

    /// Answer every query with the input and shard signature of the
    /// transfer whose nHash is `nhash`, as a faulty node would.
    pub fn set_answer_nhash(&self, nhash: Option<Hash32>) {
        lock(&self.state).answer_nhash = nhash;
    }

    /// Hashes in the order `ren_submitTx` received them, duplicates included.
    pub fn submissions(&self) -> Vec<Hash32> {
        lock(&self.state).submissions.clone()
    }

    /// Gateway addresses registered through `ren_submitGateway`.
    pub fn gateways(&self) -> Vec<String> {
        lock(&self.state).gateways.clone()
    }

    /// How many requests of `method` were received.
    pub fn calls(&self, method: &str) -> usize {
        lock(&self.state)
            .calls
            .iter()
            .filter(|m| m.as_str() == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        lock(&self.state).calls.len()
    }

    fn handle(&self, method: &str, params: &Value) -> Result<Value, Value> {
        let mut state = lock(&self.state);
        state.calls.push(method.to_string());
        match method {
            "ren_queryConfig" => Ok(json!({
                "network": "localnet",
                "confirmations": state.confirmations,
                "whitelist": state.whitelist,
            })),
            "ren_queryBlockState" => {
                let asset = params["contract"].as_str().unwrap_or_default();
                let state = block_state(asset, &state.published_key);
                Ok(json!({ "state": typed_to_json(&state).map_err(internal)? }))
            }
            "ren_submitGateway" => {
                let gateway = params["gateway"].as_str().unwrap_or_default();
                state.gateways.push(gateway.to_string());
                Ok(json!({}))
            }
            "ren_submitTx" => {
                let tx = &params["tx"];
                let hash = Hash32::from_base64(tx["hash"].as_str().unwrap_or_default())
                    .map_err(internal)?;
                let selector = tx["selector"]
                    .as_str()
                    .unwrap_or_default()
                    .parse::<Selector>()
                    .map_err(internal)?;
                let input = typed_from_json(&tx["in"]).map_err(internal)?;
                state.submissions.push(hash);
                state.txs.entry(hash).or_insert(StoredTx {
                    hash,
                    version: tx["version"].as_str().unwrap_or("1").to_string(),
                    selector,
                    input,
                    polls: 0,
                });
                Ok(json!({ "tx": tx }))
            }
            "ren_queryTx" => {
                let hash = Hash32::from_base64(params["txHash"].as_str().unwrap_or_default())
                    .map_err(internal)?;
                let (polls_until_done, fee, revert, release_txid, answer_nhash) = (
                    state.polls_until_done,
                    state.fee,
                    state.revert.clone(),
                    state.release_txid.clone(),
                    state.answer_nhash,
                );
                let Some(tx) = state.txs.get_mut(&hash) else {
                    return Err(json!({ "code": -32001, "message": "tx not found" }));
                };
                tx.polls += 1;
                let executed = tx.polls >= polls_until_done;
                let mut input = CrossChainInput::from_typed(&tx.input).map_err(internal)?;
                let answered = match answer_nhash {
                    Some(nhash) => {
                        input.nhash = nhash;
                        input.to_typed()
                    }
                    None => tx.input.clone(),
                };
                let mut body = json!({
                    "hash": tx.hash.to_base64(),
                    "version": tx.version,
                    "selector": tx.selector.to_string(),
                    "in": typed_to_json(&answered).map_err(internal)?,
                });
                let status = match (executed, revert) {
                    (false, _) => "executing",
                    (true, Some(reason)) => {
                        body["out"] = typed_to_json(&reverted_output(&reason)).map_err(internal)?;
                        "reverted"
                    }
                    (true, None) => {
                        let output = if tx.selector.is_mint() {
                            self.mint_output(tx, &input, fee)?
                        } else {
                            release_output(tx, &input, fee, &release_txid)
                        };
                        body["out"] = typed_to_json(&output).map_err(internal)?;
                        "done"
                    }
                };
                Ok(json!({ "tx": body, "txStatus": status }))
            }
            other => Err(json!({ "code": -32601, "message": format!("method {other} not found") })),
        }
    }

    fn mint_output(
        &self,
        tx: &StoredTx,
        input: &CrossChainInput,
        fee: u64,
    ) -> Result<TypedValue, Value> {
        let amount = Amount::new(input.amount.raw().saturating_sub(U256::from(fee)));
        let shash = generate_shash(&tx.selector);
        let sighash = generate_sighash(&input.phash, &amount, &shash, &input.to, &input.nhash)
            .unwrap_or(tx.hash);
        let (signature, recovery) = self
            .signer
            .sign_prehash_recoverable(sighash.as_bytes())
            .map_err(internal)?;
        let mut sig = [0u8; 65];
        sig[..64].copy_from_slice(&signature.to_bytes());
        sig[64] = 27 + recovery.to_byte();
        Ok(output(amount, tx.hash, sighash, sig, Vec::new(), ""))
    }

    fn reply(id: &Value, outcome: Result<Value, Value>) -> HttpReply {
        let body = match outcome {
            Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
            Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
        };
        HttpReply {
            status: 200,
            body: body.to_string(),
        }
    }
}

#[async_trait]
impl Transport for NullCustodyNetwork {
    async fn post(&self, _url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        {
            let mut state = lock(&self.state);
            if state.fail_next > 0 {
                state.fail_next -= 1;
                return Err(TransportError::Unreachable("injected failure".into()));
            }
        }
        let method = body["method"].as_str().unwrap_or_default();
        let outcome = self.handle(method, &body["params"]);
        Ok(Self::reply(&body["id"], outcome))
    }
}

fn internal(e: impl std::fmt::Display) -> Value {
    json!({ "code": -32603, "message": e.to_string() })
}

fn shard_key(seed: u8) -> SigningKey {
    SigningKey::from_slice(&[seed.clamp(1, 0x7f); 32]).expect("scalars below 0x80.. are below the curve order")
}

fn compressed(key: &SigningKey) -> Vec<u8> {
    key.verifying_key().to_encoded_point(true).as_bytes().to_vec()
}

fn block_state(asset: &str, key: &[u8]) -> TypedValue {
    let shard = PackType::structure([("pubKey", PackType::Bytes)]);
    TypedValue::new(
        PackType::structure([(
            asset.to_string(),
            PackType::structure([("shards", PackType::list(shard))]),
        )]),
        PackValue::structure([(
            asset.to_string(),
            PackValue::structure([(
                "shards",
                PackValue::List(vec![PackValue::structure([(
                    "pubKey",
                    PackValue::Bytes(key.to_vec()),
                )])]),
            )]),
        )]),
    )
}

fn output(
    amount: Amount,
    hash: Hash32,
    sighash: Hash32,
    sig: [u8; 65],
    txid: Vec<u8>,
    revert: &str,
) -> TypedValue {
    TypedValue::new(
        cross_chain_output_type(),
        PackValue::structure([
            ("amount", PackValue::UInt(amount.raw())),
            ("hash", PackValue::Bytes32(*hash.as_bytes())),
            ("sighash", PackValue::Bytes32(*sighash.as_bytes())),
            ("sig", PackValue::Bytes65(sig)),
            ("txid", PackValue::Bytes(txid)),
            ("txindex", PackValue::uint(0)),
            ("revert", PackValue::Str(revert.to_string())),
        ]),
    )
}

fn release_output(
    tx: &StoredTx,
    input: &CrossChainInput,
    fee: u64,
    release_txid: &[u8],
) -> TypedValue {
    let amount = Amount::new(input.amount.raw().saturating_sub(U256::from(fee)));
    output(
        amount,
        tx.hash,
        Hash32::ZERO,
        [0; 65],
        release_txid.to_vec(),
        "",
    )
}

fn reverted_output(reason: &str) -> TypedValue {
    output(Amount::ZERO, Hash32::ZERO, Hash32::ZERO, [0; 65], Vec::new(), reason)
}
