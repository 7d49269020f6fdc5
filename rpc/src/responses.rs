//! Typed views of method results.
//!
//! Every parser takes the `result` JSON and validates it before handing
//! anything to the assembler. Shape errors become [`RpcError::Decode`]
//! carrying the raw JSON.

use serde_json::Value;
use std::collections::BTreeMap;

use bridge_pack::json::typed_from_json;
use bridge_pack::{PackType, TypedValue};
use bridge_transactions::schema::{cross_chain_input_type, shard_state_type};
use bridge_transactions::{GatewayTransactionResponse, TX_VERSION};
use bridge_types::{Amount, Hash32, Selector, TxStatus};

use crate::RpcError;

fn decode_err(reason: impl Into<String>, raw: &Value) -> RpcError {
    RpcError::Decode {
        reason: reason.into(),
        raw: raw.to_string(),
    }
}

fn str_field<'a>(obj: &'a Value, name: &str, raw: &Value) -> Result<&'a str, RpcError> {
    obj.get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| decode_err(format!("missing string field `{name}`"), raw))
}

fn typed_field(obj: &Value, name: &str, raw: &Value) -> Result<Option<TypedValue>, RpcError> {
    match obj.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(value) => typed_from_json(value)
            .map(Some)
            .map_err(|e| decode_err(format!("field `{name}`: {e}"), raw)),
    }
}

/// Unsigned integer sent either as a decimal string or a JSON number.
fn as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::String(s) => s.parse().ok(),
        other => other.as_u64(),
    }
}

/// A transaction entry as it appears in `ren_queryTx` and `ren_queryTxs`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxSummary {
    pub hash: Hash32,
    pub version: String,
    pub selector: Selector,
    pub input: TypedValue,
    pub output: Option<TypedValue>,
    pub autogen: Option<TypedValue>,
}

fn parse_tx(tx: &Value, raw: &Value) -> Result<TxSummary, RpcError> {
    let hash = Hash32::from_base64(str_field(tx, "hash", raw)?)
        .map_err(|e| decode_err(format!("field `hash`: {e}"), raw))?;
    let version = tx
        .get("version")
        .and_then(Value::as_str)
        .unwrap_or(TX_VERSION)
        .to_string();
    let selector = str_field(tx, "selector", raw)?
        .parse::<Selector>()
        .map_err(|e| decode_err(format!("field `selector`: {e}"), raw))?;
    let input = typed_field(tx, "in", raw)?.ok_or_else(|| decode_err("missing field `in`", raw))?;
    Ok(TxSummary {
        hash,
        version,
        selector,
        input,
        output: typed_field(tx, "out", raw)?,
        autogen: typed_field(tx, "autogen", raw)?,
    })
}

/// `{tx: {hash, version, selector, in, out?, autogen?}, txStatus}`.
pub fn parse_query_tx(result: &Value) -> Result<GatewayTransactionResponse, RpcError> {
    let tx = result
        .get("tx")
        .ok_or_else(|| decode_err("missing field `tx`", result))?;
    let summary = parse_tx(tx, result)?;
    if !summary.input.ty.conforms_to(&cross_chain_input_type()) {
        return Err(decode_err(
            format!("`in` has unexpected type {}", summary.input.ty),
            result,
        ));
    }
    let status = str_field(result, "txStatus", result)?
        .parse::<TxStatus>()
        .map_err(|e| decode_err(e.to_string(), result))?;
    Ok(GatewayTransactionResponse {
        hash: summary.hash,
        version: summary.version,
        selector: summary.selector,
        input: summary.input,
        output: summary.output,
        autogen: summary.autogen,
        status,
    })
}

/// `{txs: [...]}`.
pub fn parse_query_txs(result: &Value) -> Result<Vec<TxSummary>, RpcError> {
    result
        .get("txs")
        .and_then(Value::as_array)
        .ok_or_else(|| decode_err("missing array `txs`", result))?
        .iter()
        .map(|tx| parse_tx(tx, result))
        .collect()
}

/// Network-wide parameters from `ren_queryConfig`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkConfig {
    pub network: String,
    /// Confirmations the network waits for, per chain.
    pub confirmations: BTreeMap<String, u64>,
    pub max_confirmations: BTreeMap<String, u64>,
    /// Gateway registry contract per chain.
    pub registries: BTreeMap<String, String>,
    /// Selectors the network accepts.
    pub whitelist: Vec<String>,
}

impl NetworkConfig {
    pub fn confirmations_for(&self, chain: &str) -> Option<u64> {
        self.confirmations.get(chain).copied()
    }

    /// Whether the network accepts `selector`. `*` whitelists everything.
    pub fn supports(&self, selector: &Selector) -> bool {
        let full = selector.to_string();
        let contract = selector.to_contract_form();
        self.whitelist
            .iter()
            .any(|s| s == "*" || *s == full || *s == contract)
    }

    /// Whether any whitelisted selector moves `asset`.
    pub fn supports_asset(&self, asset: &str) -> bool {
        let prefix = format!("{asset}/");
        self.whitelist
            .iter()
            .any(|s| s == "*" || s.starts_with(&prefix))
    }
}

fn u64_map(result: &Value, name: &str) -> Result<BTreeMap<String, u64>, RpcError> {
    let Some(entries) = result.get(name) else {
        return Ok(BTreeMap::new());
    };
    let entries = entries
        .as_object()
        .ok_or_else(|| decode_err(format!("`{name}` is not an object"), result))?;
    entries
        .iter()
        .map(|(chain, value)| {
            as_u64(value)
                .map(|n| (chain.clone(), n))
                .ok_or_else(|| decode_err(format!("`{name}.{chain}` is not an integer"), result))
        })
        .collect()
}

pub fn parse_query_config(result: &Value) -> Result<NetworkConfig, RpcError> {
    let registries = result
        .get("registries")
        .and_then(Value::as_object)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|(chain, v)| v.as_str().map(|s| (chain.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();
    let whitelist = result
        .get("whitelist")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();
    Ok(NetworkConfig {
        network: result
            .get("network")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        confirmations: u64_map(result, "confirmations")?,
        max_confirmations: u64_map(result, "maxConfirmations")?,
        registries,
        whitelist,
    })
}

/// `{state: <typed value>}` from `ren_queryBlockState`, checked to hold
/// the shard list of `asset`.
pub fn parse_block_state(asset: &str, result: &Value) -> Result<TypedValue, RpcError> {
    let state = typed_field(result, "state", result)?
        .ok_or_else(|| decode_err("missing field `state`", result))?;
    if !state.ty.conforms_to(&shard_state_type(asset)) {
        return Err(decode_err(
            format!("block state has no shard list for {asset}"),
            result,
        ));
    }
    Ok(state)
}

/// First shard of `asset` with a non-empty public key.
pub fn shard_public_key(asset: &str, state: &TypedValue) -> Option<Vec<u8>> {
    state
        .value
        .field(asset)?
        .field("shards")?
        .as_list()?
        .iter()
        .filter_map(|shard| shard.field("pubKey")?.as_bytes())
        .find(|key| !key.is_empty())
        .map(<[u8]>::to_vec)
}

/// Per-chain fees of an asset, in basis points.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainFee {
    pub chain: String,
    pub mint_fee: u64,
    pub burn_fee: u64,
}

/// Asset parameters carried in the block state.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetState {
    pub minimum_amount: Option<Amount>,
    pub dust_amount: Option<Amount>,
    pub fees: Vec<ChainFee>,
}

impl AssetState {
    pub fn fee_for(&self, chain: &str) -> Option<&ChainFee> {
        self.fees.iter().find(|fee| fee.chain == chain)
    }
}

/// Optional parameters are read leniently; missing ones stay `None`.
pub fn asset_state(asset: &str, state: &TypedValue) -> AssetState {
    let Some(entry) = state.value.field(asset) else {
        return AssetState::default();
    };
    let amount = |name: &str| entry.field(name)?.as_uint().map(Amount::new);
    let fees = entry
        .field("fees")
        .and_then(|fees| fees.field("chains"))
        .and_then(|chains| chains.as_list())
        .map(|chains| {
            chains
                .iter()
                .filter_map(|fee| {
                    Some(ChainFee {
                        chain: fee.field("chain")?.as_str()?.to_string(),
                        mint_fee: u64::try_from(fee.field("mintFee")?.as_uint()?).ok()?,
                        burn_fee: u64::try_from(fee.field("burnFee")?.as_uint()?).ok()?,
                    })
                })
                .collect()
        })
        .unwrap_or_default();
    AssetState {
        minimum_amount: amount("minimumAmount"),
        dust_amount: amount("dustAmount"),
        fees,
    }
}

/// Expected type of a block-state entry, used when building fixtures.
pub fn block_state_entry_type() -> PackType {
    PackType::structure([
        ("minimumAmount", PackType::U256),
        ("dustAmount", PackType::U256),
        (
            "fees",
            PackType::structure([(
                "chains",
                PackType::list(PackType::structure([
                    ("burnFee", PackType::U64),
                    ("chain", PackType::Str),
                    ("mintFee", PackType::U64),
                ])),
            )]),
        ),
        (
            "shards",
            PackType::list(PackType::structure([
                ("shard", PackType::Bytes32),
                ("pubKey", PackType::Bytes),
            ])),
        ),
    ])
}
