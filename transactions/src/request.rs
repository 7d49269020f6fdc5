//! Building mint and burn transactions.

use serde::{Deserialize, Serialize};

use bridge_crypto::{generate_ghash, generate_nhash, generate_phash, generate_shash, sha256_multi};
use bridge_pack::{marshal_string, marshal_typed, PackValue, TypedValue};
use bridge_types::{Amount, Hash32, Selector};

use crate::response::{lookup_bytes, lookup_bytes32, lookup_str, lookup_u32, lookup_uint};
use crate::schema::{cross_chain_input_type, TX_VERSION};
use crate::AssemblerError;

/// What the caller knows about a cross-chain transfer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossChainParams {
    pub selector: Selector,
    /// Source-chain transaction id (deposit for mints, burn for releases).
    pub txid: Vec<u8>,
    pub txindex: u32,
    pub amount: Amount,
    /// Opaque destination payload, committed to by pHash.
    pub payload: Vec<u8>,
    pub to: String,
    pub nonce: Hash32,
    /// Shard public key the deposit address was derived from. Empty for burns.
    pub gpubkey: Vec<u8>,
}

/// Transaction input with every hash derived.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CrossChainInput {
    pub txid: Vec<u8>,
    pub txindex: u32,
    pub amount: Amount,
    pub payload: Vec<u8>,
    pub phash: Hash32,
    pub to: String,
    pub nonce: Hash32,
    pub nhash: Hash32,
    pub gpubkey: Vec<u8>,
    pub ghash: Hash32,
}

impl CrossChainInput {
    pub fn derive(params: &CrossChainParams) -> Self {
        let phash = generate_phash(&params.payload);
        let shash = generate_shash(&params.selector);
        let ghash = generate_ghash(&phash, &shash, &params.to, &params.nonce);
        let nhash = generate_nhash(&params.nonce, &params.txid, params.txindex);
        Self {
            txid: params.txid.clone(),
            txindex: params.txindex,
            amount: params.amount,
            payload: params.payload.clone(),
            phash,
            to: params.to.clone(),
            nonce: params.nonce,
            nhash,
            gpubkey: params.gpubkey.clone(),
            ghash,
        }
    }

    pub fn to_typed(&self) -> TypedValue {
        TypedValue::new(
            cross_chain_input_type(),
            PackValue::structure([
                ("txid", PackValue::Bytes(self.txid.clone())),
                ("txindex", PackValue::uint(u64::from(self.txindex))),
                ("amount", PackValue::UInt(self.amount.raw())),
                ("payload", PackValue::Bytes(self.payload.clone())),
                ("phash", PackValue::Bytes32(*self.phash.as_bytes())),
                ("to", PackValue::Str(self.to.clone())),
                ("nonce", PackValue::Bytes32(*self.nonce.as_bytes())),
                ("nhash", PackValue::Bytes32(*self.nhash.as_bytes())),
                ("gpubkey", PackValue::Bytes(self.gpubkey.clone())),
                ("ghash", PackValue::Bytes32(*self.ghash.as_bytes())),
            ]),
        )
    }

    pub fn from_typed(input: &TypedValue) -> Result<Self, AssemblerError> {
        let sources = [Some(input)];
        Ok(Self {
            txid: lookup_bytes(&sources, "txid")?,
            txindex: lookup_u32(&sources, "txindex")?,
            amount: Amount::new(lookup_uint(&sources, "amount")?),
            payload: lookup_bytes(&sources, "payload")?,
            phash: lookup_bytes32(&sources, "phash")?,
            to: lookup_str(&sources, "to")?,
            nonce: lookup_bytes32(&sources, "nonce")?,
            nhash: lookup_bytes32(&sources, "nhash")?,
            gpubkey: lookup_bytes(&sources, "gpubkey")?,
            ghash: lookup_bytes32(&sources, "ghash")?,
        })
    }
}

/// A transaction ready for `ren_submitTx`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayTransactionRequest {
    pub hash: Hash32,
    pub version: String,
    pub selector: Selector,
    #[serde(rename = "in")]
    pub input: TypedValue,
}

impl GatewayTransactionRequest {
    pub fn new(selector: Selector, input: TypedValue) -> Result<Self, AssemblerError> {
        let hash = hash_transaction(TX_VERSION, &selector, &input)?;
        Ok(Self {
            hash,
            version: TX_VERSION.to_string(),
            selector,
            input,
        })
    }
}

/// Content hash of a transaction:
/// `sha256(str(version) ‖ str(selector) ‖ type(in) ‖ value(in))`.
pub fn hash_transaction(
    version: &str,
    selector: &Selector,
    input: &TypedValue,
) -> Result<Hash32, AssemblerError> {
    let version = marshal_string(version)?;
    let selector = marshal_string(&selector.to_string())?;
    let input = marshal_typed(input)?;
    Ok(Hash32::new(sha256_multi(&[&version, &selector, &input])))
}

fn check_common(params: &CrossChainParams) -> Result<(), AssemblerError> {
    if params.amount.is_zero() {
        return Err(AssemblerError::InvalidParams("amount must be non-zero".into()));
    }
    if params.to.is_empty() {
        return Err(AssemblerError::InvalidParams("recipient must be set".into()));
    }
    if params.txid.is_empty() {
        return Err(AssemblerError::InvalidParams("source txid must be set".into()));
    }
    Ok(())
}

/// Build the mint transaction for a confirmed deposit.
pub fn build_mint_request(
    params: &CrossChainParams,
) -> Result<GatewayTransactionRequest, AssemblerError> {
    if !params.selector.is_mint() {
        return Err(AssemblerError::InvalidParams(format!(
            "{} is not a mint selector",
            params.selector
        )));
    }
    if params.gpubkey.is_empty() {
        return Err(AssemblerError::InvalidParams(
            "mint requires the shard public key".into(),
        ));
    }
    check_common(params)?;
    let input = CrossChainInput::derive(params);
    GatewayTransactionRequest::new(params.selector.clone(), input.to_typed())
}

/// Build the release transaction for a confirmed burn.
pub fn build_burn_request(
    params: &CrossChainParams,
) -> Result<GatewayTransactionRequest, AssemblerError> {
    if !params.selector.is_burn() {
        return Err(AssemblerError::InvalidParams(format!(
            "{} is not a burn selector",
            params.selector
        )));
    }
    check_common(params)?;
    let input = CrossChainInput::derive(params);
    GatewayTransactionRequest::new(params.selector.clone(), input.to_typed())
}
