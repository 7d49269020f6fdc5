//! Unmarshalling queried transactions.
//!
//! A queried transaction carries up to three typed sections: `out` (set by
//! execution), `autogen` (filled in by the network) and `in` (what was
//! submitted). Each output field is looked up in that order; a field found
//! nowhere is [`AssemblerError::MissingField`].

use serde::{Deserialize, Serialize};

use bridge_crypto::RecoverableSignature;
use bridge_pack::{marshal, unmarshal_exact, PackType, PackValue, TypedValue};
use bridge_types::encoding::serde_base64;
use bridge_types::{Amount, Hash32, Selector, TxStatus, U256};

use crate::request::hash_transaction;
use crate::AssemblerError;

/// A transaction as returned by `ren_queryTx`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewayTransactionResponse {
    pub hash: Hash32,
    pub version: String,
    pub selector: Selector,
    pub input: TypedValue,
    pub output: Option<TypedValue>,
    pub autogen: Option<TypedValue>,
    pub status: TxStatus,
}

impl GatewayTransactionResponse {
    /// Whether `hash` matches the hash recomputed from the returned input.
    pub fn hash_matches(&self) -> bool {
        hash_transaction(&self.version, &self.selector, &self.input)
            .map(|h| h == self.hash)
            .unwrap_or(false)
    }

    fn sources(&self) -> [Option<&TypedValue>; 3] {
        [self.output.as_ref(), self.autogen.as_ref(), Some(&self.input)]
    }

    /// Revert reason from `out`/`autogen`, if the network set a non-empty one.
    pub fn revert_reason(&self) -> Option<String> {
        let sections = [self.output.as_ref(), self.autogen.as_ref()];
        lookup_str(&sections, "revert").ok().filter(|r| !r.is_empty())
    }
}

/// A transaction output reference on some chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outpoint {
    #[serde(with = "serde_base64")]
    pub txid: Vec<u8>,
    pub txindex: u32,
}

/// What a finished mint gives the destination chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintOutput {
    /// Amount after network fees.
    pub amount: Amount,
    pub signature: RecoverableSignature,
    pub sighash: Hash32,
    pub phash: Hash32,
    pub nhash: Hash32,
    /// Outpoint of the deposit on UTXO source chains.
    pub outpoint: Option<Outpoint>,
}

/// What a finished burn reports about the release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BurnOutput {
    /// Amount released after network fees.
    pub amount: Amount,
    /// Release transaction on the destination chain, once known.
    pub release: Option<Outpoint>,
}

/// Decoded status plus output. `output` is set only once the transaction is
/// done; `revert_reason` only when it reverted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unmarshalled<T> {
    pub status: TxStatus,
    pub output: Option<T>,
    pub revert_reason: Option<String>,
}

impl<T> Unmarshalled<T> {
    fn pending(status: TxStatus) -> Self {
        Self {
            status,
            output: None,
            revert_reason: None,
        }
    }

    fn reverted(reason: String) -> Self {
        Self {
            status: TxStatus::Reverted,
            output: None,
            revert_reason: Some(reason),
        }
    }
}

fn revert_check<T>(response: &GatewayTransactionResponse) -> Option<Unmarshalled<T>> {
    match (response.status, response.revert_reason()) {
        (TxStatus::Reverted, reason) => Some(Unmarshalled::reverted(
            reason.unwrap_or_else(|| "transaction reverted".to_string()),
        )),
        (TxStatus::Done, Some(reason)) => Some(Unmarshalled::reverted(reason)),
        (TxStatus::Done, None) => None,
        (status, _) => Some(Unmarshalled::pending(status)),
    }
}

pub fn unmarshal_mint_output(
    response: &GatewayTransactionResponse,
) -> Result<Unmarshalled<MintOutput>, AssemblerError> {
    if let Some(early) = revert_check(response) {
        return Ok(early);
    }
    let sources = response.sources();
    let sig = lookup_bytes65(&sources, "sig")?;
    let signature = RecoverableSignature::from_bytes65(&sig)
        .map_err(|e| AssemblerError::InvalidSignature(e.to_string()))?;
    let outpoint = match (lookup_bytes(&sources, "txid"), lookup_u32(&sources, "txindex")) {
        (Ok(txid), Ok(txindex)) if !txid.is_empty() => Some(Outpoint { txid, txindex }),
        _ => None,
    };
    let output = MintOutput {
        amount: Amount::new(lookup_uint(&sources, "amount")?),
        signature,
        sighash: lookup_bytes32(&sources, "sighash")?,
        phash: lookup_bytes32(&sources, "phash")?,
        nhash: lookup_bytes32(&sources, "nhash")?,
        outpoint,
    };
    Ok(Unmarshalled {
        status: TxStatus::Done,
        output: Some(output),
        revert_reason: None,
    })
}

pub fn unmarshal_burn_output(
    response: &GatewayTransactionResponse,
) -> Result<Unmarshalled<BurnOutput>, AssemblerError> {
    if let Some(early) = revert_check(response) {
        return Ok(early);
    }
    let sources = response.sources();
    // The release reference lives in the execution sections only; `in`
    // holds the burn itself.
    let executed = [response.output.as_ref(), response.autogen.as_ref()];
    let release = match (lookup_bytes(&executed, "txid"), lookup_u32(&executed, "txindex")) {
        (Ok(txid), Ok(txindex)) if !txid.is_empty() => Some(Outpoint { txid, txindex }),
        _ => None,
    };
    Ok(Unmarshalled {
        status: TxStatus::Done,
        output: Some(BurnOutput {
            amount: Amount::new(lookup_uint(&sources, "amount")?),
            release,
        }),
        revert_reason: None,
    })
}

// ── Field lookup ───────────────────────────────────────────────────────

fn lookup<'a>(
    sources: &[Option<&'a TypedValue>],
    name: &str,
) -> Result<(&'a PackType, &'a PackValue), AssemblerError> {
    sources
        .iter()
        .flatten()
        .find_map(|section| section.field(name))
        .ok_or_else(|| AssemblerError::MissingField(name.to_string()))
}

fn wrong_type(name: &str, expected: &str, found: &PackType) -> AssemblerError {
    AssemblerError::FieldType {
        field: name.to_string(),
        expected: expected.to_string(),
        found: found.to_string(),
    }
}

/// Any unsigned integer field, checked to re-encode to the same value.
pub(crate) fn lookup_uint(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<U256, AssemblerError> {
    let (ty, value) = lookup(sources, name)?;
    let n = match value {
        PackValue::UInt(n) if ty.uint_bytes().is_some() => *n,
        _ => return Err(wrong_type(name, "uint", ty)),
    };
    let reencoded = marshal(ty, value)?;
    let decoded = unmarshal_exact(&reencoded, ty)?;
    let reparsed = n.to_string().parse::<Amount>().map(|a| a.raw()).ok();
    if decoded != *value || reparsed != Some(n) {
        return Err(AssemblerError::NumericRoundTrip(name.to_string()));
    }
    Ok(n)
}

pub(crate) fn lookup_u32(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<u32, AssemblerError> {
    let n = lookup_uint(sources, name)?;
    u32::try_from(n).map_err(|_| AssemblerError::NumericRoundTrip(name.to_string()))
}

pub(crate) fn lookup_bytes(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<Vec<u8>, AssemblerError> {
    let (ty, value) = lookup(sources, name)?;
    value
        .as_bytes()
        .map(<[u8]>::to_vec)
        .ok_or_else(|| wrong_type(name, "bytes", ty))
}

pub(crate) fn lookup_bytes32(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<Hash32, AssemblerError> {
    let (ty, value) = lookup(sources, name)?;
    value
        .as_bytes()
        .and_then(|b| Hash32::from_slice(b).ok())
        .ok_or_else(|| wrong_type(name, "bytes32", ty))
}

pub(crate) fn lookup_bytes65(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<[u8; 65], AssemblerError> {
    let (ty, value) = lookup(sources, name)?;
    value
        .as_bytes()
        .and_then(|b| <[u8; 65]>::try_from(b).ok())
        .ok_or_else(|| wrong_type(name, "bytes65", ty))
}

pub(crate) fn lookup_str(
    sources: &[Option<&TypedValue>],
    name: &str,
) -> Result<String, AssemblerError> {
    let (ty, value) = lookup(sources, name)?;
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| wrong_type(name, "string", ty))
}
