//! `ren_submitGateway` payload.
//!
//! Registering a gateway tells the network which parameters a deposit
//! address was derived from, so deposits can be recovered even if the
//! client that created the address disappears.

use serde::{Deserialize, Serialize};

use bridge_crypto::{generate_ghash, generate_nhash, generate_phash, generate_shash};
use bridge_pack::{PackValue, TypedValue};
use bridge_types::{Hash32, Selector};

use crate::schema::{submit_gateway_type, TX_VERSION};
use crate::AssemblerError;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitGatewayTx {
    pub selector: Selector,
    pub version: String,
    #[serde(rename = "in")]
    pub input: TypedValue,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitGatewayRequest {
    pub gateway: String,
    pub tx: SubmitGatewayTx,
}

impl SubmitGatewayRequest {
    /// The nHash is derived with an empty txid, since no deposit exists yet.
    pub fn new(
        gateway: &str,
        selector: &Selector,
        payload: &[u8],
        to: &str,
        nonce: &Hash32,
        gpubkey: &[u8],
    ) -> Result<Self, AssemblerError> {
        if !selector.is_mint() {
            return Err(AssemblerError::InvalidParams(format!(
                "gateways are only registered for mints, got {selector}"
            )));
        }
        if gateway.is_empty() || gpubkey.is_empty() {
            return Err(AssemblerError::InvalidParams(
                "gateway address and shard key must be set".into(),
            ));
        }
        let phash = generate_phash(payload);
        let shash = generate_shash(selector);
        let ghash = generate_ghash(&phash, &shash, to, nonce);
        let nhash = generate_nhash(nonce, &[], 0);
        let input = TypedValue::new(
            submit_gateway_type(),
            PackValue::structure([
                ("payload", PackValue::Bytes(payload.to_vec())),
                ("phash", PackValue::Bytes32(*phash.as_bytes())),
                ("to", PackValue::Str(to.to_string())),
                ("nonce", PackValue::Bytes32(*nonce.as_bytes())),
                ("nhash", PackValue::Bytes32(*nhash.as_bytes())),
                ("gpubkey", PackValue::Bytes(gpubkey.to_vec())),
                ("ghash", PackValue::Bytes32(*ghash.as_bytes())),
            ]),
        );
        Ok(Self {
            gateway: gateway.to_string(),
            tx: SubmitGatewayTx {
                selector: selector.clone(),
                version: TX_VERSION.to_string(),
                input,
            },
        })
    }
}
