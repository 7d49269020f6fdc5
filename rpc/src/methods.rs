//! Custody-network RPC methods.

use serde_json::{json, Value};

use bridge_pack::json::typed_to_json;
use bridge_pack::TypedValue;
use bridge_transactions::{GatewayTransactionRequest, GatewayTransactionResponse, SubmitGatewayRequest};
use bridge_types::{Hash32, Selector, TxStatus};

use crate::provider::RpcProvider;
use crate::responses::{
    asset_state, parse_block_state, parse_query_config, parse_query_tx, parse_query_txs,
    shard_public_key, AssetState, NetworkConfig, TxSummary,
};
use crate::shard::Shard;
use crate::RpcError;

/// JSON-RPC method names.
pub mod method {
    pub const SUBMIT_GATEWAY: &str = "ren_submitGateway";
    pub const SUBMIT_TX: &str = "ren_submitTx";
    pub const QUERY_TX: &str = "ren_queryTx";
    pub const QUERY_TXS: &str = "ren_queryTxs";
    pub const QUERY_BLOCK: &str = "ren_queryBlock";
    pub const QUERY_CONFIG: &str = "ren_queryConfig";
    pub const QUERY_STATE: &str = "ren_queryState";
    pub const QUERY_BLOCK_STATE: &str = "ren_queryBlockState";
}

/// Filter for `ren_queryTxs`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct QueryTxsFilter {
    pub status: Option<TxStatus>,
    pub page: u64,
    pub page_size: Option<u64>,
    pub tags: Vec<Hash32>,
}

fn tx_json(
    hash: Option<&Hash32>,
    selector: &Selector,
    version: &str,
    input: &TypedValue,
) -> Result<Value, RpcError> {
    let mut tx = json!({
        "selector": selector.to_string(),
        "version": version,
        "in": typed_to_json(input)?,
    });
    if let Some(hash) = hash {
        tx["hash"] = json!(hash.to_base64());
    }
    Ok(tx)
}

impl RpcProvider {
    /// Submit a mint or burn. Returns the transaction hash.
    pub async fn submit_tx(&self, tx: &GatewayTransactionRequest) -> Result<Hash32, RpcError> {
        let params = json!({
            "tx": tx_json(Some(&tx.hash), &tx.selector, &tx.version, &tx.input)?,
        });
        let result = self.call(method::SUBMIT_TX, params).await?;
        let echoed = result
            .pointer("/tx/hash")
            .and_then(Value::as_str)
            .and_then(|h| Hash32::from_base64(h).ok());
        if let Some(echoed) = echoed.filter(|h| *h != tx.hash) {
            tracing::warn!(local = %tx.hash, remote = %echoed, "node returned a different transaction hash");
        }
        Ok(tx.hash)
    }

    /// Look up a transaction by hash. Unknown hashes are [`RpcError::NotFound`];
    /// a reply for any other hash is a [`RpcError::Decode`].
    pub async fn query_tx(&self, hash: &Hash32) -> Result<GatewayTransactionResponse, RpcError> {
        let result = self
            .call(method::QUERY_TX, json!({ "txHash": hash.to_base64() }))
            .await?;
        let response = parse_query_tx(&result)?;
        if response.hash != *hash {
            return Err(RpcError::Decode {
                reason: format!("asked for transaction {hash}, got {}", response.hash),
                raw: result.to_string(),
            });
        }
        if !response.hash_matches() {
            tracing::warn!(hash = %hash, "queried transaction hash does not match its contents");
        }
        Ok(response)
    }

    /// One page of transactions, optionally filtered by status and tags.
    pub async fn query_txs(&self, filter: &QueryTxsFilter) -> Result<Vec<TxSummary>, RpcError> {
        let mut params = json!({
            "page": filter.page.to_string(),
            "tags": filter.tags.iter().map(Hash32::to_base64).collect::<Vec<_>>(),
        });
        if let Some(status) = filter.status {
            params["txStatus"] = json!(status.as_str());
        }
        if let Some(size) = filter.page_size {
            params["pageSize"] = json!(size.to_string());
        }
        let result = self.call(method::QUERY_TXS, params).await?;
        parse_query_txs(&result)
    }

    pub async fn query_config(&self) -> Result<NetworkConfig, RpcError> {
        let result = self.call(method::QUERY_CONFIG, json!({})).await?;
        parse_query_config(&result)
    }

    /// Block state of `asset`, validated to contain its shard list.
    pub async fn query_block_state(&self, asset: &str) -> Result<TypedValue, RpcError> {
        let result = self
            .call(method::QUERY_BLOCK_STATE, json!({ "contract": asset }))
            .await?;
        parse_block_state(asset, &result)
    }

    /// Legacy whole-network state. Returned as raw JSON.
    pub async fn query_state(&self) -> Result<Value, RpcError> {
        let result = self.call(method::QUERY_STATE, json!({})).await?;
        result
            .get("state")
            .cloned()
            .ok_or_else(|| RpcError::Decode {
                reason: "missing field `state`".into(),
                raw: result.to_string(),
            })
    }

    /// A block by height, or the latest block. Returned as raw JSON.
    pub async fn query_block(&self, height: Option<u64>) -> Result<Value, RpcError> {
        let params = match height {
            Some(height) => json!({ "blockHeight": height }),
            None => json!({}),
        };
        let result = self.call(method::QUERY_BLOCK, params).await?;
        result
            .get("block")
            .cloned()
            .ok_or_else(|| RpcError::Decode {
                reason: "missing field `block`".into(),
                raw: result.to_string(),
            })
    }

    /// Minimum amounts and fees of `asset`.
    pub async fn asset_state(&self, asset: &str) -> Result<AssetState, RpcError> {
        let state = self.query_block_state(asset).await?;
        Ok(asset_state(asset, &state))
    }

    /// Register a gateway's parameters so its deposits can be recovered.
    pub async fn submit_gateway(&self, request: &SubmitGatewayRequest) -> Result<(), RpcError> {
        let params = json!({
            "gateway": request.gateway,
            "tx": tx_json(None, &request.tx.selector, &request.tx.version, &request.tx.input)?,
        });
        self.call(method::SUBMIT_GATEWAY, params).await?;
        Ok(())
    }

    /// Shard responsible for `selector`'s asset, from the cache when fresh.
    pub async fn select_shard(&self, selector: &Selector) -> Result<Shard, RpcError> {
        let asset = selector.asset();
        if let Some(shard) = self.shards.get(asset).await {
            return Ok(shard);
        }
        let state = self.query_block_state(asset).await?;
        let public_key =
            shard_public_key(asset, &state).ok_or_else(|| RpcError::NoShard(asset.to_string()))?;
        tracing::debug!(asset, "selected shard");
        Ok(self
            .shards
            .insert(Shard {
                asset: asset.to_string(),
                public_key,
                expiry: None,
            })
            .await)
    }

    /// Drop the cached shard for `asset`, e.g. after a reshard.
    pub async fn invalidate_shard(&self, asset: &str) {
        self.shards.invalidate(asset).await;
    }
}
