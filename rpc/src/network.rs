//! The view of the custody network the gateway engine works against.

use async_trait::async_trait;

use bridge_transactions::{GatewayTransactionRequest, GatewayTransactionResponse, SubmitGatewayRequest};
use bridge_types::{Hash32, Selector};

use crate::provider::RpcProvider;
use crate::responses::NetworkConfig;
use crate::shard::Shard;
use crate::RpcError;

#[async_trait]
pub trait CustodyNetwork: Send + Sync {
    async fn submit_tx(&self, tx: &GatewayTransactionRequest) -> Result<Hash32, RpcError>;

    async fn query_tx(&self, hash: &Hash32) -> Result<GatewayTransactionResponse, RpcError>;

    async fn select_shard(&self, selector: &Selector) -> Result<Shard, RpcError>;

    async fn invalidate_shard(&self, asset: &str);

    async fn query_config(&self) -> Result<NetworkConfig, RpcError>;

    async fn submit_gateway(&self, request: &SubmitGatewayRequest) -> Result<(), RpcError>;
}

#[async_trait]
impl CustodyNetwork for RpcProvider {
    async fn submit_tx(&self, tx: &GatewayTransactionRequest) -> Result<Hash32, RpcError> {
        RpcProvider::submit_tx(self, tx).await
    }

    async fn query_tx(&self, hash: &Hash32) -> Result<GatewayTransactionResponse, RpcError> {
        RpcProvider::query_tx(self, hash).await
    }

    async fn select_shard(&self, selector: &Selector) -> Result<Shard, RpcError> {
        RpcProvider::select_shard(self, selector).await
    }

    async fn invalidate_shard(&self, asset: &str) {
        RpcProvider::invalidate_shard(self, asset).await
    }

    async fn query_config(&self) -> Result<NetworkConfig, RpcError> {
        RpcProvider::query_config(self).await
    }

    async fn submit_gateway(&self, request: &SubmitGatewayRequest) -> Result<(), RpcError> {
        RpcProvider::submit_gateway(self, request).await
    }
}
