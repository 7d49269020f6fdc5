//! Session creation and resumption.

use std::collections::HashMap;
use std::sync::Arc;

use bridge_chains::{DestinationChain, SourceChain};
use bridge_crypto::{generate_ghash, generate_nhash, generate_phash, generate_shash, random_nonce};
use bridge_rpc::{CustodyNetwork, RpcProvider};
use bridge_transactions::SubmitGatewayRequest;
use bridge_types::{Clock, Direction, Route, Selector, SystemClock};

use crate::config::GatewayConfig;
use crate::params::{BurnParams, BurnSource, MintParams, SessionParams};
use crate::record::{BurnState, SessionRecord, TransactionRecord, TransactionState};
use crate::session::{GatewaySession, SessionContext};
use crate::GatewayError;

/// Creates gateway sessions over a custody network and a set of chains.
///
/// Chains are registered by name; a session's `from` and `to` must name
/// registered chains. Registration happens once at startup, so the engine
/// itself holds no locks.
pub struct GatewayEngine {
    network: Arc<dyn CustodyNetwork>,
    sources: HashMap<String, Arc<dyn SourceChain>>,
    destinations: HashMap<String, Arc<dyn DestinationChain>>,
    config: GatewayConfig,
    clock: Arc<dyn Clock>,
}

impl GatewayEngine {
    pub fn new(network: Arc<dyn CustodyNetwork>, config: GatewayConfig) -> Self {
        Self {
            network,
            sources: HashMap::new(),
            destinations: HashMap::new(),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// An engine talking JSON-RPC to the nodes in `config.rpc`.
    pub fn from_config(config: GatewayConfig) -> Result<Self, GatewayError> {
        let provider = RpcProvider::new(&config.rpc)?;
        Ok(Self::new(Arc::new(provider), config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_source(mut self, chain: Arc<dyn SourceChain>) -> Self {
        self.sources.insert(chain.name().to_string(), chain);
        self
    }

    pub fn with_destination(mut self, chain: Arc<dyn DestinationChain>) -> Self {
        self.destinations.insert(chain.name().to_string(), chain);
        self
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn create_session(
        &self,
        params: SessionParams,
    ) -> Result<GatewaySession, GatewayError> {
        match params {
            SessionParams::Mint(params) => self.create_mint(params).await,
            SessionParams::Burn(params) => self.create_burn(params).await,
        }
    }

    /// Open a mint session: derive the gateway address and, unless
    /// disabled, register it with the network.
    ///
    /// Chains, asset support and the recipient are checked before any
    /// network call.
    pub async fn create_mint(&self, params: MintParams) -> Result<GatewaySession, GatewayError> {
        let source = self.source(&params.from)?;
        let destination = self.destination(&params.to)?;
        let asset = params.asset.as_str();
        if !source.asset_is_supported(asset) {
            return Err(unsupported(asset, &params.from));
        }
        if !destination.asset_is_supported(asset) {
            return Err(unsupported(asset, &params.to));
        }
        if !destination.validate_address(&params.recipient) {
            return Err(GatewayError::InvalidAddress {
                chain: params.to.clone(),
                address: params.recipient.clone(),
            });
        }
        let selector = Selector::for_transfer(
            asset,
            &params.from,
            &params.to,
            source.asset_is_native(asset),
            false,
        )
        .map_err(|e| GatewayError::InvalidParams(e.to_string()))?;

        let nonce = match params.nonce {
            Some(nonce) => nonce,
            None => random_nonce()?,
        };
        let phash = generate_phash(&params.payload);
        let shash = generate_shash(&selector);
        let ghash = generate_ghash(&phash, &shash, &params.recipient, &nonce);

        self.check_whitelisted(&selector, &params.to).await?;
        let shard = self.network.select_shard(&selector).await?;
        let gateway_address = source
            .derive_gateway_address(asset, &shard.public_key, &ghash)
            .await?;

        if self.config.register_gateway {
            let registration = SubmitGatewayRequest::new(
                &gateway_address,
                &selector,
                &params.payload,
                &params.recipient,
                &nonce,
                &shard.public_key,
            )
            .map_err(GatewayError::from);
            let registered = match registration {
                Ok(request) => self
                    .network
                    .submit_gateway(&request)
                    .await
                    .map_err(GatewayError::from),
                Err(e) => Err(e),
            };
            // Deposits still work unregistered; only recovery suffers.
            if let Err(e) = registered {
                tracing::warn!(gateway = %gateway_address, error = %e, "gateway registration failed");
            }
        }

        let now = self.clock.now();
        let record = SessionRecord {
            id: ghash.to_base64(),
            direction: Direction::Mint,
            asset: params.asset.clone(),
            selector,
            from_chain: params.from,
            to_chain: params.to,
            nonce,
            to: params.recipient,
            payload: params.payload,
            phash,
            shash,
            ghash,
            gpubkey: shard.public_key,
            gateway_address: Some(gateway_address),
            target_amount: params.target_amount,
            created_at: now,
            expires_at: now.saturating_add_secs(self.config.session_ttl_secs),
            transactions: Default::default(),
        };
        tracing::info!(
            session = %record.id,
            selector = %record.selector,
            gateway = ?record.gateway_address,
            "mint session created"
        );
        Ok(GatewaySession::new(
            self.context(source, Some(destination)),
            record,
        ))
    }

    /// Open a burn session for a burn already made on `params.from`.
    pub async fn create_burn(&self, params: BurnParams) -> Result<GatewaySession, GatewayError> {
        let source = self.source(&params.from)?;
        let release_chain = self.source(&params.to)?;
        let asset = params.asset.as_str();
        if !source.asset_is_supported(asset) {
            return Err(unsupported(asset, &params.from));
        }
        if !release_chain.asset_is_native(asset) {
            return Err(unsupported(asset, &params.to));
        }
        let selector = Selector::new(asset, Route::From(params.from.clone()))
            .map_err(|e| GatewayError::InvalidParams(e.to_string()))?;

        let details = match params.source {
            BurnSource::Transaction(details) => details,
            BurnSource::Nonce { nonce } => source
                .find_burn(asset, &nonce)
                .await?
                .ok_or_else(|| GatewayError::BurnNotFound(nonce.to_base64()))?,
        };
        if !release_chain.validate_address(&details.to) {
            return Err(GatewayError::InvalidAddress {
                chain: params.to.clone(),
                address: details.to.clone(),
            });
        }
        self.check_whitelisted(&selector, &params.from).await?;

        let phash = generate_phash(&[]);
        let shash = generate_shash(&selector);
        let ghash = generate_ghash(&phash, &shash, &details.to, &details.nonce);
        let nhash = generate_nhash(
            &details.nonce,
            &details.transaction.txid,
            details.transaction.txindex,
        );
        let transaction = TransactionRecord::new(
            details.transaction,
            TransactionState::Burn(BurnState::Created),
            nhash,
        );

        let now = self.clock.now();
        let record = SessionRecord {
            id: nhash.to_base64(),
            direction: Direction::Burn,
            asset: params.asset.clone(),
            selector,
            from_chain: params.from,
            to_chain: params.to,
            nonce: details.nonce,
            to: details.to,
            payload: Vec::new(),
            phash,
            shash,
            ghash,
            gpubkey: Vec::new(),
            gateway_address: None,
            target_amount: None,
            created_at: now,
            expires_at: now.saturating_add_secs(self.config.session_ttl_secs),
            transactions: [(transaction.key(), transaction)].into_iter().collect(),
        };
        tracing::info!(session = %record.id, selector = %record.selector, "burn session created");
        Ok(GatewaySession::new(self.context(source, None), record))
    }

    /// Rebuild a session from a record saved by [`GatewaySession::snapshot`].
    /// Nothing runs until the caller processes its transactions, e.g. with
    /// [`GatewaySession::resume_pending`].
    pub fn resume(&self, record: SessionRecord) -> Result<GatewaySession, GatewayError> {
        if record.selector.asset() != record.asset {
            return Err(GatewayError::InvalidParams(format!(
                "selector {} does not match asset {}",
                record.selector, record.asset
            )));
        }
        let source = self.source(&record.from_chain)?;
        let destination = match record.direction {
            Direction::Mint => Some(self.destination(&record.to_chain)?),
            Direction::Burn => None,
        };
        tracing::info!(
            session = %record.id,
            transactions = record.transactions.len(),
            "session resumed"
        );
        Ok(GatewaySession::new(self.context(source, destination), record))
    }

    async fn check_whitelisted(&self, selector: &Selector, chain: &str) -> Result<(), GatewayError> {
        if !self.config.verify_selector {
            return Ok(());
        }
        let network_config = self.network.query_config().await?;
        if network_config.supports(selector) {
            Ok(())
        } else {
            tracing::warn!(%selector, "selector is not whitelisted by the network");
            Err(unsupported(selector.asset(), chain))
        }
    }

    fn context(
        &self,
        source: Arc<dyn SourceChain>,
        destination: Option<Arc<dyn DestinationChain>>,
    ) -> SessionContext {
        SessionContext {
            network: self.network.clone(),
            source,
            destination,
            config: self.config.clone(),
            clock: self.clock.clone(),
        }
    }

    fn source(&self, name: &str) -> Result<Arc<dyn SourceChain>, GatewayError> {
        self.sources
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedChain(name.to_string()))
    }

    fn destination(&self, name: &str) -> Result<Arc<dyn DestinationChain>, GatewayError> {
        self.destinations
            .get(name)
            .cloned()
            .ok_or_else(|| GatewayError::UnsupportedChain(name.to_string()))
    }
}

fn unsupported(asset: &str, chain: &str) -> GatewayError {
    GatewayError::UnsupportedAsset {
        asset: asset.to_string(),
        chain: chain.to_string(),
    }
}
