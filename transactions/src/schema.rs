//! Pack types of the payloads exchanged with the custody network.

use bridge_pack::PackType;

/// Transaction format version sent with every request.
pub const TX_VERSION: &str = "1";

/// Input of every cross-chain (mint or burn) transaction.
pub fn cross_chain_input_type() -> PackType {
    PackType::structure([
        ("txid", PackType::Bytes),
        ("txindex", PackType::U32),
        ("amount", PackType::U256),
        ("payload", PackType::Bytes),
        ("phash", PackType::Bytes32),
        ("to", PackType::Str),
        ("nonce", PackType::Bytes32),
        ("nhash", PackType::Bytes32),
        ("gpubkey", PackType::Bytes),
        ("ghash", PackType::Bytes32),
    ])
}

/// Input of `ren_submitGateway`.
pub fn submit_gateway_type() -> PackType {
    PackType::structure([
        ("payload", PackType::Bytes),
        ("phash", PackType::Bytes32),
        ("to", PackType::Str),
        ("nonce", PackType::Bytes32),
        ("nhash", PackType::Bytes32),
        ("gpubkey", PackType::Bytes),
        ("ghash", PackType::Bytes32),
    ])
}

/// Output the network attaches to an executed cross-chain transaction.
pub fn cross_chain_output_type() -> PackType {
    PackType::structure([
        ("amount", PackType::U256),
        ("hash", PackType::Bytes32),
        ("sighash", PackType::Bytes32),
        ("sig", PackType::Bytes65),
        ("txid", PackType::Bytes),
        ("txindex", PackType::U32),
        ("revert", PackType::Str),
    ])
}

/// Minimal block-state shape needed to pick a shard for `asset`.
pub fn shard_state_type(asset: &str) -> PackType {
    PackType::structure([(
        asset.to_string(),
        PackType::structure([(
            "shards",
            PackType::list(PackType::structure([("pubKey", PackType::Bytes)])),
        )]),
    )])
}
