//! Cryptographic primitives for the gateway client.
//!
//! - **Keccak-256** for every gateway hash (pHash, sHash, gHash, nHash, sighash)
//! - **SHA-256** for custody-network transaction hashes
//! - **secp256k1** signer recovery to check shard signatures

pub mod error;
pub mod gateway;
pub mod hash;
pub mod sign;

pub use error::CryptoError;
pub use gateway::{
    encode_recipient, generate_ghash, generate_nhash, generate_phash, generate_sighash,
    generate_shash, random_nonce,
};
pub use hash::{keccak256, keccak256_multi, sha256, sha256_multi};
pub use sign::{eth_address, recover_signer, verify_signer, RecoverableSignature};
