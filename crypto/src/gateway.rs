//! Gateway hash derivations.
//!
//! Every transfer is bound to a handful of Keccak-256 commitments:
//!
//! | hash    | preimage                                             |
//! |---------|------------------------------------------------------|
//! | pHash   | destination payload                                  |
//! | sHash   | selector in contract form (`ASSET/toCHAIN`)          |
//! | gHash   | pHash ‖ sHash ‖ recipient ‖ nonce                    |
//! | nHash   | nonce ‖ txid ‖ txindex (u32, big-endian)             |
//! | sighash | pHash ‖ amount (u256) ‖ sHash ‖ recipient (32) ‖ nHash |
//!
//! The gateway address a user deposits into is derived from the shard key
//! and gHash, so gHash must be reproducible from the session record alone.

use bridge_types::{Amount, Hash32, Selector};

use crate::hash::{keccak256, keccak256_multi};
use crate::CryptoError;

pub fn generate_phash(payload: &[u8]) -> Hash32 {
    Hash32::new(keccak256(payload))
}

pub fn generate_shash(selector: &Selector) -> Hash32 {
    Hash32::new(keccak256(selector.to_contract_form().as_bytes()))
}

/// Raw recipient bytes: hex addresses are decoded, anything else is taken
/// as UTF-8.
pub fn recipient_bytes(to: &str) -> Vec<u8> {
    let stripped = to.strip_prefix("0x").unwrap_or(to);
    match hex::decode(stripped) {
        Ok(bytes) if !stripped.is_empty() => bytes,
        _ => to.as_bytes().to_vec(),
    }
}

pub fn generate_ghash(phash: &Hash32, shash: &Hash32, to: &str, nonce: &Hash32) -> Hash32 {
    let to = recipient_bytes(to);
    Hash32::new(keccak256_multi(&[
        phash.as_bytes(),
        shash.as_bytes(),
        &to,
        nonce.as_bytes(),
    ]))
}

pub fn generate_nhash(nonce: &Hash32, txid: &[u8], txindex: u32) -> Hash32 {
    Hash32::new(keccak256_multi(&[
        nonce.as_bytes(),
        txid,
        &txindex.to_be_bytes(),
    ]))
}

/// ABI-style 32-byte word for an account-chain recipient.
///
/// Only 20-byte hex addresses have a word form; other recipients return
/// `None` and the sighash cannot be recomputed locally.
pub fn encode_recipient(to: &str) -> Option<[u8; 32]> {
    let stripped = to.strip_prefix("0x").unwrap_or(to);
    let bytes = hex::decode(stripped).ok()?;
    if bytes.len() != 20 {
        return None;
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&bytes);
    Some(word)
}

pub fn generate_sighash(
    phash: &Hash32,
    amount: &Amount,
    shash: &Hash32,
    to: &str,
    nhash: &Hash32,
) -> Option<Hash32> {
    let to = encode_recipient(to)?;
    Some(Hash32::new(keccak256_multi(&[
        phash.as_bytes(),
        &amount.to_be_bytes(),
        shash.as_bytes(),
        &to,
        nhash.as_bytes(),
    ])))
}

/// A fresh random 32-byte nonce from the OS.
pub fn random_nonce() -> Result<Hash32, CryptoError> {
    let mut bytes = [0u8; 32];
    getrandom::getrandom(&mut bytes).map_err(|e| CryptoError::Randomness(e.to_string()))?;
    Ok(Hash32::new(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    const RECIPIENT: &str = "0x797522Fb74d42bB9fbF6b76dEa24D01A538d5D66";

    fn selector() -> Selector {
        "BTC/toEthereum".parse().unwrap()
    }

    #[test]
    fn shash_collapses_from_to_selectors() {
        let from_to: Selector = "BTC/fromSolanaToEthereum".parse().unwrap();
        assert_eq!(generate_shash(&from_to), generate_shash(&selector()));
    }

    #[test]
    fn shash_matches_keccak_of_selector() {
        assert_eq!(
            generate_shash(&selector()).as_bytes(),
            &keccak256(b"BTC/toEthereum")
        );
    }

    #[test]
    fn ghash_is_nonce_sensitive() {
        let phash = generate_phash(&[]);
        let shash = generate_shash(&selector());
        let a = generate_ghash(&phash, &shash, RECIPIENT, &Hash32::new([1u8; 32]));
        let b = generate_ghash(&phash, &shash, RECIPIENT, &Hash32::new([2u8; 32]));
        assert_ne!(a, b);
    }

    #[test]
    fn ghash_decodes_hex_recipients() {
        let phash = generate_phash(&[]);
        let shash = generate_shash(&selector());
        let nonce = Hash32::ZERO;
        let with_prefix = generate_ghash(&phash, &shash, RECIPIENT, &nonce);
        let without = generate_ghash(&phash, &shash, &RECIPIENT[2..], &nonce);
        assert_eq!(with_prefix, without);
    }

    #[test]
    fn nhash_layout() {
        let nonce = Hash32::new([9u8; 32]);
        let txid = [0xaau8; 32];
        let expected = keccak256(&[&nonce.as_bytes()[..], &txid, &[0, 0, 0, 3]].concat());
        assert_eq!(generate_nhash(&nonce, &txid, 3).as_bytes(), &expected);
        assert_ne!(generate_nhash(&nonce, &txid, 3), generate_nhash(&nonce, &txid, 4));
    }

    #[test]
    fn recipient_word_is_left_padded() {
        let word = encode_recipient(RECIPIENT).unwrap();
        assert_eq!(&word[..12], &[0u8; 12]);
        assert_eq!(word[12], 0x79);
        assert!(encode_recipient("bc1qnotanaddress").is_none());
        assert!(encode_recipient("0x1234").is_none());
    }

    #[test]
    fn sighash_requires_account_recipient() {
        let h = Hash32::ZERO;
        let amount = Amount::from_u128(1);
        assert!(generate_sighash(&h, &amount, &h, RECIPIENT, &h).is_some());
        assert!(generate_sighash(&h, &amount, &h, "miner", &h).is_none());
    }

    #[test]
    fn random_nonces_differ() {
        assert_ne!(random_nonce().unwrap(), random_nonce().unwrap());
    }
}
