//! secp256k1 signature handling for shard signatures.
//!
//! The custody network returns 65-byte `r ‖ s ‖ v` signatures over the
//! sighash. A signature is accepted only if the key recovered from it maps
//! to the same account address as the shard public key.

use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;

use bridge_types::Hash32;

use crate::hash::keccak256;
use crate::CryptoError;

/// A signature split into its components, `v` in the 27/28 convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoverableSignature {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl RecoverableSignature {
    /// Split a 65-byte `r ‖ s ‖ v` signature, normalising it to low-s form
    /// with `v` in {27, 28}.
    pub fn from_bytes65(bytes: &[u8; 65]) -> Result<Self, CryptoError> {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[..32]);
        s.copy_from_slice(&bytes[32..64]);
        let v = match bytes[64] {
            v @ (0 | 1) => v + 27,
            v @ (27 | 28) => v,
            other => {
                return Err(CryptoError::InvalidSignature(format!(
                    "recovery byte {other} out of range"
                )))
            }
        };
        Self { r, s, v }.normalized()
    }

    pub fn to_bytes65(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }

    fn parts(&self) -> Result<(Signature, RecoveryId), CryptoError> {
        let mut rs = [0u8; 64];
        rs[..32].copy_from_slice(&self.r);
        rs[32..].copy_from_slice(&self.s);
        let signature =
            Signature::from_slice(&rs).map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
        let recovery_id = RecoveryId::from_byte(self.v.wrapping_sub(27)).ok_or_else(|| {
            CryptoError::InvalidSignature(format!("invalid recovery byte {}", self.v))
        })?;
        Ok((signature, recovery_id))
    }

    /// Flip high-s signatures to their low-s twin (and the parity with them).
    fn normalized(self) -> Result<Self, CryptoError> {
        let (signature, _) = self.parts()?;
        let Some(low) = signature.normalize_s() else {
            return Ok(self);
        };
        let bytes = low.to_bytes();
        let mut s = [0u8; 32];
        s.copy_from_slice(&bytes[32..]);
        Ok(Self {
            r: self.r,
            s,
            v: if self.v == 27 { 28 } else { 27 },
        })
    }
}

/// Account address (last 20 bytes of keccak256 of the uncompressed point)
/// for a SEC1-encoded public key.
pub fn eth_address(public_key: &[u8]) -> Result<[u8; 20], CryptoError> {
    let key = VerifyingKey::from_sec1_bytes(public_key)
        .map_err(|e| CryptoError::InvalidPublicKey(e.to_string()))?;
    Ok(address_of(&key))
}

fn address_of(key: &VerifyingKey) -> [u8; 20] {
    let point = key.to_encoded_point(false);
    let digest = keccak256(&point.as_bytes()[1..]);
    let mut address = [0u8; 20];
    address.copy_from_slice(&digest[12..]);
    address
}

/// Recover the signer's account address from a signature over `sighash`.
pub fn recover_signer(
    sighash: &Hash32,
    signature: &RecoverableSignature,
) -> Result<[u8; 20], CryptoError> {
    let (sig, recovery_id) = signature.parts()?;
    let key = VerifyingKey::recover_from_prehash(sighash.as_bytes(), &sig, recovery_id)
        .map_err(|e| CryptoError::InvalidSignature(e.to_string()))?;
    Ok(address_of(&key))
}

/// Check that `signature` over `sighash` was produced by `shard_public_key`.
pub fn verify_signer(
    sighash: &Hash32,
    signature: &RecoverableSignature,
    shard_public_key: &[u8],
) -> Result<(), CryptoError> {
    let expected = eth_address(shard_public_key)?;
    let recovered = recover_signer(sighash, signature)?;
    if expected != recovered {
        return Err(CryptoError::SignerMismatch {
            expected: format!("0x{}", hex::encode(expected)),
            recovered: format!("0x{}", hex::encode(recovered)),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use k256::ecdsa::SigningKey;

    fn shard_key(seed: u8) -> SigningKey {
        SigningKey::from_slice(&[seed; 32]).unwrap()
    }

    fn sign(key: &SigningKey, hash: &Hash32) -> RecoverableSignature {
        let (sig, recid) = key.sign_prehash_recoverable(hash.as_bytes()).unwrap();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&sig.to_bytes());
        bytes[64] = recid.to_byte();
        RecoverableSignature::from_bytes65(&bytes).unwrap()
    }

    fn compressed(key: &SigningKey) -> Vec<u8> {
        key.verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    #[test]
    fn recovers_matching_signer() {
        let key = shard_key(7);
        let hash = Hash32::new(keccak256(b"sighash"));
        let sig = sign(&key, &hash);
        assert!(sig.v == 27 || sig.v == 28);
        assert!(verify_signer(&hash, &sig, &compressed(&key)).is_ok());
    }

    #[test]
    fn rejects_other_signer() {
        let hash = Hash32::new(keccak256(b"sighash"));
        let sig = sign(&shard_key(7), &hash);
        let err = verify_signer(&hash, &sig, &compressed(&shard_key(8))).unwrap_err();
        assert!(matches!(err, CryptoError::SignerMismatch { .. }));
    }

    #[test]
    fn rejects_signature_over_other_hash() {
        let key = shard_key(7);
        let sig = sign(&key, &Hash32::new(keccak256(b"one")));
        let other = Hash32::new(keccak256(b"two"));
        assert!(verify_signer(&other, &sig, &compressed(&key)).is_err());
    }

    #[test]
    fn compressed_and_uncompressed_keys_share_an_address() {
        let key = shard_key(3);
        let uncompressed = key.verifying_key().to_encoded_point(false);
        assert_eq!(
            eth_address(&compressed(&key)).unwrap(),
            eth_address(uncompressed.as_bytes()).unwrap()
        );
    }

    #[test]
    fn high_s_is_normalised() {
        let key = shard_key(5);
        let hash = Hash32::new(keccak256(b"malleable"));
        let low = sign(&key, &hash);

        // n - s, with the recovery parity flipped, is the same signature.
        let (sig, _) = low.parts().unwrap();
        let high_s = -*sig.s();
        let high = Signature::from_scalars(sig.r().to_bytes(), high_s.to_bytes()).unwrap();
        let mut bytes = [0u8; 65];
        bytes[..64].copy_from_slice(&high.to_bytes());
        bytes[64] = if low.v == 27 { 28 } else { 27 };

        let normalised = RecoverableSignature::from_bytes65(&bytes).unwrap();
        assert_eq!(normalised, low);
    }

    #[test]
    fn rejects_bad_recovery_byte() {
        let mut bytes = [1u8; 65];
        bytes[64] = 5;
        assert!(RecoverableSignature::from_bytes65(&bytes).is_err());
    }

    #[test]
    fn rejects_invalid_public_key() {
        assert!(eth_address(&[0x02; 10]).is_err());
    }
}
