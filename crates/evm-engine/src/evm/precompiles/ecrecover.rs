//! # Ecrecover Precompile (0x01)
//!
//! Recovers the signer address from an ECDSA signature over secp256k1.
//!
//! Input format (128 bytes, zero-padded on the right if shorter):
//! - bytes 0-31: message hash
//! - bytes 32-63: v (recovery id, 27 or 28 -- anything else is invalid)
//! - bytes 64-95: r
//! - bytes 96-127: s
//!
//! Output is the 32-byte left-zero-padded recovered address, or 32 zero
//! bytes if the signature does not recover. A zero-length output is never
//! produced -- callers see either the padded address or all-zero bytes.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use k256::ecdsa::{RecoveryId, Signature, VerifyingKey};
use sha3::{Digest, Keccak256};

/// Ecrecover precompile.
pub struct Ecrecover;

impl Precompile for Ecrecover {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let mut padded = [0u8; 128];
        let len = input.len().min(128);
        padded[..len].copy_from_slice(&input[..len]);

        let hash = &padded[0..32];
        let v = padded[63];
        let r = &padded[64..96];
        let s = &padded[96..128];

        if v != 27 && v != 28 {
            return Ok(zero_output());
        }

        if r.iter().all(|&b| b == 0) || s.iter().all(|&b| b == 0) {
            return Ok(zero_output());
        }

        let Ok(signature) = Signature::from_scalars(
            <[u8; 32]>::try_from(r).expect("slice is 32 bytes"),
            <[u8; 32]>::try_from(s).expect("slice is 32 bytes"),
        ) else {
            return Ok(zero_output());
        };

        let recovery_id = RecoveryId::from_byte(v - 27).expect("0 or 1 is always valid");

        let Ok(verifying_key) = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
        else {
            return Ok(zero_output());
        };

        let encoded = verifying_key.to_encoded_point(false);
        let pubkey_bytes = &encoded.as_bytes()[1..]; // drop the 0x04 prefix
        let digest = Keccak256::digest(pubkey_bytes);

        let mut output = [0u8; 32];
        output[12..].copy_from_slice(&digest[12..32]);
        Ok(Bytes::from_vec(output.to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 1;
        Address::new(addr)
    }
}

fn zero_output() -> Bytes {
    Bytes::from_vec(vec![0u8; 32])
}
