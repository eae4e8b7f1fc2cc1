//! # Point Evaluation Precompile (0x0A, EIP-4844)
//!
//! Verifies a KZG proof that a blob, committed to by `commitment`, evaluates
//! to `y` at point `z`. Used by rollups to prove a blob's contents against
//! its versioned hash without pulling the blob itself on-chain.
//!
//! Input is exactly 192 bytes:
//! - bytes 0-31: `versioned_hash`
//! - bytes 32-63: `z`
//! - bytes 64-95: `y`
//! - bytes 96-143: `commitment` (48 bytes)
//! - bytes 144-191: `proof` (48 bytes)
//!
//! On success the output is 64 bytes: `FIELD_ELEMENTS_PER_BLOB` (big-endian
//! u256) followed by the BLS modulus (big-endian u256). `versioned_hash`
//! must equal `0x01 ++ sha256(commitment)[1..]`; any mismatch, malformed
//! point, or failed proof is an error.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use kzg_rs::{Bytes32, Bytes48, KzgProof, KzgSettings};
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

const INPUT_LEN: usize = 192;
const VERSIONED_HASH_VERSION_KZG: u8 = 1;
const FIELD_ELEMENTS_PER_BLOB: u64 = 4096;

/// BLS12-381 scalar field modulus, big-endian.
const BLS_MODULUS: [u8; 32] = [
    0x73, 0xed, 0xa7, 0x53, 0x29, 0x9d, 0x7d, 0x48, 0x33, 0x39, 0xd8, 0x08, 0x09, 0xa1, 0xd8,
    0x05, 0x53, 0xbd, 0xa4, 0x02, 0xff, 0xfe, 0x5b, 0xfe, 0xff, 0xff, 0xff, 0xff, 0x00, 0x00,
    0x00, 0x01,
];

fn return_value() -> [u8; 64] {
    let mut out = [0u8; 64];
    out[24..32].copy_from_slice(&FIELD_ELEMENTS_PER_BLOB.to_be_bytes());
    out[32..64].copy_from_slice(&BLS_MODULUS);
    out
}

fn kzg_settings() -> Result<&'static KzgSettings, PrecompileError> {
    static SETTINGS: OnceLock<KzgSettings> = OnceLock::new();
    if let Some(s) = SETTINGS.get() {
        return Ok(s);
    }
    let loaded = KzgSettings::load_trusted_setup_file()
        .map_err(|e| PrecompileError::CryptoError(format!("failed to load trusted setup: {e}")))?;
    Ok(SETTINGS.get_or_init(|| loaded))
}

fn kzg_to_versioned_hash(commitment: &[u8]) -> [u8; 32] {
    let mut hash: [u8; 32] = Sha256::digest(commitment).into();
    hash[0] = VERSIONED_HASH_VERSION_KZG;
    hash
}

/// KZG point evaluation precompile.
pub struct PointEvaluation;

impl Precompile for PointEvaluation {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        if input.len() != INPUT_LEN {
            return Err(PrecompileError::InvalidInputLength {
                expected: INPUT_LEN,
                actual: input.len(),
            });
        }

        let versioned_hash = &input[0..32];
        let z = &input[32..64];
        let y = &input[64..96];
        let commitment = &input[96..144];
        let proof = &input[144..192];

        if kzg_to_versioned_hash(commitment) != versioned_hash {
            return Err(PrecompileError::InvalidInput(
                "versioned hash does not match commitment".to_string(),
            ));
        }

        let commitment = Bytes48::from_slice(commitment)
            .map_err(|_| PrecompileError::InvalidInput("malformed commitment".to_string()))?;
        let proof = Bytes48::from_slice(proof)
            .map_err(|_| PrecompileError::InvalidInput("malformed proof".to_string()))?;
        let z = Bytes32::from_slice(z)
            .map_err(|_| PrecompileError::InvalidInput("malformed z".to_string()))?;
        let y = Bytes32::from_slice(y)
            .map_err(|_| PrecompileError::InvalidInput("malformed y".to_string()))?;

        let settings = kzg_settings()?;
        let valid = KzgProof::verify_kzg_proof(&commitment, &z, &y, &proof, settings)
            .map_err(|e| PrecompileError::CryptoError(format!("kzg verification error: {e}")))?;

        if !valid {
            return Err(PrecompileError::CryptoError(
                "kzg proof verification failed".to_string(),
            ));
        }

        Ok(Bytes::from_vec(return_value().to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 10;
        Address::new(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_evaluation_wrong_length_errors() {
        let precompile = PointEvaluation;
        let result = precompile.execute(&[0u8; 100]);
        assert!(matches!(
            result,
            Err(PrecompileError::InvalidInputLength { .. })
        ));
    }

    #[test]
    fn test_point_evaluation_mismatched_versioned_hash_errors() {
        let precompile = PointEvaluation;
        let input = [0u8; INPUT_LEN];
        // versioned_hash of all-zero is not 0x01 ++ sha256(all-zero-commitment)[1..],
        // so this must fail before any KZG verification is attempted.
        let result = precompile.execute(&input);
        assert!(matches!(result, Err(PrecompileError::InvalidInput(_))));
    }

    #[test]
    fn test_return_value_layout() {
        let value = return_value();
        assert_eq!(value.len(), 64);
        assert_eq!(&value[32..64], &BLS_MODULUS);
    }
}
