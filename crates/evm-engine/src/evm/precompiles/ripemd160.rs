//! # RIPEMD160 Precompile (0x03)
//!
//! Computes the RIPEMD-160 hash of the input, left-padded to 32 bytes (the
//! 20-byte digest occupies the low-order bytes of the word).

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use ripemd::{Digest, Ripemd160};

/// RIPEMD160 precompile.
pub struct Ripemd160Precompile;

impl Precompile for Ripemd160Precompile {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let digest = Ripemd160::digest(input);
        let mut output = [0u8; 32];
        output[12..].copy_from_slice(&digest);
        Ok(Bytes::from_vec(output.to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 3;
        Address::new(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ripemd160_empty() {
        let precompile = Ripemd160Precompile;
        let result = precompile.execute(&[]).unwrap();
        assert_eq!(result.len(), 32);
        // Digest occupies the last 20 bytes; first 12 are zero-padding.
        assert_eq!(&result.as_slice()[0..12], &[0u8; 12]);
    }

    #[test]
    fn test_ripemd160_deterministic() {
        let precompile = Ripemd160Precompile;
        let a = precompile.execute(b"hello").unwrap();
        let b = precompile.execute(b"hello").unwrap();
        assert_eq!(a.as_slice(), b.as_slice());
    }

    #[test]
    fn test_ripemd160_different_inputs_differ() {
        let precompile = Ripemd160Precompile;
        let a = precompile.execute(b"hello").unwrap();
        let b = precompile.execute(b"world").unwrap();
        assert_ne!(a.as_slice(), b.as_slice());
    }
}
