//! # SHA256 Precompile (0x02)
//!
//! Computes the SHA-256 hash of the input.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use sha2::{Digest, Sha256};

/// SHA256 precompile.
pub struct Sha256Precompile;

impl Precompile for Sha256Precompile {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let hash = Sha256::digest(input);
        Ok(Bytes::from_slice(&hash))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 2;
        Address::new(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        let precompile = Sha256Precompile;
        let result = precompile.execute(&[]).unwrap();

        let expected = [
            0xe3, 0xb0, 0xc4, 0x42, 0x98, 0xfc, 0x1c, 0x14, 0x9a, 0xfb, 0xf4, 0xc8, 0x99, 0x6f,
            0xb9, 0x24, 0x27, 0xae, 0x41, 0xe4, 0x64, 0x9b, 0x93, 0x4c, 0xa4, 0x95, 0x99, 0x1b,
            0x78, 0x52, 0xb8, 0x55,
        ];
        assert_eq!(result.as_slice(), &expected);
    }

    #[test]
    fn test_sha256_hello() {
        let precompile = Sha256Precompile;
        let result = precompile.execute(b"hello").unwrap();
        assert_eq!(result.len(), 32);
    }
}
