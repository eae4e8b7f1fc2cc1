//! # ModExp Precompile (0x05, EIP-198)
//!
//! Arbitrary-precision modular exponentiation.
//!
//! Input format:
//! - bytes 0-31: length of base (`Bsize`)
//! - bytes 32-63: length of exponent (`Esize`)
//! - bytes 64-95: length of modulus (`Msize`)
//! - bytes 96..96+Bsize: base
//! - next Esize bytes: exponent
//! - next Msize bytes: modulus

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes, U256};
use crate::errors::PrecompileError;
use num_bigint::BigUint;

/// ModExp precompile.
pub struct ModExp;

/// Converts a length word from precompile input to a `usize`. `U256::as_usize`
/// aborts the process for anything past `usize::MAX`, which a crafted
/// length field can trivially request; saturating keeps this total, since
/// any saturated value is already well past the 1024-byte cap checked right
/// after.
fn length_to_usize(value: U256) -> usize {
    if value > U256::from(usize::MAX) {
        usize::MAX
    } else {
        value.as_usize()
    }
}

impl Precompile for ModExp {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let base_len = length_to_usize(parse_u256(input, 0));
        let exp_len = length_to_usize(parse_u256(input, 32));
        let mod_len = length_to_usize(parse_u256(input, 64));

        if base_len > 1024 || exp_len > 1024 || mod_len > 1024 {
            return Err(PrecompileError::InvalidInput(
                "lengths too large".to_string(),
            ));
        }

        if mod_len == 0 {
            return Ok(Bytes::new());
        }

        let base = parse_big_uint(input, 96, base_len);
        let exp = parse_big_uint(input, 96 + base_len, exp_len);
        let modulus = parse_big_uint(input, 96 + base_len + exp_len, mod_len);

        Ok(Bytes::from_vec(mod_exp(&base, &exp, &modulus, mod_len)))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 5;
        Address::new(addr)
    }
}

/// Parse a big-endian U256 from `input` at `offset`, treating bytes past
/// the end of `input` as zero.
fn parse_u256(input: &[u8], offset: usize) -> U256 {
    let mut bytes = [0u8; 32];
    let end = (offset + 32).min(input.len());
    let start = offset.min(input.len());
    let len = end.saturating_sub(start);
    if len > 0 && start < input.len() {
        bytes[32 - len..].copy_from_slice(&input[start..end]);
    }
    U256::from_big_endian(&bytes)
}

/// Parse an arbitrary-length big-endian integer from `input`, zero-padding
/// for any portion past the end of `input`.
fn parse_big_uint(input: &[u8], offset: usize, len: usize) -> Vec<u8> {
    let mut result = vec![0u8; len];
    let end = (offset + len).min(input.len());
    let start = offset.min(input.len());
    let available = end.saturating_sub(start);
    if available > 0 && start < input.len() {
        result[len - available..].copy_from_slice(&input[start..end]);
    }
    result
}

/// Computes `base^exp mod modulus`, right-aligned into a buffer of
/// `result_len` bytes. Operands run up to the full 1024-byte range this
/// precompile declares support for (e.g. RSA-2048 verification), so the
/// exponentiation goes through `num_bigint` rather than the fixed-width
/// `U256`/`U512` types the rest of this engine uses.
fn mod_exp(base: &[u8], exp: &[u8], modulus: &[u8], result_len: usize) -> Vec<u8> {
    let modulus = BigUint::from_bytes_be(modulus);
    if modulus == BigUint::from(0u32) {
        return vec![0u8; result_len];
    }

    let base = BigUint::from_bytes_be(base);
    let exp = BigUint::from_bytes_be(exp);
    let result = base.modpow(&exp, &modulus);

    let result_bytes = result.to_bytes_be();
    let mut output = vec![0u8; result_len];
    let copy_len = result_bytes.len().min(result_len);
    let dest_start = result_len - copy_len;
    let src_start = result_bytes.len() - copy_len;
    output[dest_start..].copy_from_slice(&result_bytes[src_start..]);
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_modexp_simple() {
        let precompile = ModExp;

        // base=2, exp=3, mod=5 -> 2^3 % 5 = 3
        let mut input = vec![0u8; 96 + 3];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input[96] = 2;
        input[97] = 3;
        input[98] = 5;

        let result = precompile.execute(&input).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.as_slice()[0], 3);
    }

    #[test]
    fn test_modexp_zero_exponent() {
        let precompile = ModExp;

        // base=7, exp=0, mod=13 -> 1
        let mut input = vec![0u8; 96 + 3];
        input[31] = 1;
        input[63] = 1;
        input[95] = 1;
        input[96] = 7;
        input[97] = 0;
        input[98] = 13;

        let result = precompile.execute(&input).unwrap();
        assert_eq!(result.as_slice()[0], 1);
    }

    #[test]
    fn test_modexp_zero_modulus_len() {
        let precompile = ModExp;

        let mut input = vec![0u8; 96 + 2];
        input[31] = 1;
        input[63] = 1;
        input[95] = 0;

        let result = precompile.execute(&input).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_modexp_operand_wider_than_32_bytes() {
        let precompile = ModExp;

        // base=3, exp=2, modulus = a 40-byte number -> 9, computed with the
        // operands well past the old 32-byte U256 fast path.
        let base_len = 1usize;
        let exp_len = 1usize;
        let mod_len = 40usize;
        let mut input = vec![0u8; 96 + base_len + exp_len + mod_len];
        input[31] = base_len as u8;
        input[63] = exp_len as u8;
        input[95] = mod_len as u8;
        input[96] = 3; // base
        input[97] = 2; // exponent
        input[96 + base_len + exp_len + mod_len - 1] = 200; // modulus, low byte = 200 (> 9)
        input[96 + base_len + exp_len] = 1; // modulus' top byte, so it's genuinely 40 bytes wide

        let result = precompile.execute(&input).unwrap();
        assert_eq!(result.len(), mod_len);
        assert_eq!(result.as_slice()[mod_len - 1], 9);
        assert!(result.as_slice()[..mod_len - 1].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_modexp_lengths_too_large() {
        let precompile = ModExp;
        let mut input = vec![0u8; 96];
        input[31] = 255;
        input[27] = 0xFF; // pushes base_len well past 1024
        let result = precompile.execute(&input);
        assert!(result.is_err());
    }
}
