//! # BN254 (alt_bn128) Precompiles (0x06-0x08, EIP-196/EIP-197)
//!
//! ADD, MUL, and PAIRING over the BN254 curve, via `substrate-bn`.
//!
//! Point encoding: each `G1` point is two 32-byte big-endian field elements
//! `(x, y)`. Each `G2` point is two `Fq2` coordinates, each itself two
//! 32-byte elements ordered `(imaginary, real)` per EIP-197. Invalid curve
//! points (coordinates not on the curve, or not in the field) are a
//! `PrecompileError`, not a silently-zeroed result.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;
use bn::{AffineG1, AffineG2, Fq, Fq2, Fr, Group, Gt, G1, G2};

const FIELD_ELEMENT_LEN: usize = 32;
const G1_LEN: usize = FIELD_ELEMENT_LEN * 2;
const G2_LEN: usize = FIELD_ELEMENT_LEN * 4;
const PAIR_ELEMENT_LEN: usize = G1_LEN + G2_LEN;

fn invalid_point() -> PrecompileError {
    PrecompileError::CryptoError("invalid curve point".to_string())
}

fn read_fq(input: &[u8], offset: usize) -> Result<Fq, PrecompileError> {
    let mut buf = [0u8; FIELD_ELEMENT_LEN];
    let available = input.len().saturating_sub(offset).min(FIELD_ELEMENT_LEN);
    if available > 0 {
        buf[..available].copy_from_slice(&input[offset..offset + available]);
    }
    Fq::from_slice(&buf).map_err(|_| invalid_point())
}

fn read_g1(input: &[u8], offset: usize) -> Result<G1, PrecompileError> {
    let x = read_fq(input, offset)?;
    let y = read_fq(input, offset + FIELD_ELEMENT_LEN)?;

    if x.is_zero() && y.is_zero() {
        Ok(G1::zero())
    } else {
        AffineG1::new(x, y).map(Into::into).map_err(|_| invalid_point())
    }
}

fn read_g2(input: &[u8], offset: usize) -> Result<G2, PrecompileError> {
    let ax = read_fq(input, offset)?;
    let ay = read_fq(input, offset + FIELD_ELEMENT_LEN)?;
    let bx = read_fq(input, offset + FIELD_ELEMENT_LEN * 2)?;
    let by = read_fq(input, offset + FIELD_ELEMENT_LEN * 3)?;

    let x = Fq2::new(ay, ax);
    let y = Fq2::new(by, bx);

    if x.is_zero() && y.is_zero() {
        Ok(G2::zero())
    } else {
        AffineG2::new(x, y).map(Into::into).map_err(|_| invalid_point())
    }
}

fn encode_g1(point: G1) -> [u8; G1_LEN] {
    let mut output = [0u8; G1_LEN];
    if let Some(affine) = AffineG1::from_jacobian(point) {
        affine.x().to_big_endian(&mut output[0..32]).expect("32-byte buffer");
        affine.y().to_big_endian(&mut output[32..64]).expect("32-byte buffer");
    }
    output
}

/// BN254 point addition (0x06).
pub struct Bn256Add;

impl Precompile for Bn256Add {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let p1 = read_g1(input, 0)?;
        let p2 = read_g1(input, G1_LEN)?;
        Ok(Bytes::from_vec(encode_g1(p1 + p2).to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 6;
        Address::new(addr)
    }
}

/// BN254 scalar multiplication (0x07).
pub struct Bn256Mul;

impl Precompile for Bn256Mul {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        let p = read_g1(input, 0)?;

        let mut scalar_buf = [0u8; FIELD_ELEMENT_LEN];
        let available = input.len().saturating_sub(G1_LEN).min(FIELD_ELEMENT_LEN);
        if available > 0 {
            scalar_buf[..available].copy_from_slice(&input[G1_LEN..G1_LEN + available]);
        }
        let scalar = Fr::from_slice(&scalar_buf).map_err(|_| invalid_point())?;

        Ok(Bytes::from_vec(encode_g1(p * scalar).to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 7;
        Address::new(addr)
    }
}

/// BN254 optimal-ate pairing check (0x08).
///
/// Input must be a multiple of 192 bytes (one (G1, G2) pair each). Output is
/// 32 bytes: all-zero except the last byte, which is 1 if the product of
/// pairings equals the identity in `Gt`, 0 otherwise. An empty input is
/// trivially true.
pub struct Bn256Pairing;

impl Precompile for Bn256Pairing {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        if input.len() % PAIR_ELEMENT_LEN != 0 {
            return Err(PrecompileError::InvalidInputLength {
                expected: PAIR_ELEMENT_LEN,
                actual: input.len(),
            });
        }

        let pair_count = input.len() / PAIR_ELEMENT_LEN;
        let mut acc = Gt::one();
        for i in 0..pair_count {
            let offset = i * PAIR_ELEMENT_LEN;
            let g1 = read_g1(input, offset)?;
            let g2 = read_g2(input, offset + G1_LEN)?;
            acc = acc * bn::pairing(g1, g2);
        }

        let mut output = [0u8; 32];
        if acc == Gt::one() {
            output[31] = 1;
        }
        Ok(Bytes::from_vec(output.to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 8;
        Address::new(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bn256_add_zero_points() {
        let precompile = Bn256Add;
        let input = [0u8; G1_LEN * 2];
        let result = precompile.execute(&input).unwrap();
        assert_eq!(result.as_slice(), &[0u8; G1_LEN]);
    }

    #[test]
    fn test_bn256_add_invalid_point_errors() {
        let precompile = Bn256Add;
        let mut input = [0u8; G1_LEN * 2];
        // x = 1, y = 0 is not on the curve y^2 = x^3 + 3.
        input[31] = 1;
        let result = precompile.execute(&input);
        assert!(result.is_err());
    }

    #[test]
    fn test_bn256_mul_zero_scalar() {
        let precompile = Bn256Mul;
        let input = [0u8; G1_LEN + FIELD_ELEMENT_LEN];
        let result = precompile.execute(&input).unwrap();
        assert_eq!(result.as_slice(), &[0u8; G1_LEN]);
    }

    #[test]
    fn test_bn256_pairing_empty_input_is_true() {
        let precompile = Bn256Pairing;
        let result = precompile.execute(&[]).unwrap();
        let mut expected = [0u8; 32];
        expected[31] = 1;
        assert_eq!(result.as_slice(), &expected);
    }

    #[test]
    fn test_bn256_pairing_wrong_length_errors() {
        let precompile = Bn256Pairing;
        let result = precompile.execute(&[0u8; 100]);
        assert!(matches!(
            result,
            Err(PrecompileError::InvalidInputLength { .. })
        ));
    }
}
