//! # BLAKE2F Precompile (0x09, EIP-152)
//!
//! Exposes the BLAKE2b compression function `F` directly, so contracts can
//! implement BLAKE2b-based protocols without re-deriving the hash from
//! scratch on-chain.
//!
//! Input is exactly 213 bytes:
//! - bytes 0-3: rounds, big-endian `u32`
//! - bytes 4-67: `h`, eight little-endian `u64` state words
//! - bytes 68-195: `m`, sixteen little-endian `u64` message words
//! - bytes 196-211: `t`, two little-endian `u64` byte offset counters
//! - byte 212: final block flag (0 or 1; anything else is an error)
//!
//! Output is the 64-byte updated state `h`, little-endian.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

const INPUT_LEN: usize = 213;

const IV: [u64; 8] = [
    0x6a09_e667_f3bc_c908,
    0xbb67_ae85_84ca_a73b,
    0x3c6e_f372_fe94_f82b,
    0xa54f_f53a_5f1d_36f1,
    0x510e_527f_ade6_82d1,
    0x9b05_688c_2b3e_6c1f,
    0x1f83_d9ab_fb41_bd6b,
    0x5be0_cd19_137e_2179,
];

const SIGMA: [[usize; 16]; 10] = [
    [0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15],
    [14, 10, 4, 8, 9, 15, 13, 6, 1, 12, 0, 2, 11, 7, 5, 3],
    [11, 8, 12, 0, 5, 2, 15, 13, 10, 14, 3, 6, 7, 1, 9, 4],
    [7, 9, 3, 1, 13, 12, 11, 14, 2, 6, 5, 10, 4, 0, 15, 8],
    [9, 0, 5, 7, 2, 4, 10, 15, 14, 1, 11, 12, 6, 8, 3, 13],
    [2, 12, 6, 10, 0, 11, 8, 3, 4, 13, 7, 5, 15, 14, 1, 9],
    [12, 5, 1, 15, 14, 13, 4, 10, 0, 7, 6, 3, 9, 2, 8, 11],
    [13, 11, 7, 14, 12, 1, 3, 9, 5, 0, 15, 4, 8, 6, 2, 10],
    [6, 15, 14, 9, 11, 3, 0, 8, 12, 2, 13, 7, 1, 4, 10, 5],
    [10, 2, 8, 4, 7, 6, 1, 5, 15, 11, 9, 14, 3, 12, 13, 0],
];

fn read_u32_be(bytes: &[u8]) -> u32 {
    u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn read_u64_le(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

#[allow(clippy::too_many_arguments)]
fn g(v: &mut [u64; 16], a: usize, b: usize, c: usize, d: usize, x: u64, y: u64) {
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(x);
    v[d] = (v[d] ^ v[a]).rotate_right(32);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(24);
    v[a] = v[a].wrapping_add(v[b]).wrapping_add(y);
    v[d] = (v[d] ^ v[a]).rotate_right(16);
    v[c] = v[c].wrapping_add(v[d]);
    v[b] = (v[b] ^ v[c]).rotate_right(63);
}

/// The BLAKE2b compression function `F`, exactly as specified by RFC 7693
/// and EIP-152: `rounds` is not fixed at 12, since the precompile allows the
/// caller to request any number of rounds.
fn compress(h: &mut [u64; 8], m: [u64; 16], t: [u64; 2], final_block: bool, rounds: usize) {
    let mut v = [0u64; 16];
    v[0..8].copy_from_slice(h);
    v[8..16].copy_from_slice(&IV);
    v[12] ^= t[0];
    v[13] ^= t[1];
    if final_block {
        v[14] = !v[14];
    }

    for i in 0..rounds {
        let s = &SIGMA[i % 10];
        g(&mut v, 0, 4, 8, 12, m[s[0]], m[s[1]]);
        g(&mut v, 1, 5, 9, 13, m[s[2]], m[s[3]]);
        g(&mut v, 2, 6, 10, 14, m[s[4]], m[s[5]]);
        g(&mut v, 3, 7, 11, 15, m[s[6]], m[s[7]]);
        g(&mut v, 0, 5, 10, 15, m[s[8]], m[s[9]]);
        g(&mut v, 1, 6, 11, 12, m[s[10]], m[s[11]]);
        g(&mut v, 2, 7, 8, 13, m[s[12]], m[s[13]]);
        g(&mut v, 3, 4, 9, 14, m[s[14]], m[s[15]]);
    }

    for i in 0..8 {
        h[i] ^= v[i] ^ v[i + 8];
    }
}

/// BLAKE2b compression function precompile.
pub struct Blake2F;

impl Precompile for Blake2F {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        if input.len() != INPUT_LEN {
            return Err(PrecompileError::InvalidInputLength {
                expected: INPUT_LEN,
                actual: input.len(),
            });
        }

        let rounds = read_u32_be(&input[0..4]);

        let mut h = [0u64; 8];
        for i in 0..8 {
            h[i] = read_u64_le(&input[4 + i * 8..12 + i * 8]);
        }

        let mut m = [0u64; 16];
        for i in 0..16 {
            m[i] = read_u64_le(&input[68 + i * 8..76 + i * 8]);
        }

        let t = [read_u64_le(&input[196..204]), read_u64_le(&input[204..212])];

        let final_block = match input[212] {
            0 => false,
            1 => true,
            _ => {
                return Err(PrecompileError::InvalidInput(
                    "final block flag must be 0 or 1".to_string(),
                ))
            }
        };

        compress(&mut h, m, t, final_block, rounds as usize);

        let mut output = [0u8; 64];
        for (i, word) in h.iter().enumerate() {
            output[i * 8..i * 8 + 8].copy_from_slice(&word.to_le_bytes());
        }
        Ok(Bytes::from_vec(output.to_vec()))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 9;
        Address::new(addr)
    }
}
