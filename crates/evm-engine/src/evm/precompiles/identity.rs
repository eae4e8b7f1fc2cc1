//! # Identity Precompile (0x04)
//!
//! Returns the input data unchanged.

use super::Precompile;
use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

/// Identity precompile.
pub struct Identity;

impl Precompile for Identity {
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError> {
        Ok(Bytes::from_slice(input))
    }

    fn address(&self) -> Address {
        let mut addr = [0u8; 20];
        addr[19] = 4;
        Address::new(addr)
    }
}
