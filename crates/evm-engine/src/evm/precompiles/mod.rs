//! # Precompiled Contracts
//!
//! Implementations of the ten standard Ethereum precompiled contracts at
//! addresses 0x01..0x0A. Each is a pure function `bytes -> Result<bytes,
//! PrecompileError>`; calls to these addresses bypass the interpreter
//! entirely (see `evm::interpreter`), so none of these take a gas limit --
//! gas is out of scope for this engine.

pub mod blake2f;
pub mod bn256;
pub mod ecrecover;
pub mod identity;
pub mod modexp;
pub mod point_evaluation;
pub mod ripemd160;
pub mod sha256;

use crate::domain::value_objects::{Address, Bytes};
use crate::errors::PrecompileError;

/// A precompiled contract.
pub trait Precompile: Send + Sync {
    /// Executes the precompile against `input`, returning its output bytes.
    fn execute(&self, input: &[u8]) -> Result<Bytes, PrecompileError>;

    /// The address this precompile is installed at.
    fn address(&self) -> Address;
}

/// Dispatches to the precompile at `address`, or `None` if `address` is not
/// one of the ten reserved precompile addresses.
#[must_use]
pub fn execute_precompile(address: Address, input: &[u8]) -> Option<Result<Bytes, PrecompileError>> {
    if !address.is_precompile() {
        return None;
    }

    let precompile_num = address.as_bytes()[19];

    let result = match precompile_num {
        1 => ecrecover::Ecrecover.execute(input),
        2 => sha256::Sha256Precompile.execute(input),
        3 => ripemd160::Ripemd160Precompile.execute(input),
        4 => identity::Identity.execute(input),
        5 => modexp::ModExp.execute(input),
        6 => bn256::Bn256Add.execute(input),
        7 => bn256::Bn256Mul.execute(input),
        8 => bn256::Bn256Pairing.execute(input),
        9 => blake2f::Blake2F.execute(input),
        10 => point_evaluation::PointEvaluation.execute(input),
        _ => return None,
    };

    Some(result)
}

// =============================================================================
// TESTS
// =============================================================================
