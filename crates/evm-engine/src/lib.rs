//! # evm-engine
//!
//! A Cancun-revision EVM bytecode execution engine: interpreter, journaled
//! account/storage state, and the ten standard precompiles. Built around a
//! hexagonal layout -- a pure `domain`, the `ports` it is driven through and
//! drives out to, and the `adapters` that implement the outbound ports.
//!
//! ## Layout
//!
//! - `domain` -- value objects, entities (`ExecutionContext`, `BlockContext`,
//!   `ExecutionResult`, `VmConfig`), and pure services (address derivation,
//!   keccak256).
//! - `ports` -- `inbound::SmartContractApi` (what callers drive); `outbound`
//!   traits the engine drives (`StateAccess`, `SignatureVerifier`,
//!   `BlockHashOracle`).
//! - `adapters` -- concrete `StateAccess` implementations: an in-memory store
//!   for tests and embeddings, and an optional RocksDB-backed durable store.
//! - `evm` -- the interpreter itself: stack, memory, opcode table, transient
//!   storage (EIP-1153), and precompiles.
//! - `account_db` / `journal` / `state` -- the journaled overlay that backs
//!   every account, code, and storage read/write, and the `State` object
//!   threaded through a whole call tree.
//! - `engine` -- `Engine`, the `SmartContractApi` implementation that wires
//!   `State` and `Interpreter` together for one top-level transaction at a
//!   time.
//!
//! ## Execution limits
//!
//! | Limit | Default | Purpose |
//! |-------|---------|---------|
//! | `max_call_depth` | 1024 | Prevent unbounded recursion |
//! | `max_code_size` | 24 KB (EIP-170) | Limit deployed contract size |
//! | `max_init_code_size` | 48 KB (EIP-3860) | Limit deployment init code |
//! | `max_stack_size` | 1024 | EVM stack limit |
//! | `max_memory_size` | 16 MB | Memory expansion limit |
//! | `max_execution_steps` | 10,000,000 | Non-terminating loop backstop |
//!
//! This engine does not meter gas; `max_execution_steps` is the only halting
//! backstop for a pathological loop. See `state::State::step`.
//!
//! ## Usage
//!
//! ```ignore
//! use evm_engine::prelude::*;
//! use std::sync::Arc;
//!
//! let engine = Engine::new(Arc::new(InMemoryState::new()));
//! let request = ExecuteBytecodeRequest {
//!     sender: Address::ZERO,
//!     to: None,
//!     value: U256::zero(),
//!     data: Bytes::from_vec(init_code),
//!     code: Bytes::new(),
//! };
//! let result = engine.execute_bytecode(request, &BlockContext::default())?;
//! # Ok::<(), VmError>(())
//! ```

// Crate-level lints
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]

// =============================================================================
// MODULES
// =============================================================================

pub mod account_db;
pub mod adapters;
pub mod domain;
pub mod engine;
pub mod errors;
pub mod evm;
pub mod journal;
pub mod ports;
pub mod state;

// =============================================================================
// PRELUDE
// =============================================================================

/// Convenient re-exports for common usage.
pub mod prelude {
    // Domain entities
    pub use crate::domain::entities::{
        AccountState, BlockContext, ExecutionContext, ExecutionResult, EvmVersion, Log,
        StateChange, VmConfig,
    };

    // Value objects
    pub use crate::domain::value_objects::{
        Address, Bytes, EcdsaSignature, Hash, StorageKey, StorageValue, U256,
    };

    // Domain services
    pub use crate::domain::services::{
        compute_contract_address, compute_contract_address_create2, keccak256, precompiles,
    };

    // Ports
    pub use crate::ports::inbound::{ExecuteBytecodeRequest, SmartContractApi};
    pub use crate::ports::outbound::{
        BlockHashOracle, SignatureVerifier, StateAccess, TransientStorage as TransientStorageApi,
    };

    // Errors
    pub use crate::errors::{PrecompileError, StateError, VmError};

    // EVM components
    pub use crate::evm::{memory::Memory, opcodes::Opcode, stack::Stack, Interpreter};

    // State
    pub use crate::state::State;

    // Adapters
    pub use crate::adapters::InMemoryState;

    // Engine
    pub use crate::engine::Engine;
}

// =============================================================================
// CRATE INFO
// =============================================================================

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// The hardfork revision this engine implements.
pub const EVM_REVISION: &str = "cancun";

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prelude_exports() {
        use prelude::*;
        let _ = VmConfig::default();
        let _ = Address::ZERO;
    }
}
