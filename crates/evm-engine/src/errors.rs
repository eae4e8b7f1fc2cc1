//! # Error Types
//!
//! All error types for smart contract execution.

use crate::domain::value_objects::{Address, Bytes, U256};
use thiserror::Error;

// =============================================================================
// VM ERRORS
// =============================================================================

/// Errors that halt the current call frame.
///
/// Every variant here corresponds to a distinct halting condition. Some are
/// recoverable at the caller of a CALL-family opcode (the caller discards
/// the child checkpoint and pushes 0); others surface all the way to the
/// transaction result when they occur in the root frame.
#[derive(Debug, Error, Clone)]
pub enum VmError {
    /// Stack overflow (>1024 items).
    #[error("stack overflow")]
    StackOverflow,

    /// Stack underflow (pop from empty stack).
    #[error("stack underflow")]
    StackUnderflow,

    /// Unknown opcode, or the explicit `INVALID` (0xFE) instruction.
    #[error("invalid instruction: 0x{0:02X}")]
    InvalidInstruction(u8),

    /// JUMP/JUMPI target is not a `JUMPDEST` or falls inside a PUSH immediate.
    #[error("invalid jump destination: {0}")]
    InvalidJumpDestination(usize),

    /// Call depth exceeded 1024. Recoverable at the calling opcode.
    #[error("call depth exceeded: {depth} > {max}")]
    DepthExceeded { depth: u16, max: u16 },

    /// Deployed code exceeds 24576 bytes. Recoverable (CREATE only).
    #[error("code size exceeded: {size} > {max} bytes")]
    CodeTooLarge { size: usize, max: usize },

    /// Init code size exceeded limit (EIP-3860).
    #[error("init code size exceeded: {size} > {max} bytes")]
    InitCodeSizeExceeded { size: usize, max: usize },

    /// SSTORE/TSTORE/LOG*/CREATE*/SELFDESTRUCT inside a static context.
    #[error("state-mutating operation in static context")]
    StaticViolation,

    /// CALL/CALLCODE passing nonzero value into a static context.
    #[error("value transfer attempted in static context")]
    WriteProtection,

    /// Insufficient balance for a value transfer. Recoverable at the caller.
    #[error("insufficient balance: required {required}, available {available}")]
    InsufficientBalance { required: U256, available: U256 },

    /// State access error.
    #[error("state error: {0}")]
    StateError(#[from] StateError),

    /// Explicit `REVERT`. Not an error per se: halts with the raw memory
    /// bytes the contract chose to return, and the caller may treat it as a
    /// recoverable failed subcall.
    #[error("revert")]
    Revert(Bytes),

    /// Memory access out of bounds (only reachable if a caller bypasses the
    /// normal grow-on-touch path; the interpreter itself never triggers this).
    #[error("memory access out of bounds: offset {offset}, size {size}")]
    MemoryOutOfBounds { offset: usize, size: usize },

    /// Memory expansion would exceed the implementation memory cap.
    #[error("memory limit exceeded: {requested} > {max} bytes")]
    MemoryLimitExceeded { requested: usize, max: usize },

    /// RETURNDATACOPY read past the end of the current return-data buffer.
    #[error("return data out of bounds: offset {offset}, size {size}, available {available}")]
    OutOfBoundsRead {
        offset: usize,
        size: usize,
        available: usize,
    },

    /// CREATE/CREATE2 target address already has a nonzero nonce or code.
    #[error("contract creation collision at address: {0:?}")]
    CreationCollision(Address),

    /// Initcode's RETURN payload begins with 0xEF (EIP-3541).
    #[error("deployed code starts with 0xEF byte (reserved for EOF)")]
    InvalidCodeFirstByte,

    /// Implementation-level infinite-loop guard (distinct from gas, which
    /// this engine does not meter).
    #[error("execution step limit exceeded: {steps} > {max}")]
    Timeout { steps: u64, max: u64 },

    /// Internal error (should not happen in production).
    #[error("internal error: {0}")]
    Internal(String),
}

impl VmError {
    /// Returns true if this error is recoverable at a CALL-family caller
    /// (the caller discards the child checkpoint, pushes 0, and continues).
    #[must_use]
    pub fn is_recoverable_subcall_failure(&self) -> bool {
        !matches!(self, Self::Internal(_))
    }

    /// Returns true for the handful of CREATE-specific errors that are
    /// recoverable only at a CREATE/CREATE2 caller.
    #[must_use]
    pub fn is_creation_failure(&self) -> bool {
        matches!(
            self,
            Self::CreationCollision(_) | Self::CodeTooLarge { .. } | Self::InvalidCodeFirstByte
        )
    }
}

// =============================================================================
// STATE ERRORS
// =============================================================================

/// Errors from state access operations.
#[derive(Debug, Error, Clone)]
pub enum StateError {
    /// State not found (shouldn't happen for valid addresses).
    #[error("state not found for address: {0:?}")]
    NotFound(Address),

    /// State database is corrupted.
    #[error("state corruption detected")]
    Corrupted,

    /// Underlying persistent backend is unavailable.
    #[error("persistent backend unavailable")]
    Unavailable,

    /// Checkpoint stack misuse (commit/discard on a non-top id, or no open
    /// checkpoint). Wraps `journal::JournalError`.
    #[error("checkpoint error: {0}")]
    Journal(#[from] crate::journal::JournalError),

    /// Other state error.
    #[error("state error: {0}")]
    Other(String),
}

// =============================================================================
// PRECOMPILE ERRORS
// =============================================================================

/// Errors from precompiled contract execution.
#[derive(Debug, Error, Clone)]
pub enum PrecompileError {
    /// Invalid input length.
    #[error("invalid input length: expected {expected}, got {actual}")]
    InvalidInputLength { expected: usize, actual: usize },

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Cryptographic operation failed.
    #[error("crypto error: {0}")]
    CryptoError(String),

    /// Precompile not implemented.
    #[error("precompile not implemented: {0:?}")]
    NotImplemented(Address),
}

impl From<PrecompileError> for VmError {
    fn from(err: PrecompileError) -> Self {
        VmError::Revert(Bytes::from_vec(err.to_string().into_bytes()))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vm_error_display() {
        let err = VmError::InvalidInstruction(0xFE);
        assert_eq!(err.to_string(), "invalid instruction: 0xFE");

        let err = VmError::DepthExceeded {
            depth: 1025,
            max: 1024,
        };
        assert_eq!(err.to_string(), "call depth exceeded: 1025 > 1024");
    }

    #[test]
    fn test_vm_error_recoverable() {
        assert!(VmError::StackOverflow.is_recoverable_subcall_failure());
        assert!(VmError::Revert(Bytes::from_slice(b"test")).is_recoverable_subcall_failure());
        assert!(!VmError::Internal("bug".to_string()).is_recoverable_subcall_failure());
    }

    #[test]
    fn test_creation_failure_classification() {
        assert!(VmError::CreationCollision(Address::ZERO).is_creation_failure());
        assert!(VmError::InvalidCodeFirstByte.is_creation_failure());
        assert!(!VmError::StackUnderflow.is_creation_failure());
    }

    #[test]
    fn test_state_error_conversion() {
        let state_err = StateError::Unavailable;
        let vm_err: VmError = state_err.into();
        assert!(matches!(vm_err, VmError::StateError(_)));
    }

    #[test]
    fn test_precompile_error_conversion() {
        let pre_err = PrecompileError::InvalidInput("bad".to_string());
        let vm_err: VmError = pre_err.into();
        assert!(matches!(vm_err, VmError::Revert(_)));
    }
}
