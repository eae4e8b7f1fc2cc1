//! # Driving ports (inbound)
//!
//! The public entry point external callers use to request contract
//! execution: `execute_bytecode` and the trait that wraps it for
//! implementations backed by different persistent stores.

use crate::domain::entities::{BlockContext, ExecutionResult};
use crate::domain::value_objects::{Address, Bytes, U256};
use crate::errors::VmError;

// =============================================================================
// EXECUTE BYTECODE REQUEST
// =============================================================================

/// Parameters for a single top-level execution.
///
/// `to == None` means contract creation: the engine derives the new address
/// from `sender`'s nonce and treats `data` as initcode.
#[derive(Clone, Debug)]
pub struct ExecuteBytecodeRequest {
    /// Transaction sender.
    pub sender: Address,
    /// Recipient, or `None` for contract creation.
    pub to: Option<Address>,
    /// Value transferred in wei.
    pub value: U256,
    /// Calldata (or initcode, for contract creation).
    pub data: Bytes,
    /// Code to execute. For a call this is the recipient's code; for a
    /// creation this is the initcode (also carried in `data`).
    pub code: Bytes,
}

impl ExecuteBytecodeRequest {
    /// Returns true if this is a contract creation request.
    #[must_use]
    pub fn is_contract_creation(&self) -> bool {
        self.to.is_none()
    }
}

// =============================================================================
// SMART CONTRACT API (Primary driving port)
// =============================================================================

/// Primary entry point for contract execution, corresponding to
/// `execute_bytecode` from the external interface.
///
/// Implementations own a `State` instance for the duration of one call and
/// commit or discard it before returning; nothing is observable to other
/// callers mid-execution.
pub trait SmartContractApi: Send + Sync {
    /// Executes `request` against `block`, applying any resulting state
    /// changes to the backing store on success.
    fn execute_bytecode(
        &self,
        request: ExecuteBytecodeRequest,
        block: &BlockContext,
    ) -> Result<ExecutionResult, VmError>;

    /// Executes `request` without ever committing state changes, always in
    /// static mode. Used for read-only calls (`eth_call`-style queries).
    fn call(
        &self,
        request: ExecuteBytecodeRequest,
        block: &BlockContext,
    ) -> Result<Bytes, VmError>;
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_contract_creation() {
        let req = ExecuteBytecodeRequest {
            sender: Address::ZERO,
            to: None,
            value: U256::zero(),
            data: Bytes::new(),
            code: Bytes::new(),
        };
        assert!(req.is_contract_creation());

        let req_call = ExecuteBytecodeRequest {
            to: Some(Address::new([1u8; 20])),
            ..req
        };
        assert!(!req_call.is_contract_creation());
    }
}
