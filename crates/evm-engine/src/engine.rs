//! # Engine
//!
//! The driving adapter that exposes `ports::inbound::SmartContractApi`. An
//! `Engine` owns nothing but a `StateAccess` backend and a `VmConfig`; every
//! call builds a fresh `State` journal, runs it through the interpreter to
//! completion, and folds the whole journal into the backend on success or
//! throws it away on failure. Nothing is observable to another caller
//! mid-execution.

use std::sync::Arc;

use tracing::{instrument, warn};

use crate::domain::entities::{BlockContext, ExecutionContext, ExecutionResult, VmConfig};
use crate::domain::services::compute_contract_address;
use crate::domain::value_objects::{Bytes, U256};
use crate::errors::VmError;
use crate::evm::Interpreter;
use crate::ports::inbound::{ExecuteBytecodeRequest, SmartContractApi};
use crate::ports::outbound::StateAccess;
use crate::state::State;

/// Runs top-level transactions and read-only calls against a `StateAccess`
/// backend.
pub struct Engine<S: StateAccess> {
    backend: Arc<S>,
    config: VmConfig,
}

impl<S: StateAccess> Engine<S> {
    /// Creates an engine with the default (Cancun) `VmConfig`.
    #[must_use]
    pub fn new(backend: Arc<S>) -> Self {
        Self::with_config(backend, VmConfig::default())
    }

    /// Creates an engine with an explicit `VmConfig`.
    #[must_use]
    pub fn with_config(backend: Arc<S>, config: VmConfig) -> Self {
        Self { backend, config }
    }

    /// Runs `request` against `block`. `is_static` forces every frame into
    /// read-only mode and guarantees the backend is never touched, win or
    /// lose -- used by `call`, which layers on top of this for `eth_call`
    /// style queries.
    #[instrument(skip(self, request, block), fields(sender = ?request.sender, to = ?request.to, is_static))]
    fn run(
        &self,
        request: ExecuteBytecodeRequest,
        block: &BlockContext,
        is_static: bool,
    ) -> Result<ExecutionResult, VmError> {
        let mut state = State::new(&*self.backend, block.clone());
        let is_create = request.is_contract_creation();

        let (mut context, code) = if let Some(to) = request.to {
            let context = ExecutionContext::new_transaction(
                request.sender,
                to,
                request.value,
                request.data.clone(),
                block.clone(),
            );
            (context, request.code.clone())
        } else {
            let nonce = state.get_nonce(request.sender)?;
            let new_address = compute_contract_address(request.sender, nonce);
            let collides = state
                .get_account(new_address)?
                .is_some_and(|account| account.nonce != 0 || account.is_contract());
            if collides {
                state.revert_transaction();
                return Err(VmError::CreationCollision(new_address));
            }
            state.increment_nonce(request.sender)?;
            state.mark_created_this_tx(new_address);

            let context = ExecutionContext {
                origin: request.sender,
                caller: request.sender,
                address: new_address,
                code_address: new_address,
                value: request.value,
                data: request.data.clone(),
                block: block.clone(),
                depth: 0,
                is_static: false,
                is_create: true,
            };
            (context, request.data.clone())
        };
        context.is_static = is_static;

        if !request.value.is_zero() {
            let balance = state.get_balance(context.origin)?;
            if balance < request.value {
                state.revert_transaction();
                return Err(VmError::InsufficientBalance {
                    required: request.value,
                    available: balance,
                });
            }
            state.transfer(context.origin, context.address, request.value)?;
        }

        let deployed_to = context.address;
        let mut interpreter = Interpreter::new(context, code, &mut state, &self.config);
        let mut result = match interpreter.execute() {
            Ok(result) => result,
            Err(err) => {
                state.revert_transaction();
                return Err(err);
            }
        };

        if result.success && is_create {
            let deployed = result.output.clone();
            if deployed.as_slice().first() == Some(&0xEF) {
                state.revert_transaction();
                return Err(VmError::InvalidCodeFirstByte);
            }
            if deployed.len() > self.config.max_code_size {
                state.revert_transaction();
                return Err(VmError::CodeTooLarge {
                    size: deployed.len(),
                    max: self.config.max_code_size,
                });
            }
            state.set_code(deployed_to, deployed)?;
            state.increment_nonce(deployed_to)?;
        }

        if result.success && !is_static {
            result.logs = state.commit_transaction()?;
        } else {
            if !result.success {
                warn!(reason = ?result.revert_reason, "transaction reverted");
            }
            state.revert_transaction();
        }

        Ok(result)
    }
}

impl<S: StateAccess> SmartContractApi for Engine<S> {
    fn execute_bytecode(
        &self,
        request: ExecuteBytecodeRequest,
        block: &BlockContext,
    ) -> Result<ExecutionResult, VmError> {
        self.run(request, block, false)
    }

    fn call(&self, request: ExecuteBytecodeRequest, block: &BlockContext) -> Result<Bytes, VmError> {
        let result = self.run(request, block, true)?;
        if result.success {
            Ok(result.output)
        } else {
            Err(VmError::Revert(result.output))
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::state_adapter::InMemoryState;
    use crate::domain::value_objects::Address;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    fn engine() -> Engine<InMemoryState> {
        Engine::new(Arc::new(InMemoryState::new()))
    }

    #[test]
    fn deploys_and_calls_a_contract() {
        let engine = engine();
        let block = BlockContext::default();

        // init code: returns a single STOP-terminated runtime body that, when
        // called, pushes 42 and returns it.
        // runtime: PUSH1 42 PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let runtime: Vec<u8> = vec![
            0x60, 42, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xf3,
        ];
        // init: copies `runtime` into memory and returns it.
        let mut init = vec![0x7f]; // PUSH32
        let mut padded = runtime.clone();
        padded.resize(32, 0);
        init.extend_from_slice(&padded);
        init.extend_from_slice(&[
            0x60, 0x00, 0x52, // MSTORE at 0
            0x60, runtime.len() as u8, // PUSH1 len
            0x60, 0x00, // PUSH1 0
            0xf3, // RETURN
        ]);

        let deploy = ExecuteBytecodeRequest {
            sender: addr(1),
            to: None,
            value: U256::zero(),
            data: Bytes::from_vec(init),
            code: Bytes::new(),
        };
        let result = engine.execute_bytecode(deploy, &block).unwrap();
        assert!(result.success);
        assert_eq!(result.output.as_slice(), runtime.as_slice());

        let deployed_address = compute_contract_address(addr(1), 0);
        let call = ExecuteBytecodeRequest {
            sender: addr(1),
            to: Some(deployed_address),
            value: U256::zero(),
            data: Bytes::new(),
            code: Bytes::from_vec(runtime.clone()),
        };
        let output = engine.call(call, &block).unwrap();
        assert_eq!(output.len(), 32);
        assert_eq!(output.as_slice()[31], 42);
    }

    #[test]
    fn insufficient_balance_is_rejected_before_execution() {
        let engine = engine();
        let block = BlockContext::default();
        let request = ExecuteBytecodeRequest {
            sender: addr(1),
            to: Some(addr(2)),
            value: U256::from(100),
            data: Bytes::new(),
            code: Bytes::new(),
        };
        let err = engine.execute_bytecode(request, &block).unwrap_err();
        assert!(matches!(err, VmError::InsufficientBalance { .. }));
    }

    #[test]
    fn call_never_commits_state() {
        let engine = engine();
        let block = BlockContext::default();
        // SSTORE 1 at slot 0, which is a static violation during `call`.
        let code = vec![0x60, 1, 0x60, 0, 0x55];
        let request = ExecuteBytecodeRequest {
            sender: addr(1),
            to: Some(addr(2)),
            value: U256::zero(),
            data: Bytes::new(),
            code: Bytes::from_vec(code),
        };
        let err = engine.call(request, &block).unwrap_err();
        assert!(matches!(err, VmError::StaticViolation));
    }
}
