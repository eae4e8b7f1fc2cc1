//! # EVM Interpreter
//!
//! The main execution engine for EVM bytecode: a stack machine that walks
//! the code byte by byte, dispatching each opcode against the stack,
//! memory, and the journaled `State` threaded through the whole call tree.
//!
//! This engine does not meter gas (see `domain::entities::VmConfig`); the
//! only backstop against a non-terminating contract is `State::step`, a
//! shared counter across every frame in the transaction.

use crate::domain::entities::{ExecutionContext, ExecutionResult, Log, VmConfig};
use crate::domain::services::{
    compute_contract_address, compute_contract_address_create2, keccak256,
};
use crate::domain::value_objects::{Address, Bytes, Hash, StorageKey, StorageValue, U256};
use crate::errors::VmError;
use crate::evm::memory::Memory;
use crate::evm::opcodes::Opcode;
use crate::evm::precompiles::execute_precompile;
use crate::evm::stack::Stack;
use crate::ports::outbound::StateAccess;
use crate::state::State;
use std::collections::HashSet;

/// A single call frame's execution state, borrowing the transaction-wide
/// `State` for the duration of the frame.
///
/// `'a` is the lifetime of the `StateAccess` backend underlying `State`;
/// `'i` is the lifetime of this frame's borrow of it. A CALL-family or
/// CREATE-family opcode constructs a child `Interpreter` that reborrows
/// `self.state` for the duration of the sub-call and is dropped once it
/// returns.
pub struct Interpreter<'a, 'i, S: StateAccess> {
    /// Execution context (caller, address, value, calldata, block...).
    pub context: ExecutionContext,
    /// Contract bytecode being executed in this frame.
    pub code: Bytes,
    /// Program counter.
    pub pc: usize,
    /// EVM stack.
    pub stack: Stack,
    /// EVM memory.
    pub memory: Memory,
    /// Data returned by the most recently completed sub-call (RETURNDATA).
    pub return_data: Bytes,
    /// Transaction-wide journaled state.
    pub state: &'i mut State<'a, S>,
    /// Execution limits (call depth, code size, step count...).
    pub config: &'i VmConfig,
    /// Valid JUMPDEST locations within `code`.
    pub jump_dests: HashSet<usize>,
    /// Set by STOP/RETURN/SELFDESTRUCT; the run loop exits once true.
    pub stopped: bool,
    /// Set by REVERT; distinguishes a clean halt from a reverted one.
    pub reverted: bool,
}

impl<'a, 'i, S: StateAccess> Interpreter<'a, 'i, S> {
    /// Creates a new call frame.
    pub fn new(
        context: ExecutionContext,
        code: Bytes,
        state: &'i mut State<'a, S>,
        config: &'i VmConfig,
    ) -> Self {
        let jump_dests = analyze_jump_dests(code.as_slice());

        Self {
            context,
            code,
            pc: 0,
            stack: Stack::new(),
            memory: Memory::new(),
            return_data: Bytes::new(),
            state,
            config,
            jump_dests,
            stopped: false,
            reverted: false,
        }
    }

    /// Runs this frame to completion as a top-level call.
    ///
    /// Unlike a sub-call dispatched through a CALL-family or CREATE-family
    /// opcode, a top-level frame's checkpoint lifecycle (commit on success,
    /// revert on failure) is the caller's responsibility -- see
    /// `State::commit_transaction`/`revert_transaction`.
    pub fn execute(&mut self) -> Result<ExecutionResult, VmError> {
        match self.run_to_halt() {
            Ok(output) => Ok(ExecutionResult::success(output)),
            Err(VmError::Revert(data)) => Ok(ExecutionResult::revert(data)),
            Err(err) => Err(err),
        }
    }

    /// Runs opcodes until the frame halts, returning the output bytes on a
    /// clean halt (STOP, RETURN, SELFDESTRUCT, or falling off the end of
    /// the code) or `Err(VmError::Revert(..))` on REVERT.
    fn run_to_halt(&mut self) -> Result<Bytes, VmError> {
        while !self.stopped {
            self.state.step(self.config.max_execution_steps)?;

            if self.pc >= self.code.len() {
                break;
            }

            let opcode_byte = self.code.as_slice()[self.pc];
            let opcode =
                Opcode::from_byte(opcode_byte).ok_or(VmError::InvalidInstruction(opcode_byte))?;
            self.execute_opcode(opcode)?;
        }

        if self.reverted {
            Err(VmError::Revert(self.return_data.clone()))
        } else {
            Ok(self.return_data.clone())
        }
    }

    /// Runs `child_context` against `code` as a checkpointed sub-frame.
    ///
    /// Returns `(success, output)`: a committed success, a reverted call
    /// (with its revert reason as output), or any other recoverable failure
    /// (empty output) all return `Ok`. Only a non-recoverable failure (an
    /// internal bug, or a checkpoint-bookkeeping error) is propagated as
    /// `Err`, ending this frame too.
    fn run_subframe(
        &mut self,
        child_context: ExecutionContext,
        code: Bytes,
    ) -> Result<(bool, Bytes), VmError> {
        let checkpoint = self.state.checkpoint();
        let mut child = Interpreter::new(child_context, code, self.state, self.config);

        match child.run_to_halt() {
            Ok(output) => {
                self.state.commit(checkpoint)?;
                Ok((true, output))
            }
            Err(VmError::Revert(data)) => {
                self.state.discard(checkpoint)?;
                Ok((false, data))
            }
            Err(err) if err.is_recoverable_subcall_failure() => {
                self.state.discard(checkpoint)?;
                Ok((false, Bytes::new()))
            }
            Err(err) => {
                self.state.discard(checkpoint)?;
                Err(err)
            }
        }
    }

    /// Executes a single opcode.
    fn execute_opcode(&mut self, opcode: Opcode) -> Result<(), VmError> {
        self.pc += 1;

        match opcode {
            // =================================================================
            // STOP & ARITHMETIC
            // =================================================================
            Opcode::Stop => {
                self.stopped = true;
            }

            Opcode::Add => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a.overflowing_add(b).0)?;
            }

            Opcode::Mul => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a.overflowing_mul(b).0)?;
            }

            Opcode::Sub => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a.overflowing_sub(b).0)?;
            }

            Opcode::Div => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if b.is_zero() { U256::zero() } else { a / b };
                self.stack.push(result)?;
            }

            Opcode::SDiv => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if b.is_zero() {
                    U256::zero()
                } else {
                    signed_div(a, b)
                };
                self.stack.push(result)?;
            }

            Opcode::Mod => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if b.is_zero() { U256::zero() } else { a % b };
                self.stack.push(result)?;
            }

            Opcode::SMod => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if b.is_zero() {
                    U256::zero()
                } else {
                    signed_mod(a, b)
                };
                self.stack.push(result)?;
            }

            Opcode::AddMod => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let n = self.stack.pop()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    let sum = u256_to_u512(a) + u256_to_u512(b);
                    u512_to_u256(sum % u256_to_u512(n))
                };
                self.stack.push(result)?;
            }

            Opcode::MulMod => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let n = self.stack.pop()?;
                let result = if n.is_zero() {
                    U256::zero()
                } else {
                    let prod = u256_to_u512(a) * u256_to_u512(b);
                    u512_to_u256(prod % u256_to_u512(n))
                };
                self.stack.push(result)?;
            }

            Opcode::Exp => {
                let base = self.stack.pop()?;
                let exp = self.stack.pop()?;
                self.stack.push(exp_by_squaring(base, exp))?;
            }

            Opcode::SignExtend => {
                let k = self.stack.pop()?;
                let x = self.stack.pop()?;

                let result = if k < U256::from(32) {
                    let k = to_usize(k);
                    let bit_index = 8 * k + 7;
                    let bit = x.bit(bit_index);
                    let mask = (U256::one() << (bit_index + 1)) - 1;
                    if bit {
                        x | !mask
                    } else {
                        x & mask
                    }
                } else {
                    x
                };
                self.stack.push(result)?;
            }

            // =================================================================
            // COMPARISON & BITWISE
            // =================================================================
            Opcode::Lt => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack
                    .push(if a < b { U256::one() } else { U256::zero() })?;
            }

            Opcode::Gt => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack
                    .push(if a > b { U256::one() } else { U256::zero() })?;
            }

            Opcode::SLt => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if signed_lt(a, b) {
                    U256::one()
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }

            Opcode::SGt => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                let result = if signed_lt(b, a) {
                    U256::one()
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }

            Opcode::Eq => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack
                    .push(if a == b { U256::one() } else { U256::zero() })?;
            }

            Opcode::IsZero => {
                let a = self.stack.pop()?;
                self.stack.push(if a.is_zero() {
                    U256::one()
                } else {
                    U256::zero()
                })?;
            }

            Opcode::And => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a & b)?;
            }

            Opcode::Or => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a | b)?;
            }

            Opcode::Xor => {
                let a = self.stack.pop()?;
                let b = self.stack.pop()?;
                self.stack.push(a ^ b)?;
            }

            Opcode::Not => {
                let a = self.stack.pop()?;
                self.stack.push(!a)?;
            }

            Opcode::Byte => {
                let i = self.stack.pop()?;
                let x = self.stack.pop()?;
                let result = if i < U256::from(32) {
                    let byte_index = 31 - to_usize(i);
                    let mut bytes = [0u8; 32];
                    x.to_big_endian(&mut bytes);
                    U256::from(bytes[byte_index])
                } else {
                    U256::zero()
                };
                self.stack.push(result)?;
            }

            Opcode::Shl => {
                let shift = self.stack.pop()?;
                let value = self.stack.pop()?;
                let result = if shift >= U256::from(256) {
                    U256::zero()
                } else {
                    value << to_usize(shift)
                };
                self.stack.push(result)?;
            }

            Opcode::Shr => {
                let shift = self.stack.pop()?;
                let value = self.stack.pop()?;
                let result = if shift >= U256::from(256) {
                    U256::zero()
                } else {
                    value >> to_usize(shift)
                };
                self.stack.push(result)?;
            }

            Opcode::Sar => {
                let shift = self.stack.pop()?;
                let value = self.stack.pop()?;
                self.stack.push(sar(value, shift))?;
            }

            // =================================================================
            // KECCAK256
            // =================================================================
            Opcode::Keccak256 => {
                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(offset.saturating_add(size))?;
                let data = self.memory.read_bytes(offset, size);
                let hash = keccak256(&data);
                self.stack.push(U256::from_big_endian(hash.as_bytes()))?;
            }

            // =================================================================
            // ENVIRONMENTAL INFORMATION
            // =================================================================
            Opcode::Address => {
                self.stack.push(address_to_u256(self.context.address))?;
            }

            Opcode::Balance => {
                let addr = u256_to_address(self.stack.pop()?);
                let balance = self.state.get_balance(addr)?;
                self.stack.push(balance)?;
            }

            Opcode::Origin => {
                self.stack.push(address_to_u256(self.context.origin))?;
            }

            Opcode::Caller => {
                self.stack.push(address_to_u256(self.context.caller))?;
            }

            Opcode::CallValue => {
                self.stack.push(self.context.value)?;
            }

            Opcode::CallDataLoad => {
                let offset = to_usize(self.stack.pop()?);
                let data = &self.context.data;
                let mut result = [0u8; 32];
                for (i, byte) in result.iter_mut().enumerate() {
                    let pos = offset.saturating_add(i);
                    if pos < data.len() {
                        *byte = data.as_slice()[pos];
                    }
                }
                self.stack.push(U256::from_big_endian(&result))?;
            }

            Opcode::CallDataSize => {
                self.stack.push(U256::from(self.context.data.len()))?;
            }

            Opcode::CallDataCopy => {
                let dest_offset = to_usize(self.stack.pop()?);
                let data_offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(dest_offset.saturating_add(size))?;

                let data = self.context.data.clone();
                for i in 0..size {
                    let byte = data
                        .as_slice()
                        .get(data_offset.saturating_add(i))
                        .copied()
                        .unwrap_or(0);
                    self.memory.write_byte(dest_offset + i, byte)?;
                }
            }

            Opcode::CodeSize => {
                self.stack.push(U256::from(self.code.len()))?;
            }

            Opcode::CodeCopy => {
                let dest_offset = to_usize(self.stack.pop()?);
                let code_offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(dest_offset.saturating_add(size))?;

                for i in 0..size {
                    let byte = self
                        .code
                        .as_slice()
                        .get(code_offset.saturating_add(i))
                        .copied()
                        .unwrap_or(0);
                    self.memory.write_byte(dest_offset + i, byte)?;
                }
            }

            Opcode::GasPrice => {
                // This engine does not meter gas, so there is no tx gas
                // price; GASPRICE reports the block's base fee as the
                // closest deterministic stand-in.
                self.stack.push(self.context.block.base_fee)?;
            }

            Opcode::ReturnDataSize => {
                self.stack.push(U256::from(self.return_data.len()))?;
            }

            Opcode::ReturnDataCopy => {
                let dest_offset = to_usize(self.stack.pop()?);
                let data_offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);

                if data_offset.saturating_add(size) > self.return_data.len() {
                    return Err(VmError::OutOfBoundsRead {
                        offset: data_offset,
                        size,
                        available: self.return_data.len(),
                    });
                }

                self.memory.expand(dest_offset.saturating_add(size))?;
                let data = self.return_data.as_slice()[data_offset..data_offset + size].to_vec();
                self.memory.write_bytes(dest_offset, &data)?;
            }

            // =================================================================
            // BLOCK INFORMATION
            // =================================================================
            Opcode::BlockHash => {
                let _number = self.stack.pop()?;
                // No block hash oracle is wired into the interpreter; see
                // `ports::outbound::BlockHashOracle`.
                self.stack.push(U256::zero())?;
            }

            Opcode::Coinbase => {
                self.stack.push(address_to_u256(self.context.block.coinbase))?;
            }

            Opcode::Timestamp => {
                self.stack.push(U256::from(self.context.block.timestamp))?;
            }

            Opcode::Number => {
                self.stack.push(U256::from(self.context.block.number))?;
            }

            Opcode::PrevRandao => {
                self.stack.push(self.context.block.difficulty)?;
            }

            Opcode::GasLimit => {
                self.stack.push(U256::from(self.context.block.gas_limit))?;
            }

            Opcode::ChainId => {
                self.stack.push(U256::from(self.context.block.chain_id))?;
            }

            Opcode::SelfBalance => {
                let balance = self.state.get_balance(self.context.address)?;
                self.stack.push(balance)?;
            }

            Opcode::BaseFee => {
                self.stack.push(self.context.block.base_fee)?;
            }

            Opcode::BlobHash => {
                let index = to_usize(self.stack.pop()?);
                let hash = self
                    .context
                    .block
                    .blob_hashes
                    .get(index)
                    .map(|h| U256::from_big_endian(h.as_bytes()))
                    .unwrap_or_else(U256::zero);
                self.stack.push(hash)?;
            }

            Opcode::BlobBaseFee => {
                self.stack.push(self.context.block.blob_base_fee)?;
            }

            // =================================================================
            // STACK, MEMORY, STORAGE
            // =================================================================
            Opcode::Pop => {
                self.stack.pop()?;
            }

            Opcode::MLoad => {
                let offset = to_usize(self.stack.pop()?);
                self.memory.expand(offset.saturating_add(32))?;
                let value = self.memory.read_word(offset);
                self.stack.push(U256::from_big_endian(&value))?;
            }

            Opcode::MStore => {
                let offset = to_usize(self.stack.pop()?);
                let value = self.stack.pop()?;
                self.memory.expand(offset.saturating_add(32))?;
                let mut bytes = [0u8; 32];
                value.to_big_endian(&mut bytes);
                self.memory.write_word(offset, &bytes)?;
            }

            Opcode::MStore8 => {
                let offset = to_usize(self.stack.pop()?);
                let value = self.stack.pop()?;
                self.memory.expand(offset.saturating_add(1))?;
                self.memory.write_byte(offset, value.byte(0))?;
            }

            Opcode::MCopy => {
                let dest = to_usize(self.stack.pop()?);
                let src = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.copy(dest, src, size)?;
            }

            Opcode::SLoad => {
                let key = StorageKey::from_u256(self.stack.pop()?);
                let value = self.state.get_storage(self.context.address, key)?;
                self.stack.push(value.to_u256())?;
            }

            Opcode::SStore => {
                if self.context.is_static {
                    return Err(VmError::StaticViolation);
                }
                let key = StorageKey::from_u256(self.stack.pop()?);
                let value = StorageValue::from_u256(self.stack.pop()?);
                self.state.set_storage(self.context.address, key, value)?;
            }

            Opcode::TLoad => {
                let key = StorageKey::from_u256(self.stack.pop()?);
                let value = self.state.tload(self.context.address, key);
                self.stack.push(value.to_u256())?;
            }

            Opcode::TStore => {
                if self.context.is_static {
                    return Err(VmError::StaticViolation);
                }
                let key = StorageKey::from_u256(self.stack.pop()?);
                let value = StorageValue::from_u256(self.stack.pop()?);
                self.state.tstore(self.context.address, key, value);
            }

            Opcode::Jump => {
                let dest = to_usize(self.stack.pop()?);
                if !self.jump_dests.contains(&dest) {
                    return Err(VmError::InvalidJumpDestination(dest));
                }
                self.pc = dest;
            }

            Opcode::JumpI => {
                let dest = to_usize(self.stack.pop()?);
                let condition = self.stack.pop()?;
                if !condition.is_zero() {
                    if !self.jump_dests.contains(&dest) {
                        return Err(VmError::InvalidJumpDestination(dest));
                    }
                    self.pc = dest;
                }
            }

            Opcode::Pc => {
                self.stack.push(U256::from(self.pc - 1))?;
            }

            Opcode::MSize => {
                self.stack.push(U256::from(self.memory.len()))?;
            }

            Opcode::Gas => {
                // No gas metering; GAS reports the block gas limit as a
                // deterministic sentinel rather than an arbitrary constant.
                self.stack.push(U256::from(self.context.block.gas_limit))?;
            }

            Opcode::JumpDest => {}

            // =================================================================
            // PUSH OPERATIONS
            // =================================================================
            Opcode::Push0 => {
                self.stack.push(U256::zero())?;
            }

            Opcode::Push1
            | Opcode::Push2
            | Opcode::Push3
            | Opcode::Push4
            | Opcode::Push5
            | Opcode::Push6
            | Opcode::Push7
            | Opcode::Push8
            | Opcode::Push9
            | Opcode::Push10
            | Opcode::Push11
            | Opcode::Push12
            | Opcode::Push13
            | Opcode::Push14
            | Opcode::Push15
            | Opcode::Push16
            | Opcode::Push17
            | Opcode::Push18
            | Opcode::Push19
            | Opcode::Push20
            | Opcode::Push21
            | Opcode::Push22
            | Opcode::Push23
            | Opcode::Push24
            | Opcode::Push25
            | Opcode::Push26
            | Opcode::Push27
            | Opcode::Push28
            | Opcode::Push29
            | Opcode::Push30
            | Opcode::Push31
            | Opcode::Push32 => {
                let size = opcode.push_size().unwrap_or(0);
                let mut bytes = [0u8; 32];
                let end = (self.pc + size).min(self.code.len());
                let data_len = end - self.pc;
                if data_len > 0 {
                    bytes[32 - size..32 - size + data_len]
                        .copy_from_slice(&self.code.as_slice()[self.pc..end]);
                }
                self.stack.push(U256::from_big_endian(&bytes))?;
                self.pc += size;
            }

            // =================================================================
            // DUP OPERATIONS
            // =================================================================
            Opcode::Dup1 => self.stack.dup(0)?,
            Opcode::Dup2 => self.stack.dup(1)?,
            Opcode::Dup3 => self.stack.dup(2)?,
            Opcode::Dup4 => self.stack.dup(3)?,
            Opcode::Dup5 => self.stack.dup(4)?,
            Opcode::Dup6 => self.stack.dup(5)?,
            Opcode::Dup7 => self.stack.dup(6)?,
            Opcode::Dup8 => self.stack.dup(7)?,
            Opcode::Dup9 => self.stack.dup(8)?,
            Opcode::Dup10 => self.stack.dup(9)?,
            Opcode::Dup11 => self.stack.dup(10)?,
            Opcode::Dup12 => self.stack.dup(11)?,
            Opcode::Dup13 => self.stack.dup(12)?,
            Opcode::Dup14 => self.stack.dup(13)?,
            Opcode::Dup15 => self.stack.dup(14)?,
            Opcode::Dup16 => self.stack.dup(15)?,

            // =================================================================
            // SWAP OPERATIONS
            // =================================================================
            Opcode::Swap1 => self.stack.swap(1)?,
            Opcode::Swap2 => self.stack.swap(2)?,
            Opcode::Swap3 => self.stack.swap(3)?,
            Opcode::Swap4 => self.stack.swap(4)?,
            Opcode::Swap5 => self.stack.swap(5)?,
            Opcode::Swap6 => self.stack.swap(6)?,
            Opcode::Swap7 => self.stack.swap(7)?,
            Opcode::Swap8 => self.stack.swap(8)?,
            Opcode::Swap9 => self.stack.swap(9)?,
            Opcode::Swap10 => self.stack.swap(10)?,
            Opcode::Swap11 => self.stack.swap(11)?,
            Opcode::Swap12 => self.stack.swap(12)?,
            Opcode::Swap13 => self.stack.swap(13)?,
            Opcode::Swap14 => self.stack.swap(14)?,
            Opcode::Swap15 => self.stack.swap(15)?,
            Opcode::Swap16 => self.stack.swap(16)?,

            // =================================================================
            // LOG OPERATIONS
            // =================================================================
            Opcode::Log0 | Opcode::Log1 | Opcode::Log2 | Opcode::Log3 | Opcode::Log4 => {
                if self.context.is_static {
                    return Err(VmError::StaticViolation);
                }

                let topic_count = match opcode {
                    Opcode::Log0 => 0,
                    Opcode::Log1 => 1,
                    Opcode::Log2 => 2,
                    Opcode::Log3 => 3,
                    Opcode::Log4 => 4,
                    _ => unreachable!(),
                };

                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);

                let mut topics = Vec::with_capacity(topic_count);
                for _ in 0..topic_count {
                    let topic = self.stack.pop()?;
                    let mut bytes = [0u8; 32];
                    topic.to_big_endian(&mut bytes);
                    topics.push(Hash::new(bytes));
                }

                self.memory.expand(offset.saturating_add(size))?;
                let data = self.memory.read_bytes(offset, size);
                self.state
                    .push_log(Log::new(self.context.address, topics, Bytes::from_vec(data)));
            }

            // =================================================================
            // SYSTEM OPERATIONS
            // =================================================================
            Opcode::Return => {
                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(offset.saturating_add(size))?;
                self.return_data = Bytes::from_vec(self.memory.read_bytes(offset, size));
                self.stopped = true;
            }

            Opcode::Revert => {
                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(offset.saturating_add(size))?;
                self.return_data = Bytes::from_vec(self.memory.read_bytes(offset, size));
                self.stopped = true;
                self.reverted = true;
            }

            Opcode::Invalid => {
                return Err(VmError::InvalidInstruction(0xFE));
            }

            Opcode::ExtCodeSize => {
                let addr = u256_to_address(self.stack.pop()?);
                let size = self.state.get_code(addr)?.len();
                self.stack.push(U256::from(size))?;
            }

            Opcode::ExtCodeCopy => {
                let addr = u256_to_address(self.stack.pop()?);
                let dest_offset = to_usize(self.stack.pop()?);
                let code_offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(dest_offset.saturating_add(size))?;

                let code = self.state.get_code(addr)?;
                for i in 0..size {
                    let byte = code.as_slice().get(code_offset.saturating_add(i)).copied().unwrap_or(0);
                    self.memory.write_byte(dest_offset + i, byte)?;
                }
            }

            Opcode::ExtCodeHash => {
                let addr = u256_to_address(self.stack.pop()?);
                let hash = match self.state.get_account(addr)? {
                    Some(account) => U256::from_big_endian(account.code_hash.as_bytes()),
                    None => U256::zero(),
                };
                self.stack.push(hash)?;
            }

            Opcode::SelfDestruct => {
                if self.context.is_static {
                    return Err(VmError::StaticViolation);
                }
                let beneficiary = u256_to_address(self.stack.pop()?);
                let balance = self.state.get_balance(self.context.address)?;
                if !balance.is_zero() {
                    self.state.transfer(self.context.address, beneficiary, balance)?;
                }
                if self.state.was_created_this_tx(self.context.address) {
                    self.state.delete_account(self.context.address)?;
                }
                self.stopped = true;
            }

            Opcode::Create => {
                let value = self.stack.pop()?;
                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                self.memory.expand(offset.saturating_add(size))?;
                let init_code = Bytes::from_vec(self.memory.read_bytes(offset, size));
                self.create_contract(value, init_code, None)?;
            }

            Opcode::Create2 => {
                let value = self.stack.pop()?;
                let offset = to_usize(self.stack.pop()?);
                let size = to_usize(self.stack.pop()?);
                let salt = self.stack.pop()?;
                self.memory.expand(offset.saturating_add(size))?;
                let init_code = Bytes::from_vec(self.memory.read_bytes(offset, size));
                let mut salt_bytes = [0u8; 32];
                salt.to_big_endian(&mut salt_bytes);
                self.create_contract(value, init_code, Some(Hash::new(salt_bytes)))?;
            }

            Opcode::Call | Opcode::CallCode => {
                let _gas = self.stack.pop()?;
                let addr = u256_to_address(self.stack.pop()?);
                let value = self.stack.pop()?;
                let args_offset = to_usize(self.stack.pop()?);
                let args_size = to_usize(self.stack.pop()?);
                let ret_offset = to_usize(self.stack.pop()?);
                let ret_size = to_usize(self.stack.pop()?);

                if self.context.is_static && !value.is_zero() {
                    return Err(VmError::WriteProtection);
                }

                self.memory.expand(args_offset.saturating_add(args_size))?;
                let input = Bytes::from_vec(self.memory.read_bytes(args_offset, args_size));

                let target_account = if opcode == Opcode::Call {
                    addr
                } else {
                    self.context.address
                };
                let child_context = self.context.child_call(
                    self.context.address,
                    target_account,
                    addr,
                    value,
                    input,
                );

                self.dispatch_call(child_context, value, ret_offset, ret_size)?;
            }

            Opcode::DelegateCall => {
                let _gas = self.stack.pop()?;
                let addr = u256_to_address(self.stack.pop()?);
                let args_offset = to_usize(self.stack.pop()?);
                let args_size = to_usize(self.stack.pop()?);
                let ret_offset = to_usize(self.stack.pop()?);
                let ret_size = to_usize(self.stack.pop()?);

                self.memory.expand(args_offset.saturating_add(args_size))?;
                let input = Bytes::from_vec(self.memory.read_bytes(args_offset, args_size));
                let child_context = self.context.child_delegatecall(addr, input);

                self.dispatch_call(child_context, U256::zero(), ret_offset, ret_size)?;
            }

            Opcode::StaticCall => {
                let _gas = self.stack.pop()?;
                let addr = u256_to_address(self.stack.pop()?);
                let args_offset = to_usize(self.stack.pop()?);
                let args_size = to_usize(self.stack.pop()?);
                let ret_offset = to_usize(self.stack.pop()?);
                let ret_size = to_usize(self.stack.pop()?);

                self.memory.expand(args_offset.saturating_add(args_size))?;
                let input = Bytes::from_vec(self.memory.read_bytes(args_offset, args_size));
                let child_context = self.context.child_staticcall(addr, input);

                self.dispatch_call(child_context, U256::zero(), ret_offset, ret_size)?;
            }
        }

        Ok(())
    }

    /// Shared tail of CALL/CALLCODE/DELEGATECALL/STATICCALL: depth and
    /// balance preconditions, precompile short-circuiting, sub-frame
    /// dispatch, and copying the result back into memory.
    fn dispatch_call(
        &mut self,
        child_context: ExecutionContext,
        value: U256,
        ret_offset: usize,
        ret_size: usize,
    ) -> Result<(), VmError> {
        if child_context.depth > self.config.max_call_depth {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        if !value.is_zero() && self.state.get_balance(self.context.address)? < value {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        if let Some(result) = execute_precompile(child_context.code_address, child_context.data.as_slice()) {
            if !value.is_zero() {
                self.state
                    .transfer(self.context.address, child_context.address, value)?;
            }

            let (success, output) = match result {
                Ok(output) => (true, output),
                Err(_) => (false, Bytes::new()),
            };
            self.write_call_result(&output, ret_offset, ret_size);
            self.return_data = output;
            self.stack.push(if success { U256::one() } else { U256::zero() })?;
            return Ok(());
        }

        let code = self.state.get_code(child_context.code_address)?;

        if !value.is_zero() {
            self.state
                .transfer(self.context.address, child_context.address, value)?;
        }

        let (success, output) = self.run_subframe(child_context, code)?;
        self.write_call_result(&output, ret_offset, ret_size);
        self.return_data = output;
        self.stack.push(if success { U256::one() } else { U256::zero() })?;
        Ok(())
    }

    /// Copies up to `ret_size` bytes of `output` into memory at `ret_offset`,
    /// zero-padding if `output` is shorter.
    fn write_call_result(&mut self, output: &Bytes, ret_offset: usize, ret_size: usize) {
        if ret_size == 0 {
            return;
        }
        if self.memory.expand(ret_offset.saturating_add(ret_size)).is_err() {
            return;
        }
        let copy_len = ret_size.min(output.len());
        if copy_len > 0 {
            let _ = self
                .memory
                .write_bytes(ret_offset, &output.as_slice()[..copy_len]);
        }
    }

    /// Implements CREATE/CREATE2: address derivation, EIP-3860/3541/170
    /// checks, child-frame init code execution, and the final stack push.
    fn create_contract(
        &mut self,
        value: U256,
        init_code: Bytes,
        salt: Option<Hash>,
    ) -> Result<(), VmError> {
        if self.context.is_static {
            return Err(VmError::StaticViolation);
        }

        if self.context.depth + 1 > self.config.max_call_depth {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        if init_code.len() > self.config.max_init_code_size {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let sender = self.context.address;
        let sender_nonce = self.state.get_nonce(sender)?;
        self.state.increment_nonce(sender)?;

        let new_address = match salt {
            Some(salt) => compute_contract_address_create2(sender, salt, init_code.as_slice()),
            None => compute_contract_address(sender, sender_nonce),
        };

        let collision = match self.state.get_account(new_address)? {
            Some(account) => account.nonce != 0 || !account.is_eoa(),
            None => false,
        };
        if collision {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        if !value.is_zero() && self.state.get_balance(sender)? < value {
            self.stack.push(U256::zero())?;
            return Ok(());
        }

        let checkpoint = self.state.checkpoint();
        self.state.mark_created_this_tx(new_address);
        // A freshly created account's nonce starts at 1, not 0, regardless of
        // whether its init code ends up deploying any bytes -- otherwise an
        // empty-code deployment wouldn't collide with a second CREATE2 at the
        // same address.
        self.state.increment_nonce(new_address)?;
        if !value.is_zero() {
            self.state.transfer(sender, new_address, value)?;
        }

        let child_context = self.context.child_create(sender, new_address, value, init_code);
        // CREATE's "code" and "calldata" are the same init code.
        let code = child_context.data.clone();
        let mut child = Interpreter::new(child_context, code, self.state, self.config);

        match child.run_to_halt() {
            Ok(deployed_code) => {
                if deployed_code.as_slice().first() == Some(&0xEF) {
                    self.state.discard(checkpoint)?;
                    self.return_data = Bytes::new();
                    self.stack.push(U256::zero())?;
                    return Ok(());
                }
                if deployed_code.len() > self.config.max_code_size {
                    self.state.discard(checkpoint)?;
                    self.return_data = Bytes::new();
                    self.stack.push(U256::zero())?;
                    return Ok(());
                }
                self.state.set_code(new_address, deployed_code)?;
                self.state.commit(checkpoint)?;
                self.return_data = Bytes::new();
                self.stack.push(address_to_u256(new_address))?;
            }
            Err(VmError::Revert(data)) => {
                self.state.discard(checkpoint)?;
                self.return_data = data;
                self.stack.push(U256::zero())?;
            }
            Err(err) if err.is_recoverable_subcall_failure() => {
                self.state.discard(checkpoint)?;
                self.return_data = Bytes::new();
                self.stack.push(U256::zero())?;
            }
            Err(err) => {
                self.state.discard(checkpoint)?;
                return Err(err);
            }
        }

        Ok(())
    }
}

// =============================================================================
// HELPER FUNCTIONS
// =============================================================================

/// Converts a stack word to a `usize` offset, index, or size.
///
/// `U256::as_usize` aborts the process for anything past `usize::MAX`, and
/// any syntactically valid bytecode can push such a value (`PUSH32
/// 0xFFFF..FF`). Saturating instead keeps every caller total: a saturated
/// offset/size still flows into `Memory::expand`'s own cap check and comes
/// back as a halting `MemoryLimitExceeded`, a saturated jump target still
/// misses `jump_dests` and comes back as `InvalidJumpDestination`, and a
/// saturated index into a short slice (e.g. `BLOBHASH`) still comes back as
/// the same zero a smaller out-of-range index would.
fn to_usize(value: U256) -> usize {
    if value > U256::from(usize::MAX) {
        usize::MAX
    } else {
        value.as_usize()
    }
}

/// Analyze bytecode to find valid JUMPDEST locations.
fn analyze_jump_dests(code: &[u8]) -> HashSet<usize> {
    let mut dests = HashSet::new();
    let mut i = 0;

    while i < code.len() {
        let op = code[i];
        if op == 0x5B {
            dests.insert(i);
        }
        if (0x60..=0x7F).contains(&op) {
            let size = (op - 0x5F) as usize;
            i += size;
        }
        i += 1;
    }

    dests
}

/// Convert U256 to address (take lower 20 bytes).
fn u256_to_address(value: U256) -> Address {
    let mut bytes = [0u8; 32];
    value.to_big_endian(&mut bytes);
    let mut addr = [0u8; 20];
    addr.copy_from_slice(&bytes[12..32]);
    Address::new(addr)
}

/// Convert an address to its left-padded U256 stack representation.
fn address_to_u256(address: Address) -> U256 {
    let mut bytes = [0u8; 32];
    bytes[12..].copy_from_slice(address.as_bytes());
    U256::from_big_endian(&bytes)
}

/// Signed less than comparison.
fn signed_lt(a: U256, b: U256) -> bool {
    let a_neg = a.bit(255);
    let b_neg = b.bit(255);
    match (a_neg, b_neg) {
        (true, false) => true,
        (false, true) => false,
        _ => a < b,
    }
}

/// Signed division.
fn signed_div(a: U256, b: U256) -> U256 {
    let a_neg = a.bit(255);
    let b_neg = b.bit(255);
    let a_abs = if a_neg {
        (!a).overflowing_add(U256::one()).0
    } else {
        a
    };
    let b_abs = if b_neg {
        (!b).overflowing_add(U256::one()).0
    } else {
        b
    };
    let result = a_abs / b_abs;
    if a_neg == b_neg {
        result
    } else {
        (!result).overflowing_add(U256::one()).0
    }
}

/// Signed modulo.
fn signed_mod(a: U256, b: U256) -> U256 {
    let a_neg = a.bit(255);
    let a_abs = if a_neg {
        (!a).overflowing_add(U256::one()).0
    } else {
        a
    };
    let b_abs = if b.bit(255) {
        (!b).overflowing_add(U256::one()).0
    } else {
        b
    };
    let result = a_abs % b_abs;
    if a_neg {
        (!result).overflowing_add(U256::one()).0
    } else {
        result
    }
}

/// Arithmetic shift right.
fn sar(value: U256, shift: U256) -> U256 {
    if shift >= U256::from(256) {
        if value.bit(255) {
            U256::MAX
        } else {
            U256::zero()
        }
    } else {
        let shift = to_usize(shift);
        let is_negative = value.bit(255);
        let shifted = value >> shift;
        if is_negative {
            let mask = U256::MAX << (256 - shift);
            shifted | mask
        } else {
            shifted
        }
    }
}

/// Exponentiation by squaring.
fn exp_by_squaring(base: U256, mut exp: U256) -> U256 {
    if exp.is_zero() {
        return U256::one();
    }

    let mut result = U256::one();
    let mut base = base;

    while !exp.is_zero() {
        if exp.bit(0) {
            result = result.overflowing_mul(base).0;
        }
        exp >>= 1;
        base = base.overflowing_mul(base).0;
    }

    result
}

/// Convert U256 to U512 for addmod/mulmod.
fn u256_to_u512(value: U256) -> primitive_types::U512 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes[32..]);
    primitive_types::U512::from_big_endian(&bytes)
}

/// Convert U512 back to U256.
fn u512_to_u256(value: primitive_types::U512) -> U256 {
    let mut bytes = [0u8; 64];
    value.to_big_endian(&mut bytes);
    U256::from_big_endian(&bytes[32..])
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::state_adapter::InMemoryState;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    #[test]
    fn test_analyze_jump_dests() {
        let code = vec![0x60, 0x04, 0x56, 0x5B, 0x00];
        let dests = analyze_jump_dests(&code);
        assert!(dests.contains(&3));
        assert!(!dests.contains(&0));
    }

    #[test]
    fn test_u256_to_address() {
        let value = U256::from(0x1234u64);
        let addr = u256_to_address(value);
        assert_eq!(addr.as_bytes()[19], 0x34);
        assert_eq!(addr.as_bytes()[18], 0x12);
    }

    #[test]
    fn test_exp_by_squaring() {
        assert_eq!(exp_by_squaring(U256::from(2), U256::from(0)), U256::one());
        assert_eq!(exp_by_squaring(U256::from(2), U256::from(1)), U256::from(2));
        assert_eq!(
            exp_by_squaring(U256::from(2), U256::from(10)),
            U256::from(1024)
        );
        assert_eq!(
            exp_by_squaring(U256::from(3), U256::from(3)),
            U256::from(27)
        );
    }

    #[test]
    fn test_signed_lt() {
        let neg_one = !U256::zero();
        let one = U256::one();

        assert!(signed_lt(neg_one, one));
        assert!(!signed_lt(one, neg_one));
        assert!(!signed_lt(one, one));
    }

    fn exec(code: &[u8], context: ExecutionContext) -> Result<ExecutionResult, VmError> {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, context.block.clone());
        let config = VmConfig::default();
        let mut interp = Interpreter::new(context, Bytes::from_slice(code), &mut state, &config);
        interp.execute()
    }

    #[test]
    fn add_and_return() {
        // PUSH1 1 PUSH1 2 ADD PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let code = vec![
            0x60, 0x01, 0x60, 0x02, 0x01, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3,
        ];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(U256::from_big_endian(result.output.as_slice()), U256::from(3));
    }

    #[test]
    fn revert_carries_reason_bytes() {
        // PUSH1 1 PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 REVERT
        let code = vec![0x60, 0x01, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xFD];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(!result.success);
        assert_eq!(result.output.as_slice(), &[0x01]);
    }

    #[test]
    fn sstore_then_sload_round_trips() {
        // PUSH1 42 PUSH1 0 SSTORE PUSH1 0 SLOAD PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let code = vec![
            0x60, 0x2a, 0x60, 0x00, 0x55, 0x60, 0x00, 0x54, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60,
            0x00, 0xF3,
        ];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(U256::from_big_endian(result.output.as_slice()), U256::from(42));
    }

    #[test]
    fn sstore_in_static_context_errors() {
        let code = vec![0x60, 0x01, 0x60, 0x00, 0x55];
        let mut ctx = ExecutionContext::default();
        ctx.is_static = true;
        let err = exec(&code, ctx).unwrap_err();
        assert!(matches!(err, VmError::StaticViolation));
    }

    #[test]
    fn invalid_jump_destination_errors() {
        // PUSH1 5 JUMP (no JUMPDEST at 5)
        let code = vec![0x60, 0x05, 0x56];
        let err = exec(&code, ExecutionContext::default()).unwrap_err();
        assert!(matches!(err, VmError::InvalidJumpDestination(5)));
    }

    #[test]
    fn blobhash_out_of_range_returns_zero() {
        // PUSH1 0 BLOBHASH PUSH1 0 MSTORE PUSH1 32 PUSH1 0 RETURN
        let code = vec![0x60, 0x00, 0x49, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert!(U256::from_big_endian(result.output.as_slice()).is_zero());
    }

    #[test]
    fn create_deploys_contract_and_pushes_address() {
        // init code: PUSH1 1 PUSH1 0 MSTORE8 PUSH1 1 PUSH1 0 RETURN (deploys [0x01])
        let init_code = vec![0x60, 0x01, 0x60, 0x00, 0x53, 0x60, 0x01, 0x60, 0x00, 0xF3];
        let mut code = Vec::new();
        for byte in &init_code {
            code.push(0x60);
            code.push(*byte);
        }
        // store init code into memory starting at 0, then CREATE(0, 0, len)
        let mut full = Vec::new();
        for (i, byte) in init_code.iter().enumerate() {
            full.extend_from_slice(&[0x60, *byte, 0x60, i as u8, 0x53]); // PUSH1 byte PUSH1 i MSTORE8
        }
        full.extend_from_slice(&[
            0x60,
            init_code.len() as u8,
            0x60,
            0x00,
            0x60,
            0x00,
            0xF0, // CREATE
        ]);

        let backend = InMemoryState::new();
        backend.set_balance(addr(1), U256::from(1000));
        let mut ctx = ExecutionContext::default();
        ctx.address = addr(1);
        let mut state = State::new(&backend, ctx.block.clone());
        let config = VmConfig::default();
        let mut interp = Interpreter::new(ctx, Bytes::from_vec(full), &mut state, &config);
        let result = interp.execute().unwrap();
        assert!(result.success);
    }

    #[test]
    fn addmod_stack_result_is_four() {
        let code = vec![0x60, 0x08, 0x60, 0x0a, 0x60, 0x0a, 0x08, 0x60, 0x00, 0x52, 0x60, 0x20, 0x60, 0x00, 0xF3];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(U256::from_big_endian(result.output.as_slice()), U256::from(4));
    }

    #[test]
    fn counter_loop_decrements_to_zero_via_jumpi() {
        // mem[0] = 5; while mem[0] != 0 { mem[0] -= 1 }; return mem[0]
        let code = vec![
            0x60, 0x05, // PUSH1 5
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE      mem[0] = 5
            0x5b, // JUMPDEST    pc=5, loop head
            0x60, 0x01, // PUSH1 1
            0x60, 0x00, // PUSH1 0
            0x51, // MLOAD       push mem[0]
            0x03, // SUB         counter - 1
            0x80, // DUP1
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE      mem[0] = counter - 1
            0x15, // ISZERO
            0x15, // ISZERO      1 while not yet zero
            0x60, 0x05, // PUSH1 5  (loop head)
            0x57, // JUMPI
            0x60, 0x20, // PUSH1 32
            0x60, 0x00, // PUSH1 0
            0xF3, // RETURN
        ];
        let result = exec(&code, ExecutionContext::default()).unwrap();
        assert!(result.success);
        assert_eq!(result.output.len(), 32);
        assert!(U256::from_big_endian(result.output.as_slice()).is_zero());
    }

    /// CREATE2(0, 0, init_code.len(), salt=0) against init code that deploys
    /// nothing; the deployed address is copied to mem[0..32] and returned so
    /// the caller can tell a collision (address 0) from a fresh deployment.
    fn deploy_returning_empty_via_create2(
        state: &mut State<'_, InMemoryState>,
        config: &VmConfig,
        sender: Address,
    ) -> Result<ExecutionResult, VmError> {
        let init_code = vec![0x60, 0x00, 0x60, 0x00, 0xF3];
        let mut full = Vec::new();
        for (i, byte) in init_code.iter().enumerate() {
            full.extend_from_slice(&[0x60, *byte, 0x60, i as u8, 0x53]); // PUSH1 byte PUSH1 i MSTORE8
        }
        full.extend_from_slice(&[
            0x60, 0x00, // PUSH1 0   salt
            0x60, init_code.len() as u8, // PUSH1 size
            0x60, 0x00, // PUSH1 offset
            0x60, 0x00, // PUSH1 value
            0xF5, // CREATE2
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE      mem[0] = new address (or 0 on collision)
            0x60, 0x20, // PUSH1 32
            0x60, 0x00, // PUSH1 0
            0xF3, // RETURN
        ]);

        let mut ctx = ExecutionContext::default();
        ctx.address = sender;
        let mut interp = Interpreter::new(ctx, Bytes::from_vec(full), state, config);
        interp.execute()
    }

    #[test]
    fn create2_is_deterministic_and_collides_on_retry() {
        let backend = InMemoryState::new();
        backend.set_balance(addr(1), U256::from(1_000));
        let config = VmConfig::default();

        let mut state = State::new(&backend, crate::domain::entities::BlockContext::default());
        let first = deploy_returning_empty_via_create2(&mut state, &config, addr(1)).unwrap();
        assert!(first.success);
        state.commit_transaction().unwrap();

        let init_code = vec![0x60, 0x00, 0x60, 0x00, 0xF3];
        let expected = compute_contract_address_create2(addr(1), Hash::new([0u8; 32]), &init_code);
        let first_address = U256::from_big_endian(first.output.as_slice());
        assert_eq!(u256_to_address(first_address), expected);
        assert!(backend.account_exists(expected).unwrap());

        let mut state = State::new(&backend, crate::domain::entities::BlockContext::default());
        let second = deploy_returning_empty_via_create2(&mut state, &config, addr(1)).unwrap();
        assert!(second.success, "CREATE2 never errors at the opcode level, it pushes 0 on collision");
        assert!(
            U256::from_big_endian(second.output.as_slice()).is_zero(),
            "a second CREATE2 with identical inputs must collide"
        );
    }

    #[test]
    fn revert_in_child_call_leaves_caller_state_untouched() {
        // child: REVERT with a 32-byte word holding 0x2A
        let child_code = vec![
            0x60, 0x2a, // PUSH1 42
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE
            0x60, 0x20, // PUSH1 32
            0x60, 0x00, // PUSH1 0
            0xFD, // REVERT
        ];
        let backend = InMemoryState::new();
        backend.set_balance(addr(1), U256::from(1_000));
        let target = addr(42);
        backend.set_code(target, Bytes::from_vec(child_code)).unwrap();
        // pre-existing storage on the caller must survive the child revert.
        backend
            .set_storage(addr(1), StorageKey::from_u256(U256::from(9)), StorageValue::from_u256(U256::from(777)))
            .unwrap();

        // parent: CALL(gas, target, 0, 0, 0, 0, 0); RETURNDATACOPY(0, 0, 32); RETURN(0, 32)
        let mut parent_code = vec![
            0x60, 0x00, // PUSH1 0   retSize
            0x60, 0x00, // PUSH1 0   retOffset
            0x60, 0x00, // PUSH1 0   argsSize
            0x60, 0x00, // PUSH1 0   argsOffset
            0x60, 0x00, // PUSH1 0   value
        ];
        parent_code.extend_from_slice(&[0x73]); // PUSH20 target
        parent_code.extend_from_slice(target.as_bytes());
        parent_code.extend_from_slice(&[
            0x60, 0x00, // PUSH1 0   gas
            0xF1, // CALL
        ]);
        // stack now: [call_success]. Store it at mem[64] so we can inspect it,
        // then RETURNDATACOPY the 32-byte revert reason into mem[0..32].
        parent_code.extend_from_slice(&[
            0x60, 0x40, // PUSH1 64
            0x52, // MSTORE       mem[64] = call_success
            0x60, 0x20, // PUSH1 32  size
            0x60, 0x00, // PUSH1 0   returndata offset
            0x60, 0x00, // PUSH1 0   dest offset
            0x3E, // RETURNDATACOPY
            0x60, 0x60, // PUSH1 96
            0x60, 0x00, // PUSH1 0
            0xF3, // RETURN
        ]);

        // The RETURN at the tail returns mem[0..96): 32 bytes revert reason,
        // 32 bytes of zero padding, 32 bytes call_success.
        let mut ctx = ExecutionContext::default();
        ctx.address = addr(1);
        let backend_ref = &backend;
        let mut state = State::new(backend_ref, ctx.block.clone());
        let config = VmConfig::default();
        let mut interp = Interpreter::new(ctx, Bytes::from_vec(parent_code), &mut state, &config);
        let result = interp.execute().unwrap();
        assert!(result.success);
        assert_eq!(result.output.len(), 96);
        assert_eq!(U256::from_big_endian(&result.output.as_slice()[0..32]), U256::from(42));
        assert!(U256::from_big_endian(&result.output.as_slice()[64..96]).is_zero(), "CALL must report failure");

        // caller's pre-existing storage is untouched by the reverted child.
        assert_eq!(
            state.get_storage(addr(1), StorageKey::from_u256(U256::from(9))).unwrap(),
            StorageValue::from_u256(U256::from(777))
        );
    }

    #[test]
    fn staticcall_into_sstore_fails_without_mutating_caller() {
        // child: SSTORE(0, 1) then STOP
        let child_code = vec![0x60, 0x01, 0x60, 0x00, 0x55, 0x00];
        let backend = InMemoryState::new();
        let target = addr(42);
        backend.set_code(target, Bytes::from_vec(child_code)).unwrap();

        // parent: STATICCALL(gas, target, 0, 0, 0, 0); store success flag; RETURN
        let mut parent_code = vec![
            0x60, 0x00, // PUSH1 0 retSize
            0x60, 0x00, // PUSH1 0 retOffset
            0x60, 0x00, // PUSH1 0 argsSize
            0x60, 0x00, // PUSH1 0 argsOffset
        ];
        parent_code.push(0x73); // PUSH20 target
        parent_code.extend_from_slice(target.as_bytes());
        parent_code.extend_from_slice(&[
            0x60, 0x00, // PUSH1 0 gas
            0xFA, // STATICCALL
            0x60, 0x00, // PUSH1 0
            0x52, // MSTORE   mem[0] = call_success
            0x60, 0x20, // PUSH1 32
            0x60, 0x00, // PUSH1 0
            0xF3, // RETURN
        ]);

        let mut ctx = ExecutionContext::default();
        ctx.address = addr(1);
        let mut state = State::new(&backend, ctx.block.clone());
        let config = VmConfig::default();
        let mut interp = Interpreter::new(ctx, Bytes::from_vec(parent_code), &mut state, &config);
        let result = interp.execute().unwrap();
        assert!(result.success);
        assert!(
            U256::from_big_endian(result.output.as_slice()).is_zero(),
            "STATICCALL into a state-mutating child must report failure"
        );
        assert!(state
            .get_storage(target, StorageKey::from_u256(U256::zero()))
            .unwrap()
            .is_zero());
    }
}
