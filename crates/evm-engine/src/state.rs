//! # Transaction State
//!
//! `State` is the one object the interpreter threads through an entire
//! top-level transaction, recursive sub-calls included: the journaled
//! account/code/storage overlay (`account_db::AccountDB`), transient storage
//! (EIP-1153), which addresses were created within this transaction (needed
//! to get CANCUN SELFDESTRUCT right), the log buffer, and the step counter
//! that stands in for gas metering.
//!
//! A single `checkpoint()`/`commit(id)`/`discard(id)` triple fans out across
//! every piece so a CALL-family opcode only has to manage one checkpoint id,
//! not one per sub-component.

use crate::account_db::AccountDB;
use crate::domain::entities::{AccountState, BlockContext, Log};
use crate::domain::value_objects::{Address, Bytes, StorageKey, StorageValue, U256};
use crate::errors::{StateError, VmError};
use crate::evm::transient::TransientStorage;
use crate::journal::Overlay;
use crate::ports::outbound::StateAccess;

/// Journaled state for one top-level transaction.
pub struct State<'a, S: StateAccess> {
    /// Block the transaction executes in.
    pub block: BlockContext,
    accounts: AccountDB<'a, S>,
    transient: TransientStorage,
    created_this_tx: Overlay<Address, ()>,
    logs: Vec<Log>,
    log_marks: Vec<usize>,
    steps: u64,
    depth: usize,
}

impl<'a, S: StateAccess> State<'a, S> {
    /// Creates fresh transaction state backed by `backend`.
    #[must_use]
    pub fn new(backend: &'a S, block: BlockContext) -> Self {
        Self {
            block,
            accounts: AccountDB::new(backend),
            transient: TransientStorage::new(),
            created_this_tx: Overlay::new(),
            logs: Vec::new(),
            log_marks: Vec::new(),
            steps: 0,
            depth: 0,
        }
    }

    // =========================================================================
    // ACCOUNTS
    // =========================================================================

    /// Reads an account record, falling through to the backend on a miss.
    /// `None` means the account has never been touched.
    pub fn get_account(&self, address: Address) -> Result<Option<AccountState>, StateError> {
        self.accounts.get_account(address)
    }

    /// Reads an account's balance (zero if never touched).
    pub fn get_balance(&self, address: Address) -> Result<U256, StateError> {
        self.accounts.get_balance(address)
    }

    /// Sets an account's balance directly.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), StateError> {
        self.accounts.set_balance(address, balance)
    }

    /// Moves `amount` from `from` to `to`.
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), StateError> {
        self.accounts.transfer(from, to, amount)
    }

    /// Reads an account's nonce (zero if never touched).
    pub fn get_nonce(&self, address: Address) -> Result<u64, StateError> {
        self.accounts.get_nonce(address)
    }

    /// Increments an account's nonce by one, returning the new value.
    pub fn increment_nonce(&mut self, address: Address) -> Result<u64, StateError> {
        self.accounts.increment_nonce(address)
    }

    /// Reads contract code (empty for an EOA or untouched address).
    pub fn get_code(&self, address: Address) -> Result<Bytes, StateError> {
        self.accounts.get_code(address)
    }

    /// Sets contract code for `address` (CREATE/CREATE2 on success).
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        self.accounts.set_code(address, code)
    }

    /// Reads a storage slot (zero if never written).
    pub fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError> {
        self.accounts.get_storage(address, key)
    }

    /// Writes a storage slot.
    pub fn set_storage(&mut self, address: Address, key: StorageKey, value: StorageValue) -> Result<(), StateError> {
        self.accounts.set_storage(address, key, value)
    }

    /// Clears an account entirely (CANCUN SELFDESTRUCT, only ever called for
    /// an address this transaction itself created -- see
    /// `was_created_this_tx`).
    pub fn delete_account(&mut self, address: Address) -> Result<(), StateError> {
        self.accounts.delete_account(address)
    }

    /// True if the account has ever been touched.
    pub fn account_exists(&self, address: Address) -> Result<bool, StateError> {
        self.accounts.account_exists(address)
    }

    /// True if the account is empty or has never been touched (EIP-161).
    pub fn account_is_empty(&self, address: Address) -> Result<bool, StateError> {
        self.accounts.account_is_empty(address)
    }

    // =========================================================================
    // CREATED-THIS-TRANSACTION TRACKING
    // =========================================================================

    /// Records that `address` was created by CREATE/CREATE2 within this
    /// transaction. SELFDESTRUCT only actually deletes an account for which
    /// this is true (CANCUN, EIP-6780); otherwise it only moves the balance.
    pub fn mark_created_this_tx(&mut self, address: Address) {
        self.created_this_tx.set(address, ());
    }

    /// Whether `address` was created within this transaction.
    #[must_use]
    pub fn was_created_this_tx(&self, address: Address) -> bool {
        matches!(self.created_this_tx.get(&address), Some(Some(())))
    }

    // =========================================================================
    // TRANSIENT STORAGE (EIP-1153)
    // =========================================================================

    /// Loads from transient storage (zero if never written).
    #[must_use]
    pub fn tload(&self, address: Address, key: StorageKey) -> StorageValue {
        self.transient.tload(&address, &key)
    }

    /// Stores to transient storage.
    pub fn tstore(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.transient.tstore(address, key, value);
    }

    // =========================================================================
    // LOGS
    // =========================================================================

    /// Appends a log (LOG0..LOG4).
    pub fn push_log(&mut self, log: Log) {
        self.logs.push(log);
    }

    // =========================================================================
    // STEP COUNTER (gas-metering stand-in)
    // =========================================================================

    /// Advances the step counter shared across the whole call tree and
    /// errors once it passes `max`. This is the only halting backstop a
    /// non-terminating loop runs into, since the engine does not meter gas.
    pub fn step(&mut self, max: u64) -> Result<(), VmError> {
        self.steps += 1;
        if self.steps > max {
            return Err(VmError::Timeout {
                steps: self.steps,
                max,
            });
        }
        Ok(())
    }

    // =========================================================================
    // CHECKPOINTING
    // =========================================================================

    /// Opens a checkpoint across every journaled component. Returns the id to
    /// pass back to `commit`/`discard`.
    pub fn checkpoint(&mut self) -> usize {
        self.accounts.checkpoint();
        self.transient.checkpoint();
        self.created_this_tx.checkpoint();
        self.log_marks.push(self.logs.len());
        self.depth += 1;
        self.depth
    }

    /// Folds the top checkpoint into its parent.
    pub fn commit(&mut self, id: usize) -> Result<(), VmError> {
        self.expect_top(id)?;
        self.accounts.commit(id)?;
        self.transient.commit(id).map_err(StateError::from)?;
        self.created_this_tx.commit(id).map_err(StateError::from)?;
        self.log_marks.pop();
        self.depth -= 1;
        Ok(())
    }

    /// Drops the top checkpoint and everything written under it.
    pub fn discard(&mut self, id: usize) -> Result<(), VmError> {
        self.expect_top(id)?;
        self.accounts.discard(id)?;
        self.transient.discard(id).map_err(StateError::from)?;
        self.created_this_tx.discard(id).map_err(StateError::from)?;
        if let Some(mark) = self.log_marks.pop() {
            self.logs.truncate(mark);
        }
        self.depth -= 1;
        Ok(())
    }

    fn expect_top(&self, id: usize) -> Result<(), VmError> {
        if id != self.depth {
            return Err(VmError::Internal(format!(
                "checkpoint id {id} does not match current depth {}",
                self.depth
            )));
        }
        Ok(())
    }

    /// Current checkpoint depth (0 = no open checkpoints).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    // =========================================================================
    // TRANSACTION BOUNDARIES
    // =========================================================================

    /// Folds every open checkpoint and flushes the journal to the backend.
    /// Called once, when the top-level transaction succeeds. Returns the
    /// logs emitted, in emission order.
    pub fn commit_transaction(&mut self) -> Result<Vec<Log>, StateError> {
        self.accounts.persist()?;
        self.transient.clear();
        self.created_this_tx = Overlay::new();
        self.log_marks.clear();
        self.depth = 0;
        Ok(std::mem::take(&mut self.logs))
    }

    /// Drops every open checkpoint and every write made since the backend's
    /// state. Called when the top-level transaction fails entirely.
    pub fn revert_transaction(&mut self) {
        self.accounts.revert_all();
        self.transient.clear();
        self.created_this_tx = Overlay::new();
        self.logs.clear();
        self.log_marks.clear();
        self.depth = 0;
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::state_adapter::InMemoryState;
    use crate::domain::value_objects::Hash;

    fn addr(n: u8) -> Address {
        let mut bytes = [0u8; 20];
        bytes[19] = n;
        Address::new(bytes)
    }

    #[test]
    fn checkpoint_discard_rolls_back_everything() {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, BlockContext::default());
        state.set_balance(addr(1), U256::from(10)).unwrap();
        state.tstore(addr(1), StorageKey::from_u256(U256::from(1)), StorageValue::from_u256(U256::from(5)));

        let cp = state.checkpoint();
        state.set_balance(addr(1), U256::from(99)).unwrap();
        state.tstore(addr(1), StorageKey::from_u256(U256::from(1)), StorageValue::from_u256(U256::from(6)));
        state.push_log(Log::new(addr(1), vec![], Bytes::new()));
        state.discard(cp).unwrap();

        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(10));
        assert_eq!(
            state.tload(addr(1), StorageKey::from_u256(U256::from(1))),
            StorageValue::from_u256(U256::from(5))
        );
    }

    #[test]
    fn commit_keeps_nested_writes_and_logs() {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, BlockContext::default());

        let cp = state.checkpoint();
        state.set_balance(addr(1), U256::from(7)).unwrap();
        state.push_log(Log::new(addr(1), vec![Hash::ZERO], Bytes::new()));
        state.commit(cp).unwrap();

        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::from(7));
        let logs = state.commit_transaction().unwrap();
        assert_eq!(logs.len(), 1);
    }

    #[test]
    fn created_this_tx_tracking_is_checkpoint_safe() {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, BlockContext::default());

        let cp = state.checkpoint();
        state.mark_created_this_tx(addr(9));
        assert!(state.was_created_this_tx(addr(9)));
        state.discard(cp).unwrap();

        assert!(!state.was_created_this_tx(addr(9)));
    }

    #[test]
    fn step_counter_trips_timeout() {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, BlockContext::default());
        state.step(2).unwrap();
        state.step(2).unwrap();
        assert!(state.step(2).is_err());
    }

    #[test]
    fn revert_transaction_discards_open_checkpoints() {
        let backend = InMemoryState::new();
        let mut state = State::new(&backend, BlockContext::default());
        state.checkpoint();
        state.set_balance(addr(1), U256::from(500)).unwrap();
        state.revert_transaction();

        assert_eq!(state.depth(), 0);
        assert_eq!(state.get_balance(addr(1)).unwrap(), U256::zero());
    }
}
