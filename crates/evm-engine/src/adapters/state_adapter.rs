//! # In-memory state adapter
//!
//! A synchronous, non-durable `StateAccess` implementation for tests and for
//! embedding this engine without a persistent backend. `AccountDB` treats
//! this (or `RocksDbBackend`) as the backing store its journal overlays
//! fall through to on a miss.

use crate::domain::entities::AccountState;
use crate::domain::value_objects::{Address, Bytes, StorageKey, StorageValue, U256};
use crate::errors::StateError;
use crate::ports::outbound::StateAccess;
use std::collections::HashMap;
use std::sync::RwLock;

/// In-memory backing store.
#[derive(Debug, Default)]
pub struct InMemoryState {
    accounts: RwLock<HashMap<Address, AccountState>>,
    code: RwLock<HashMap<Address, Bytes>>,
    storage: RwLock<HashMap<(Address, StorageKey), StorageValue>>,
}

impl InMemoryState {
    /// Creates a new empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets balance for an address, creating an EOA entry if needed.
    pub fn set_balance(&self, address: Address, balance: U256) {
        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .entry(address)
            .or_insert_with(|| AccountState::new_eoa(U256::zero(), 0));
        account.balance = balance;
    }

    /// Sets a storage value directly (test/genesis seeding).
    pub fn set_storage_value(&self, address: Address, key: StorageKey, value: StorageValue) {
        self.storage.write().unwrap().insert((address, key), value);
    }

    /// True if a raw row exists for `(address, key)`, distinct from reading
    /// back zero for an absent slot. Test-only: asserts the backend actually
    /// deletes rather than zeroing a slot on `delete_storage`.
    pub fn has_storage_row(&self, address: Address, key: StorageKey) -> bool {
        self.storage.read().unwrap().contains_key(&(address, key))
    }
}

impl StateAccess for InMemoryState {
    fn get_account(&self, address: Address) -> Result<Option<AccountState>, StateError> {
        Ok(self.accounts.read().unwrap().get(&address).cloned())
    }

    fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError> {
        Ok(self
            .storage
            .read()
            .unwrap()
            .get(&(address, key))
            .copied()
            .unwrap_or(StorageValue::ZERO))
    }

    fn set_storage(
        &self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError> {
        self.storage.write().unwrap().insert((address, key), value);
        Ok(())
    }

    fn delete_storage(&self, address: Address, key: StorageKey) -> Result<(), StateError> {
        self.storage.write().unwrap().remove(&(address, key));
        Ok(())
    }

    fn get_code(&self, address: Address) -> Result<Bytes, StateError> {
        Ok(self
            .code
            .read()
            .unwrap()
            .get(&address)
            .cloned()
            .unwrap_or_default())
    }

    fn set_account(&self, address: Address, account: AccountState) -> Result<(), StateError> {
        self.accounts.write().unwrap().insert(address, account);
        Ok(())
    }

    fn set_code(&self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = if code.is_empty() {
            AccountState::EMPTY_CODE_HASH
        } else {
            crate::domain::services::keccak256(code.as_slice())
        };

        let mut accounts = self.accounts.write().unwrap();
        let account = accounts
            .entry(address)
            .or_insert_with(|| AccountState::new_eoa(U256::zero(), 0));
        account.code_hash = code_hash;
        drop(accounts);

        self.code.write().unwrap().insert(address, code);
        Ok(())
    }

    fn delete_account(&self, address: Address) -> Result<(), StateError> {
        self.accounts.write().unwrap().remove(&address);
        self.code.write().unwrap().remove(&address);
        self.storage.write().unwrap().retain(|(a, _), _| *a != address);
        Ok(())
    }

    fn account_exists(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.accounts.read().unwrap().contains_key(&address))
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_balance() {
        let state = InMemoryState::new();
        let addr = Address::new([1u8; 20]);

        let account = state.get_account(addr).unwrap();
        assert!(account.is_none());

        state.set_balance(addr, U256::from(1000));

        let balance = state.get_balance(addr).unwrap();
        assert_eq!(balance, U256::from(1000));
    }

    #[test]
    fn test_get_set_storage() {
        let state = InMemoryState::new();
        let addr = Address::new([1u8; 20]);
        let key = StorageKey::new([0u8; 32]);

        let value = state.get_storage(addr, key).unwrap();
        assert!(value.is_zero());

        let new_value = StorageValue::from_u256(U256::from(42));
        state.set_storage(addr, key, new_value).unwrap();

        let value = state.get_storage(addr, key).unwrap();
        assert_eq!(value.to_u256(), U256::from(42));
    }

    #[test]
    fn test_get_set_code() {
        let state = InMemoryState::new();
        let addr = Address::new([1u8; 20]);
        let code = Bytes::from_slice(&[0x60, 0x00, 0x60, 0x00, 0xF3]);

        state.set_code(addr, code.clone()).unwrap();

        let retrieved = state.get_code(addr).unwrap();
        assert_eq!(retrieved.as_slice(), code.as_slice());

        let account = state.get_account(addr).unwrap().unwrap();
        assert_ne!(account.code_hash, AccountState::EMPTY_CODE_HASH);
    }

    #[test]
    fn test_account_exists() {
        let state = InMemoryState::new();
        let addr = Address::new([1u8; 20]);

        assert!(!state.account_exists(addr).unwrap());

        state.set_balance(addr, U256::from(1));
        assert!(state.account_exists(addr).unwrap());
    }
}
