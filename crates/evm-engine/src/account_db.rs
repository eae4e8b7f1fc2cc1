//! # AccountDB
//!
//! The journaled view of accounts, code and storage that sits in front of a
//! `StateAccess` backend. Every read falls through the overlay to the
//! backend on a miss; every write lands in the current checkpoint layer and
//! only reaches the backend when the top-level transaction commits.
//!
//! Three overlays, kept at the same checkpoint depth so a single
//! `checkpoint()`/`commit(id)`/`discard(id)` fans out across all of them:
//! account records (balance/nonce/code_hash), code keyed by address (mirrors
//! `StateAccess::get_code`/`set_code`, which are address-keyed rather than
//! content-addressed), and one per-address storage overlay, opened lazily --
//! the same layering `evm::transient::TransientStorage` uses for transient
//! storage.

use crate::domain::entities::AccountState;
use crate::domain::services::keccak256;
use crate::domain::value_objects::{Address, Bytes, StorageKey, StorageValue, U256};
use crate::errors::StateError;
use crate::journal::Overlay;
use crate::ports::outbound::StateAccess;
use std::collections::HashMap;

/// Journaled account/code/storage overlay over a `StateAccess` backend.
pub struct AccountDB<'a, S: StateAccess> {
    backend: &'a S,
    accounts: Overlay<Address, AccountState>,
    code: Overlay<Address, Bytes>,
    storage: HashMap<Address, Overlay<StorageKey, StorageValue>>,
    depth: usize,
}

impl<'a, S: StateAccess> AccountDB<'a, S> {
    /// Creates a new overlay with no open checkpoints, backed by `backend`.
    pub fn new(backend: &'a S) -> Self {
        Self {
            backend,
            accounts: Overlay::new(),
            code: Overlay::new(),
            storage: HashMap::new(),
            depth: 0,
        }
    }

    fn storage_overlay_mut(&mut self, address: Address) -> &mut Overlay<StorageKey, StorageValue> {
        let depth = self.depth;
        self.storage.entry(address).or_insert_with(|| {
            let mut overlay = Overlay::new();
            for _ in 0..depth {
                overlay.checkpoint();
            }
            overlay
        })
    }

    /// Reads an account record, falling through to the backend on a miss.
    /// `None` means the account has never been touched.
    pub fn get_account(&self, address: Address) -> Result<Option<AccountState>, StateError> {
        match self.accounts.get(&address) {
            Some(v) => Ok(v.cloned()),
            None => self.backend.get_account(address),
        }
    }

    fn account_or_default(&self, address: Address) -> Result<AccountState, StateError> {
        Ok(self.get_account(address)?.unwrap_or_default())
    }

    /// Reads an account's balance (zero if never touched).
    pub fn get_balance(&self, address: Address) -> Result<U256, StateError> {
        Ok(self.account_or_default(address)?.balance)
    }

    /// Sets an account's balance, creating an entry if necessary.
    pub fn set_balance(&mut self, address: Address, balance: U256) -> Result<(), StateError> {
        let mut account = self.account_or_default(address)?;
        account.balance = balance;
        self.accounts.set(address, account);
        Ok(())
    }

    /// Moves `amount` from `from` to `to`. No-op if `amount` is zero.
    pub fn transfer(&mut self, from: Address, to: Address, amount: U256) -> Result<(), StateError> {
        if amount.is_zero() {
            return Ok(());
        }
        let from_balance = self.get_balance(from)?;
        if from_balance < amount {
            return Err(StateError::Other(format!(
                "insufficient balance: {from:?} has {from_balance}, needs {amount}"
            )));
        }
        self.set_balance(from, from_balance - amount)?;
        let to_balance = self.get_balance(to)?;
        self.set_balance(to, to_balance + amount)?;
        Ok(())
    }

    /// Reads an account's nonce (zero if never touched).
    pub fn get_nonce(&self, address: Address) -> Result<u64, StateError> {
        Ok(self.account_or_default(address)?.nonce)
    }

    /// Sets an account's nonce directly.
    pub fn set_nonce(&mut self, address: Address, nonce: u64) -> Result<(), StateError> {
        let mut account = self.account_or_default(address)?;
        account.nonce = nonce;
        self.accounts.set(address, account);
        Ok(())
    }

    /// Increments an account's nonce by one (CREATE, on successful deploy).
    pub fn increment_nonce(&mut self, address: Address) -> Result<u64, StateError> {
        let nonce = self.get_nonce(address)?.saturating_add(1);
        self.set_nonce(address, nonce)?;
        Ok(nonce)
    }

    /// Reads contract code (empty for an EOA or untouched address).
    pub fn get_code(&self, address: Address) -> Result<Bytes, StateError> {
        match self.code.get(&address) {
            Some(Some(code)) => Ok(code.clone()),
            Some(None) => Ok(Bytes::new()),
            None => self.backend.get_code(address),
        }
    }

    /// Sets contract code and keeps the account's `code_hash` in sync.
    pub fn set_code(&mut self, address: Address, code: Bytes) -> Result<(), StateError> {
        let code_hash = if code.is_empty() {
            AccountState::EMPTY_CODE_HASH
        } else {
            keccak256(code.as_slice())
        };
        let mut account = self.account_or_default(address)?;
        account.code_hash = code_hash;
        self.accounts.set(address, account);
        self.code.set(address, code);
        Ok(())
    }

    /// Reads a storage slot (zero if never written).
    pub fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError> {
        if let Some(overlay) = self.storage.get(&address) {
            if let Some(v) = overlay.get(&key) {
                return Ok(v.copied().unwrap_or(StorageValue::ZERO));
            }
        }
        self.backend.get_storage(address, key)
    }

    /// Writes a storage slot. Writing zero records an explicit deletion
    /// rather than a zero value, so `delete_account` (and a committed
    /// persist) can tell "never written" apart from "written to zero" --
    /// observably identical, but it keeps the overlay from growing forever
    /// on repeated zero-writes to the same key.
    pub fn set_storage(&mut self, address: Address, key: StorageKey, value: StorageValue) -> Result<(), StateError> {
        let overlay = self.storage_overlay_mut(address);
        if value.is_zero() {
            overlay.remove(key);
        } else {
            overlay.set(key, value);
        }
        Ok(())
    }

    /// Clears an account's balance, nonce, code and every storage slot it
    /// has ever held through this overlay (CANCUN SELFDESTRUCT --
    /// only ever called for an address created within the same transaction,
    /// so nothing for it is persisted in the backend yet and this overlay
    /// has seen every key it owns).
    pub fn delete_account(&mut self, address: Address) -> Result<(), StateError> {
        self.accounts.remove(address);
        self.code.remove(address);
        let keys = self
            .storage
            .get(&address)
            .map(Overlay::keys_seen)
            .unwrap_or_default();
        let overlay = self.storage_overlay_mut(address);
        for key in keys {
            overlay.remove(key);
        }
        Ok(())
    }

    /// True if the account has ever been touched.
    pub fn account_exists(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_account(address)?.is_some())
    }

    /// True if the account is empty (zero balance, zero nonce, no code) or
    /// has never been touched -- the EIP-161 "does not exist" test.
    pub fn account_is_empty(&self, address: Address) -> Result<bool, StateError> {
        match self.get_account(address)? {
            Some(account) => Ok(account.is_empty()),
            None => Ok(true),
        }
    }

    /// Opens a checkpoint across account, code and every open per-address
    /// storage overlay. Returns the checkpoint id to pass back to
    /// `commit`/`discard`.
    pub fn checkpoint(&mut self) -> usize {
        self.accounts.checkpoint();
        self.code.checkpoint();
        for overlay in self.storage.values_mut() {
            overlay.checkpoint();
        }
        self.depth += 1;
        self.depth
    }

    /// Folds the top checkpoint into its parent, across every overlay.
    pub fn commit(&mut self, id: usize) -> Result<(), StateError> {
        if id != self.depth {
            return Err(StateError::Other(format!(
                "checkpoint id {id} does not match current depth {}",
                self.depth
            )));
        }
        self.accounts.commit(id)?;
        self.code.commit(id)?;
        for overlay in self.storage.values_mut() {
            overlay.commit(id)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Drops the top checkpoint and everything written under it, across
    /// every overlay.
    pub fn discard(&mut self, id: usize) -> Result<(), StateError> {
        if id != self.depth {
            return Err(StateError::Other(format!(
                "checkpoint id {id} does not match current depth {}",
                self.depth
            )));
        }
        self.accounts.discard(id)?;
        self.code.discard(id)?;
        for overlay in self.storage.values_mut() {
            overlay.discard(id)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Current checkpoint depth (0 = no open checkpoints).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Folds every open checkpoint down to the base layer and flushes it to
    /// the backend. Called once, when a top-level transaction succeeds.
    pub fn persist(&mut self) -> Result<(), StateError> {
        self.accounts.persist();
        self.code.persist();
        for overlay in self.storage.values_mut() {
            overlay.persist();
        }
        self.depth = 0;

        let account_writes: Vec<(Address, Option<AccountState>)> = self
            .accounts
            .base_iter()
            .map(|(k, v)| (*k, v.cloned()))
            .collect();
        for (address, value) in account_writes {
            match value {
                Some(account) => self.backend.set_account(address, account)?,
                None => self.backend.delete_account(address)?,
            }
        }

        let code_writes: Vec<(Address, Option<Bytes>)> =
            self.code.base_iter().map(|(k, v)| (*k, v.cloned())).collect();
        for (address, value) in code_writes {
            if let Some(code) = value {
                self.backend.set_code(address, code)?;
            }
        }

        for (address, overlay) in &self.storage {
            let storage_writes: Vec<(StorageKey, Option<StorageValue>)> = overlay
                .base_iter()
                .map(|(k, v)| (*k, v.copied()))
                .collect();
            for (key, value) in storage_writes {
                match value {
                    Some(value) => self.backend.set_storage(*address, key, value)?,
                    None => self.backend.delete_storage(*address, key)?,
                }
            }
        }

        Ok(())
    }

    /// Drops every open checkpoint, discarding every write made since the
    /// base layer. Called when a top-level transaction fails entirely.
    pub fn revert_all(&mut self) {
        self.accounts.revert_all();
        self.code.revert_all();
        self.storage.clear();
        self.depth = 0;
    }
}

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
    fn reads_fall_through_to_backend() {
        let backend = InMemoryState::new();
        backend.set_balance(addr(1), U256::from(100));
        let db = AccountDB::new(&backend);
        assert_eq!(db.get_balance(addr(1)).unwrap(), U256::from(100));
    }

    #[test]
    fn checkpoint_discard_rolls_back_balance_and_storage() {
        let backend = InMemoryState::new();
        let mut db = AccountDB::new(&backend);
        db.set_balance(addr(1), U256::from(10)).unwrap();

        let cp = db.checkpoint();
        db.set_balance(addr(1), U256::from(20)).unwrap();
        db.set_storage(addr(1), StorageKey::from_u256(U256::from(1)), StorageValue::from_u256(U256::from(99)))
            .unwrap();
        db.discard(cp).unwrap();

        assert_eq!(db.get_balance(addr(1)).unwrap(), U256::from(10));
        assert!(db
            .get_storage(addr(1), StorageKey::from_u256(U256::from(1)))
            .unwrap()
            .is_zero());
    }

    #[test]
    fn persist_flushes_to_backend() {
        let backend = InMemoryState::new();
        {
            let mut db = AccountDB::new(&backend);
            db.set_balance(addr(1), U256::from(42)).unwrap();
            db.set_code(addr(1), Bytes::from_slice(&[0x60, 0x00])).unwrap();
            db.persist().unwrap();
        }
        assert_eq!(backend.get_balance(addr(1)).unwrap(), U256::from(42));
        assert_eq!(backend.get_code(addr(1)).unwrap().as_slice(), &[0x60, 0x00]);
    }

    #[test]
    fn set_storage_to_zero_persists_as_a_deleted_row() {
        let backend = InMemoryState::new();
        let slot = StorageKey::from_u256(U256::from(1));
        {
            let mut db = AccountDB::new(&backend);
            db.set_storage(addr(1), slot, StorageValue::from_u256(U256::from(0xAB)))
                .unwrap();
            db.set_storage(addr(1), slot, StorageValue::ZERO).unwrap();
            db.persist().unwrap();
        }
        assert!(backend.get_storage(addr(1), slot).unwrap().is_zero());
        assert!(!backend.has_storage_row(addr(1), slot));
    }

    #[test]
    fn transfer_moves_balance() {
        let backend = InMemoryState::new();
        let mut db = AccountDB::new(&backend);
        db.set_balance(addr(1), U256::from(100)).unwrap();
        db.transfer(addr(1), addr(2), U256::from(30)).unwrap();
        assert_eq!(db.get_balance(addr(1)).unwrap(), U256::from(70));
        assert_eq!(db.get_balance(addr(2)).unwrap(), U256::from(30));
    }

    #[test]
    fn transfer_rejects_insufficient_balance() {
        let backend = InMemoryState::new();
        let mut db = AccountDB::new(&backend);
        db.set_balance(addr(1), U256::from(5)).unwrap();
        assert!(db.transfer(addr(1), addr(2), U256::from(10)).is_err());
    }

    #[test]
    fn delete_account_clears_every_slot_it_has_seen() {
        let backend = InMemoryState::new();
        let mut db = AccountDB::new(&backend);
        db.set_balance(addr(1), U256::from(10)).unwrap();
        db.set_code(addr(1), Bytes::from_slice(&[0x00])).unwrap();
        db.set_storage(addr(1), StorageKey::from_u256(U256::from(1)), StorageValue::from_u256(U256::from(7)))
            .unwrap();

        db.delete_account(addr(1)).unwrap();

        assert!(!db.account_exists(addr(1)).unwrap());
        assert!(db.get_code(addr(1)).unwrap().is_empty());
        assert!(db
            .get_storage(addr(1), StorageKey::from_u256(U256::from(1)))
            .unwrap()
            .is_zero());
    }

    #[test]
    fn delete_account_is_reverted_by_an_ancestor_discard() {
        let backend = InMemoryState::new();
        let mut db = AccountDB::new(&backend);
        db.set_storage(addr(1), StorageKey::from_u256(U256::from(1)), StorageValue::from_u256(U256::from(7)))
            .unwrap();

        let cp = db.checkpoint();
        db.delete_account(addr(1)).unwrap();
        assert!(db
            .get_storage(addr(1), StorageKey::from_u256(U256::from(1)))
            .unwrap()
            .is_zero());
        db.discard(cp).unwrap();

        assert_eq!(
            db.get_storage(addr(1), StorageKey::from_u256(U256::from(1))).unwrap(),
            StorageValue::from_u256(U256::from(7))
        );
    }
}
