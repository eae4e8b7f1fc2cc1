//! # Transient Storage (EIP-1153)
//!
//! Backs the TLOAD/TSTORE opcodes. Transient storage behaves like regular
//! storage except it is never read from or written to the persistent state
//! backend: it starts empty for every transaction and is discarded (not
//! committed) once the transaction finishes, success or not.
//!
//! It still needs checkpoint/commit/discard, though: a reverted sub-call
//! must undo only the TSTOREs it made, not the ones a sibling or parent call
//! made before it. It is built on the same layered overlay as
//! `account_db::AccountDB`, with one overlay per contract address, opened
//! lazily and kept at the same checkpoint depth as every other overlay so a
//! single `checkpoint()`/`commit(id)`/`discard(id)` triple fans out across
//! all of them.

use crate::domain::value_objects::{Address, StorageKey, StorageValue};
use crate::journal::{JournalError, Overlay};
use std::collections::HashMap;

/// Transient storage for a single transaction.
#[derive(Debug, Clone)]
pub struct TransientStorage {
    data: HashMap<Address, Overlay<StorageKey, StorageValue>>,
    depth: usize,
}

impl TransientStorage {
    /// Creates a new empty transient storage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            data: HashMap::new(),
            depth: 0,
        }
    }

    fn overlay_mut(&mut self, address: Address) -> &mut Overlay<StorageKey, StorageValue> {
        let depth = self.depth;
        self.data.entry(address).or_insert_with(|| {
            let mut overlay = Overlay::new();
            for _ in 0..depth {
                overlay.checkpoint();
            }
            overlay
        })
    }

    /// Load a value from transient storage (TLOAD). Returns zero if the key
    /// has not been set.
    #[must_use]
    pub fn tload(&self, address: &Address, key: &StorageKey) -> StorageValue {
        self.data
            .get(address)
            .and_then(|overlay| overlay.get(key))
            .flatten()
            .copied()
            .unwrap_or_default()
    }

    /// Store a value in transient storage (TSTORE).
    pub fn tstore(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        self.overlay_mut(address).set(key, value);
    }

    /// Opens a checkpoint across every contract's overlay. Returns the
    /// checkpoint id to pass back to `commit`/`discard`.
    pub fn checkpoint(&mut self) -> usize {
        for overlay in self.data.values_mut() {
            overlay.checkpoint();
        }
        self.depth += 1;
        self.depth
    }

    /// Folds the top checkpoint into its parent, across every contract.
    pub fn commit(&mut self, id: usize) -> Result<(), JournalError> {
        if id != self.depth {
            return Err(JournalError::CheckpointMismatch(id, self.depth));
        }
        for overlay in self.data.values_mut() {
            overlay.commit(id)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Drops the top checkpoint and everything written under it, across
    /// every contract.
    pub fn discard(&mut self, id: usize) -> Result<(), JournalError> {
        if id != self.depth {
            return Err(JournalError::CheckpointMismatch(id, self.depth));
        }
        for overlay in self.data.values_mut() {
            overlay.discard(id)?;
        }
        self.depth -= 1;
        Ok(())
    }

    /// Clears all transient storage (called at the end of a transaction,
    /// whether it succeeded or reverted -- EIP-1153 does not carry transient
    /// storage across transaction boundaries either way).
    pub fn clear(&mut self) {
        self.data.clear();
        self.depth = 0;
    }

    /// Number of contracts with any transient storage entries.
    #[must_use]
    pub fn contract_count(&self) -> usize {
        self.data.len()
    }
}

impl Default for TransientStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl crate::ports::outbound::TransientStorage for TransientStorage {
    fn tload(&self, address: Address, key: StorageKey) -> StorageValue {
        TransientStorage::tload(self, &address, &key)
    }

    fn tstore(&mut self, address: Address, key: StorageKey, value: StorageValue) {
        TransientStorage::tstore(self, address, key, value);
    }

    fn clear(&mut self) {
        TransientStorage::clear(self);
    }
}

// =============================================================================
// TESTS
// =============================================================================
