//! # Driven ports (outbound)
//!
//! Interfaces the engine depends on: reading/writing persisted account and
//! storage state, verifying ECDSA signatures for the ecrecover precompile,
//! and resolving historical block hashes for BLOCKHASH.
//!
//! The engine executes synchronously and depth-first (no cooperative
//! yielding within a frame), so these traits are ordinary, non-`async`
//! methods: a host bridging to an async I/O layer resolves that I/O before
//! calling into the trait, rather than the engine awaiting mid-frame.

use crate::domain::entities::AccountState;
use crate::domain::value_objects::{
    Address, Bytes, EcdsaSignature, Hash, StorageKey, StorageValue, U256,
};
use crate::errors::StateError;

// =============================================================================
// STATE ACCESS
// =============================================================================

/// Interface for reading and queuing writes to persisted account/storage
/// state.
///
/// Implementations back the engine's own journaled overlay
/// (`account_db::AccountDB`): the engine reads through this trait only on an
/// overlay miss, and never calls `set_storage` directly for speculative
/// writes made inside an uncommitted checkpoint -- those live in the
/// overlay until the top-level transaction commits.
pub trait StateAccess: Send + Sync {
    /// Get account state.
    ///
    /// Returns `None` if the account has never been touched.
    fn get_account(&self, address: Address) -> Result<Option<AccountState>, StateError>;

    /// Get a storage value. Returns zero if the slot was never written.
    fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError>;

    /// Durably writes a storage value. Called only when a top-level
    /// transaction's journal commits.
    fn set_storage(
        &self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError>;

    /// Durably removes a storage row. Called instead of `set_storage` when a
    /// committing journal's last write to `(address, key)` was a deletion, so
    /// the row disappears instead of lingering as an explicit zero. Default
    /// implementation writes a zero value, which is observably identical on
    /// read but leaves a row behind; backends that can tell "absent" from
    /// "present and zero" apart (everything but a schemaless KV table) should
    /// override this.
    fn delete_storage(&self, address: Address, key: StorageKey) -> Result<(), StateError> {
        self.set_storage(address, key, StorageValue::ZERO)
    }

    /// Get contract code (empty for an EOA).
    fn get_code(&self, address: Address) -> Result<Bytes, StateError>;

    /// Durably writes an account record. Called only when `account_db::AccountDB`
    /// flushes its journal at top-level commit.
    fn set_account(&self, address: Address, account: AccountState) -> Result<(), StateError>;

    /// Durably writes contract code for `address`. The caller is responsible
    /// for keeping the account's `code_hash` in sync via `set_account`.
    fn set_code(&self, address: Address, code: Bytes) -> Result<(), StateError>;

    /// Durably removes an account record and its code. Only ever reached for
    /// an address `account_db::AccountDB` tracked as created within the
    /// transaction that is committing (CANCUN SELFDESTRUCT) -- such an
    /// address has nothing else persisted for it yet.
    fn delete_account(&self, address: Address) -> Result<(), StateError>;

    /// Checks whether an account has ever been touched (non-zero balance,
    /// non-zero nonce, or non-empty code).
    fn account_exists(&self, address: Address) -> Result<bool, StateError>;

    /// Convenience accessor: extracts balance from account state.
    fn get_balance(&self, address: Address) -> Result<U256, StateError> {
        match self.get_account(address)? {
            Some(account) => Ok(account.balance),
            None => Ok(U256::zero()),
        }
    }

    /// Convenience accessor: extracts nonce from account state.
    fn get_nonce(&self, address: Address) -> Result<u64, StateError> {
        match self.get_account(address)? {
            Some(account) => Ok(account.nonce),
            None => Ok(0),
        }
    }

    /// Convenience accessor: code hash, or the empty-code hash for an EOA.
    fn get_code_hash(&self, address: Address) -> Result<Hash, StateError> {
        match self.get_account(address)? {
            Some(account) => Ok(account.code_hash),
            None => Ok(AccountState::EMPTY_CODE_HASH),
        }
    }

    /// Convenience accessor: code length in bytes.
    fn get_code_size(&self, address: Address) -> Result<usize, StateError> {
        Ok(self.get_code(address)?.len())
    }
}

// =============================================================================
// SIGNATURE VERIFIER (ecrecover precompile)
// =============================================================================

/// Interface for ECDSA signature verification, used by the ecrecover
/// precompile (0x01). The default precompile implementation recovers
/// directly via `k256` (see `evm::precompiles::ecrecover`); this trait lets a
/// host substitute its own verifier (e.g. one backed by hardware-accelerated
/// signing infrastructure) without touching the interpreter.
pub trait SignatureVerifier: Send + Sync {
    /// Recovers the signer address from an ECDSA signature over `hash`, or
    /// `None` if the signature is invalid.
    fn ecrecover(&self, hash: &Hash, signature: &EcdsaSignature) -> Option<Address>;
}

// =============================================================================
// BLOCK HASH ORACLE (BLOCKHASH opcode)
// =============================================================================

/// Interface for querying historical block hashes, used by the BLOCKHASH
/// opcode (which may only see the last 256 blocks).
///
/// This engine does not participate in consensus and carries no block
/// history of its own; the default configuration has no oracle wired in; and
/// BLOCKHASH with no oracle configured always returns zero (see
/// `evm::interpreter`).
pub trait BlockHashOracle: Send + Sync {
    /// Returns the hash of block `number`, given the current block number
    /// for range validation, or `None` if out of range or unknown.
    fn get_block_hash(&self, number: u64, current_number: u64) -> Option<Hash>;
}

// =============================================================================
// TRANSIENT STORAGE (EIP-1153)
// =============================================================================

/// Interface for transient storage (EIP-1153), used by TLOAD and TSTORE.
/// Transient storage is cleared at the end of each top-level transaction and
/// never persisted.
pub trait TransientStorage: Send + Sync {
    /// Load from transient storage (zero if never written).
    fn tload(&self, address: Address, key: StorageKey) -> StorageValue;

    /// Store to transient storage.
    fn tstore(&mut self, address: Address, key: StorageKey, value: StorageValue);

    /// Clear all transient storage.
    fn clear(&mut self);
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    struct MockStateAccess;

    impl StateAccess for MockStateAccess {
        fn get_account(&self, _address: Address) -> Result<Option<AccountState>, StateError> {
            Ok(Some(AccountState::new_eoa(U256::from(1000), 5)))
        }

        fn get_storage(&self, _address: Address, _key: StorageKey) -> Result<StorageValue, StateError> {
            Ok(StorageValue::ZERO)
        }

        fn set_storage(
            &self,
            _address: Address,
            _key: StorageKey,
            _value: StorageValue,
        ) -> Result<(), StateError> {
            Ok(())
        }

        fn get_code(&self, _address: Address) -> Result<Bytes, StateError> {
            Ok(Bytes::new())
        }

        fn set_account(&self, _address: Address, _account: AccountState) -> Result<(), StateError> {
            Ok(())
        }

        fn set_code(&self, _address: Address, _code: Bytes) -> Result<(), StateError> {
            Ok(())
        }

        fn delete_account(&self, _address: Address) -> Result<(), StateError> {
            Ok(())
        }

        fn account_exists(&self, _address: Address) -> Result<bool, StateError> {
            Ok(true)
        }
    }

    #[test]
    fn test_mock_state_access() {
        let state = MockStateAccess;
        let addr = Address::new([1u8; 20]);

        let balance = state.get_balance(addr).unwrap();
        assert_eq!(balance, U256::from(1000));

        let nonce = state.get_nonce(addr).unwrap();
        assert_eq!(nonce, 5);
    }
}
