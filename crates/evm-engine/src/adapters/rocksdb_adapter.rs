//! # Durable RocksDB state adapter
//!
//! A `StateAccess` implementation backed by RocksDB: one column family per
//! account-record kind, Snappy compression, and a bloom-filtered block cache.
//!
//! Gated behind the `rocksdb-backend` feature -- the engine itself has no
//! durability opinion, and most embeddings (tests, one-shot bytecode
//! execution against a supplied state snapshot) never need this adapter.

use crate::domain::entities::AccountState;
use crate::domain::value_objects::{Address, Bytes, StorageKey, StorageValue};
use crate::errors::StateError;
use crate::ports::outbound::StateAccess;
use rocksdb::{ColumnFamilyDescriptor, Options, DB};
use std::sync::RwLock;

/// Column family holding serialized `AccountState` records, keyed by address.
pub const CF_ACCOUNTS: &str = "accounts";
/// Column family holding contract code, keyed by address.
pub const CF_CODE: &str = "code";
/// Column family holding storage slots, keyed by `address ++ storage_key`.
pub const CF_STORAGE: &str = "storage";

const COLUMN_FAMILIES: &[&str] = &[CF_ACCOUNTS, CF_CODE, CF_STORAGE];

/// Tuning knobs for the RocksDB-backed backend.
#[derive(Debug, Clone)]
pub struct RocksDbConfig {
    /// Directory the database lives in.
    pub path: String,
    /// Block cache size in bytes.
    pub block_cache_size: usize,
    /// Write buffer (memtable) size in bytes.
    pub write_buffer_size: usize,
    /// fsync after every write (durable but slower).
    pub sync_writes: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            path: "./data/evm-state".to_string(),
            block_cache_size: 256 * 1024 * 1024,
            write_buffer_size: 64 * 1024 * 1024,
            sync_writes: true,
        }
    }
}

impl RocksDbConfig {
    /// Smaller, non-durable tuning suitable for tests.
    #[must_use]
    pub fn for_testing(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            block_cache_size: 8 * 1024 * 1024,
            write_buffer_size: 4 * 1024 * 1024,
            sync_writes: false,
        }
    }
}

/// Durable `StateAccess` backend.
pub struct RocksDbBackend {
    db: RwLock<DB>,
    config: RocksDbConfig,
}

impl RocksDbBackend {
    /// Opens (or creates) the database at `config.path`.
    pub fn open(config: RocksDbConfig) -> Result<Self, StateError> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);
        opts.set_write_buffer_size(config.write_buffer_size);
        opts.set_compression_type(rocksdb::DBCompressionType::Snappy);

        let mut block_opts = rocksdb::BlockBasedOptions::default();
        block_opts.set_bloom_filter(10.0, false);
        block_opts.set_block_cache(&rocksdb::Cache::new_lru_cache(config.block_cache_size));
        opts.set_block_based_table_factory(&block_opts);

        let cf_descriptors: Vec<ColumnFamilyDescriptor> = COLUMN_FAMILIES
            .iter()
            .map(|name| {
                let mut cf_opts = Options::default();
                cf_opts.set_compression_type(rocksdb::DBCompressionType::Snappy);
                ColumnFamilyDescriptor::new(*name, cf_opts)
            })
            .collect();

        let db = DB::open_cf_descriptors(&opts, &config.path, cf_descriptors)
            .map_err(|e| StateError::Other(format!("failed to open RocksDB: {e}")))?;

        Ok(Self {
            db: RwLock::new(db),
            config,
        })
    }

    fn storage_key(address: Address, key: StorageKey) -> Vec<u8> {
        let mut k = Vec::with_capacity(52);
        k.extend_from_slice(address.as_bytes());
        k.extend_from_slice(key.as_bytes());
        k
    }
}

impl StateAccess for RocksDbBackend {
    fn get_account(&self, address: Address) -> Result<Option<AccountState>, StateError> {
        let db = self.db.read().unwrap();
        let cf = db.cf_handle(CF_ACCOUNTS).expect("CF_ACCOUNTS opened at startup");
        let raw = db
            .get_cf(&cf, address.as_bytes())
            .map_err(|e| StateError::Other(format!("rocksdb get failed: {e}")))?;
        match raw {
            Some(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| StateError::Other(format!("account deserialize failed: {e}"))),
            None => Ok(None),
        }
    }

    fn get_storage(&self, address: Address, key: StorageKey) -> Result<StorageValue, StateError> {
        let db = self.db.read().unwrap();
        let cf = db.cf_handle(CF_STORAGE).expect("CF_STORAGE opened at startup");
        let raw = db
            .get_cf(&cf, Self::storage_key(address, key))
            .map_err(|e| StateError::Other(format!("rocksdb get failed: {e}")))?;
        Ok(raw
            .and_then(|bytes| StorageValue::from_slice(&bytes))
            .unwrap_or(StorageValue::ZERO))
    }

    fn set_storage(
        &self,
        address: Address,
        key: StorageKey,
        value: StorageValue,
    ) -> Result<(), StateError> {
        let db = self.db.write().unwrap();
        let cf = db.cf_handle(CF_STORAGE).expect("CF_STORAGE opened at startup");
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.put_cf_opt(&cf, Self::storage_key(address, key), value.as_bytes(), &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb put failed: {e}")))
    }

    fn delete_storage(&self, address: Address, key: StorageKey) -> Result<(), StateError> {
        let db = self.db.write().unwrap();
        let cf = db.cf_handle(CF_STORAGE).expect("CF_STORAGE opened at startup");
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.delete_cf_opt(&cf, Self::storage_key(address, key), &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb delete failed: {e}")))
    }

    fn get_code(&self, address: Address) -> Result<Bytes, StateError> {
        let db = self.db.read().unwrap();
        let cf = db.cf_handle(CF_CODE).expect("CF_CODE opened at startup");
        let raw = db
            .get_cf(&cf, address.as_bytes())
            .map_err(|e| StateError::Other(format!("rocksdb get failed: {e}")))?;
        Ok(raw.map(Bytes::from_vec).unwrap_or_default())
    }

    fn set_account(&self, address: Address, account: AccountState) -> Result<(), StateError> {
        let db = self.db.write().unwrap();
        let cf = db.cf_handle(CF_ACCOUNTS).expect("CF_ACCOUNTS opened at startup");
        let raw = serde_json::to_vec(&account)
            .map_err(|e| StateError::Other(format!("account serialize failed: {e}")))?;
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.put_cf_opt(&cf, address.as_bytes(), raw, &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb put failed: {e}")))
    }

    fn set_code(&self, address: Address, code: Bytes) -> Result<(), StateError> {
        let db = self.db.write().unwrap();
        let cf = db.cf_handle(CF_CODE).expect("CF_CODE opened at startup");
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);
        db.put_cf_opt(&cf, address.as_bytes(), code.as_slice(), &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb put failed: {e}")))
    }

    fn delete_account(&self, address: Address) -> Result<(), StateError> {
        let db = self.db.write().unwrap();
        let accounts_cf = db.cf_handle(CF_ACCOUNTS).expect("CF_ACCOUNTS opened at startup");
        let code_cf = db.cf_handle(CF_CODE).expect("CF_CODE opened at startup");
        let storage_cf = db.cf_handle(CF_STORAGE).expect("CF_STORAGE opened at startup");
        let mut write_opts = rocksdb::WriteOptions::default();
        write_opts.set_sync(self.config.sync_writes);

        db.delete_cf_opt(&accounts_cf, address.as_bytes(), &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb delete failed: {e}")))?;
        db.delete_cf_opt(&code_cf, address.as_bytes(), &write_opts)
            .map_err(|e| StateError::Other(format!("rocksdb delete failed: {e}")))?;

        let mut iter = db.prefix_iterator_cf(&storage_cf, address.as_bytes());
        let mut stale_keys = Vec::new();
        while let Some(Ok((key, _))) = iter.next() {
            if key.starts_with(address.as_bytes()) {
                stale_keys.push(key.to_vec());
            } else {
                break;
            }
        }
        for key in stale_keys {
            db.delete_cf_opt(&storage_cf, key, &write_opts)
                .map_err(|e| StateError::Other(format!("rocksdb delete failed: {e}")))?;
        }
        Ok(())
    }

    fn account_exists(&self, address: Address) -> Result<bool, StateError> {
        Ok(self.get_account(address)?.is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::U256;

    fn open_temp() -> RocksDbBackend {
        let dir = std::env::temp_dir().join(format!(
            "evm-engine-rocksdb-test-{}",
            StorageKey::ZERO.as_bytes()[0]
        ));
        RocksDbBackend::open(RocksDbConfig::for_testing(dir.to_string_lossy().to_string()))
            .expect("opens test database")
    }

    #[test]
    fn storage_round_trips() {
        let backend = open_temp();
        let addr = Address::new([7u8; 20]);
        let key = StorageKey::from_u256(U256::from(1));
        assert!(backend.get_storage(addr, key).unwrap().is_zero());

        let value = StorageValue::from_u256(U256::from(42));
        backend.set_storage(addr, key, value).unwrap();
        assert_eq!(backend.get_storage(addr, key).unwrap(), value);
    }
}
