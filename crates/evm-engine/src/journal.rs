//! # Checkpointed key/value overlay
//!
//! A small layered map used to build journaled, revertable state.
//! `account_db::AccountDB` and `evm::transient::TransientStorage` are both
//! stacks of this one primitive. Each layer records, per key, either a
//! written value (`Some`) or an explicit deletion (`None`); a read walks the
//! stack from the top down and stops at the first layer that mentions the
//! key, falling through to the backing store if none does.
//!
//! Checkpoints nest strictly: `commit`/`discard` must name the current top of
//! the stack, and only the top can be folded or dropped. `commit` merges the
//! top layer into the one beneath it (last write wins within a layer, and
//! newer layers win over older ones); `discard` drops the top layer and
//! everything written in it.

use std::collections::HashMap;
use std::hash::Hash;
use thiserror::Error;

/// Errors from overlay checkpoint bookkeeping.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JournalError {
    /// `commit`/`discard` called with no open checkpoint (only the base
    /// layer remains).
    #[error("commit/discard called with no open checkpoint")]
    NoOpenCheckpoint,

    /// The checkpoint id passed to `commit`/`discard` does not name the
    /// current top of the stack (checkpoints must close in LIFO order).
    #[error("checkpoint id {0} does not match the current top of stack (depth {1})")]
    CheckpointMismatch(usize, usize),
}

type Layer<K, V> = HashMap<K, Option<V>>;

/// A checkpointed overlay over a conceptually persistent key/value store.
///
/// `layers[0]` is the base layer: writes made with no open checkpoint, or
/// folded in by a completed `commit`/`persist`. `layers[1..]` are open
/// checkpoints, oldest first.
#[derive(Debug, Clone)]
pub struct Overlay<K, V> {
    layers: Vec<Layer<K, V>>,
}

impl<K, V> Overlay<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Creates an empty overlay with no open checkpoints.
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: vec![HashMap::new()],
        }
    }

    /// Opens a new checkpoint layer, returning its id (its depth in the
    /// stack). Pass this id back to `commit` or `discard`.
    pub fn checkpoint(&mut self) -> usize {
        self.layers.push(HashMap::new());
        self.layers.len() - 1
    }

    /// Folds the top layer into the layer beneath it. `id` must name the
    /// current top of stack.
    pub fn commit(&mut self, id: usize) -> Result<(), JournalError> {
        self.expect_top(id)?;
        let top = self.layers.pop().expect("checked non-empty above");
        let parent = self.layers.last_mut().expect("base layer always present");
        parent.extend(top);
        Ok(())
    }

    /// Drops the top layer and everything written in it.
    pub fn discard(&mut self, id: usize) -> Result<(), JournalError> {
        self.expect_top(id)?;
        self.layers.pop();
        Ok(())
    }

    fn expect_top(&self, id: usize) -> Result<(), JournalError> {
        if self.layers.len() <= 1 {
            return Err(JournalError::NoOpenCheckpoint);
        }
        if id != self.layers.len() - 1 {
            return Err(JournalError::CheckpointMismatch(id, self.layers.len() - 1));
        }
        Ok(())
    }

    /// Current checkpoint depth (0 = no open checkpoints).
    #[must_use]
    pub fn depth(&self) -> usize {
        self.layers.len() - 1
    }

    /// Reads a key, walking layers top-down.
    ///
    /// `None` means the key isn't mentioned in any layer -- the caller
    /// should fall back to the backing store. `Some(None)` means the key was
    /// explicitly deleted in some layer (and the backing store's value, if
    /// any, must not be consulted).
    #[must_use]
    pub fn get(&self, key: &K) -> Option<Option<&V>> {
        for layer in self.layers.iter().rev() {
            if let Some(v) = layer.get(key) {
                return Some(v.as_ref());
            }
        }
        None
    }

    /// Writes a value into the current (top) layer.
    pub fn set(&mut self, key: K, value: V) {
        self.layers
            .last_mut()
            .expect("base layer always present")
            .insert(key, Some(value));
    }

    /// Records an explicit deletion in the current (top) layer.
    pub fn remove(&mut self, key: K) {
        self.layers
            .last_mut()
            .expect("base layer always present")
            .insert(key, None);
    }

    /// Folds every open checkpoint into the base layer. Used when a
    /// top-level transaction finishes successfully and every nested
    /// checkpoint it opened should be treated as committed.
    pub fn persist(&mut self) {
        while self.layers.len() > 1 {
            let top = self.layers.pop().expect("loop guard keeps at least one");
            let parent = self.layers.last_mut().expect("base layer always present");
            parent.extend(top);
        }
    }

    /// Drops every open checkpoint, discarding all writes made since the
    /// base layer. Used when a top-level transaction fails entirely.
    pub fn revert_all(&mut self) {
        self.layers.truncate(1);
    }

    /// Iterates every key/value pair mentioned in the base layer, once
    /// everything has been folded down via `persist`. `None` values are
    /// deletions that must be applied to the backing store.
    pub fn base_iter(&self) -> impl Iterator<Item = (&K, Option<&V>)> {
        self.layers[0].iter().map(|(k, v)| (k, v.as_ref()))
    }

    /// Every key mentioned in any layer, written or deleted. Lets a caller
    /// wipe everything it has ever touched for a key-space the backing store
    /// cannot enumerate (account deletion over per-address storage, see
    /// `account_db::AccountDB::delete_account`).
    #[must_use]
    pub fn keys_seen(&self) -> std::collections::HashSet<K> {
        self.layers.iter().flat_map(|layer| layer.keys().cloned()).collect()
    }
}

impl<K, V> Default for Overlay<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// TESTS
// =============================================================================
