//! Storage contract for queue state.
//!
//! The engine persists everything through three families of primitives:
//! plain key/value entries (stored requirements, per-queue config), FIFO
//! lists (the job slots) and unique sets (the feature registry). Each
//! primitive is assumed atomic against the backend, but the engine never
//! composes them transactionally; see the queue module for the interleaving
//! rules that follow from that.
//!
//! [`RedisStore`] is the production adapter, [`MemoryStore`] a process-local
//! implementation used in tests and embedded setups.

pub mod memory;
pub mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use thiserror::Error;

/// Errors surfaced by a store backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to connect to the backend.
    #[error("store connection failed: {0}")]
    ConnectionFailed(String),

    /// A backend operation failed.
    #[error("store operation failed: {0}")]
    Backend(#[from] ::redis::RedisError),
}

/// Placement hint for [`Store::list_push`].
///
/// Only two effective classes exist: `Normal` appends to the tail, `High`
/// prepends to the head. True priority ordering within a list is not part of
/// the contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListPriority {
    #[default]
    Normal,
    High,
}

/// Key/value, FIFO-list and unique-set primitives the queue engine needs
/// from persistence.
#[async_trait]
pub trait Store: Send + Sync {
    /// Return the value stored at `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Set the value stored at `key`.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove `key` and whatever is stored under it.
    async fn remove(&self, key: &str) -> Result<(), StoreError>;

    /// Push a value onto the FIFO list at `key` and return the resulting
    /// list length.
    async fn list_push(
        &self,
        key: &str,
        value: &str,
        priority: ListPriority,
    ) -> Result<u64, StoreError>;

    /// Remove and return the head of the FIFO list at `key`, or `None` when
    /// the list is empty or absent.
    async fn list_pop(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Current length of the FIFO list at `key` (0 when absent).
    async fn list_size(&self, key: &str) -> Result<u64, StoreError>;

    /// Add `member` to the unique set at `key`. Adding a present member is a
    /// no-op.
    async fn set_add(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Remove `member` from the unique set at `key`.
    async fn set_remove(&self, key: &str, member: &str) -> Result<(), StoreError>;

    /// Snapshot of the unique set at `key`, in no particular order. May race
    /// with concurrent mutation.
    async fn set_members(&self, key: &str) -> Result<Vec<String>, StoreError>;
}
