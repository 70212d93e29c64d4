/*
 * File: src/storage/mod.rs
 * Purpose: Durable key-value storage interface used by room-state init
 *
 * The real backend (whatever the deployment wires up) is an external
 * collaborator per the spec; this module defines its interface and ships an
 * in-process implementation so the coordinator is runnable standalone.
 */

mod memory;

pub use memory::MemoryStorage;

use crate::error::StorageError;
use async_trait::async_trait;

/// Durable key -> bytes storage, as used for the map-of-maps CRDT arrays and
/// the document CRDT's `crdt` key.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Fetch the bytes stored under `key`, or `None` if never written.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Persist `value` under `key`, overwriting any previous value.
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError>;
}
