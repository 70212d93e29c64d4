/*
 * File: src/storage/memory.rs
 * Purpose: In-process Storage implementation backing a single server instance
 */

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::StorageError;

use super::Storage;

/// Simple in-memory key-value store.
///
/// Not durable across process restarts; stands in for whatever real backend
/// (Redis, a KV service, etc.) a deployment would wire up behind the
/// `Storage` trait.
#[derive(Default)]
pub struct MemoryStorage {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StorageError> {
        Ok(self.entries.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), StorageError> {
        self.entries.write().insert(key.to_string(), value);
        Ok(())
    }
}
