/*
 * File: src/room/registry.rs
 * Purpose: Process-wide room-name -> room-state registry with single-flight init
 *
 * Modeled on the teacher's `RoomManager` shape (examples/dionesiusap-CoEdit2.0
 * uses a flat `RwLock<HashMap<String, Document>>`; the pack's
 * acrilique-poker `RoomManager` generalizes this to one outer `RwLock` for
 * room creation/lookup plus a per-room lock for mutation). Room-state
 * construction itself is gated by a `tokio::sync::OnceCell` so concurrent
 * first-attaches to the same room share one in-flight storage read
 * (spec.md §4.1, invariant 1 in spec.md §8).
 */

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell, RwLock};

use crate::data::{DataClient, SCHEMA_ARRAYS};
use crate::doc::DocClient;
use crate::error::{ProtocolError, RoomError};
use crate::lock::LockClient;
use crate::session::SessionTable;
use crate::storage::Storage;

/// A validated room name: a printable string no longer than 128 bytes
/// (spec.md §3, §6).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomName(String);

impl RoomName {
    pub fn parse(name: impl Into<String>) -> Result<Self, ProtocolError> {
        let name = name.into();
        if name.len() > 128 {
            return Err(ProtocolError::RoomNameTooLong);
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// The three shared, per-room CRDT/lock clients plus the live session table.
pub struct RoomInner {
    pub sessions: SessionTable,
    pub data: DataClient,
    pub doc: DocClient,
    pub locks: LockClient,
}

/// A room's state, lazily and single-flight initialized from storage.
pub struct RoomHandle {
    name: RoomName,
    inner: OnceCell<Mutex<RoomInner>>,
}

impl RoomHandle {
    fn new(name: RoomName) -> Self {
        Self {
            name,
            inner: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &RoomName {
        &self.name
    }

    /// Ensure this room's clients have been constructed from storage,
    /// reading each schema array and the `crdt` key at most once across the
    /// room's lifetime regardless of how many concurrent attaches race here.
    pub async fn ensure_initialized(
        &self,
        storage: &dyn Storage,
    ) -> Result<&Mutex<RoomInner>, RoomError> {
        self.inner
            .get_or_try_init(|| async {
                let data = load_data_client(storage).await?;
                let doc = load_doc_client(storage).await?;
                Ok(Mutex::new(RoomInner {
                    sessions: SessionTable::new(),
                    data,
                    doc,
                    locks: LockClient::new(),
                }))
            })
            .await
    }
}

async fn load_data_client(storage: &dyn Storage) -> Result<DataClient, RoomError> {
    let mut arrays = HashMap::new();
    for array_id in SCHEMA_ARRAYS {
        let index_ids: Vec<String> = match storage.get(array_id).await? {
            Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            None => Vec::new(),
        };

        let mut maps = HashMap::new();
        for index_id in index_ids {
            let map_key = storage_map_key(array_id, &index_id);
            let map = match storage.get(&map_key).await? {
                Some(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
                None => HashMap::new(), // missing map defaults to (0, {}) per spec.md §3
            };
            maps.insert(index_id, map);
        }
        arrays.insert(array_id.to_string(), maps);
    }
    Ok(DataClient::from_storage(arrays))
}

async fn load_doc_client(storage: &dyn Storage) -> Result<DocClient, RoomError> {
    let bytes = storage.get("crdt").await?;
    Ok(DocClient::from_storage(bytes))
}

/// Internal storage-key encoding for a single map; `.` is the wire-protocol
/// dead-hand key separator (spec.md §3), so the storage layer uses `:` to
/// keep the two grammars visually distinct.
pub fn storage_map_key(array_id: &str, array_index_id: &str) -> String {
    format!("{array_id}:{array_index_id}")
}

/// Process-wide room-name -> room registry.
#[derive(Default)]
pub struct RoomRegistry {
    rooms: RwLock<HashMap<RoomName, Arc<RoomHandle>>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the room's handle, creating an (uninitialized) one if this is the
    /// first attach. Entries are never replaced once inserted.
    pub async fn get_or_create(&self, name: RoomName) -> Arc<RoomHandle> {
        if let Some(handle) = self.rooms.read().await.get(&name) {
            return handle.clone();
        }

        let mut rooms = self.rooms.write().await;
        rooms
            .entry(name.clone())
            .or_insert_with(|| Arc::new(RoomHandle::new(name)))
            .clone()
    }
}
