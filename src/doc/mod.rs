/*
 * File: src/doc/mod.rs
 * Purpose: The second, coarse-grained document CRDT client
 *
 * Opaque byte-array state persisted to storage on every mutation (spec.md
 * §4.3). Unlike the data client, this replica does no conflict resolution of
 * its own -- the CRDT algorithm lives entirely in the opaque bytes, and this
 * client only tracks the current state-as-update and persists it.
 */

use crate::protocol::{Frame, DOC_APPLY_UPDATE};

/// Replica of the opaque document CRDT.
pub struct DocClient {
    state: Vec<u8>,
}

impl DocClient {
    /// Build a replica from whatever was last persisted under the `crdt` key
    /// (possibly empty, on a fresh room).
    pub fn from_storage(initial: Option<Vec<u8>>) -> Self {
        Self {
            state: initial.unwrap_or_default(),
        }
    }

    /// The initial-snapshot frame sent once to a newly attached session.
    pub fn initial_snapshot(&self) -> Frame {
        Frame::new(
            DOC_APPLY_UPDATE,
            vec![serde_json::Value::String(hex::encode(&self.state))],
        )
    }

    /// Apply an incoming update, replacing the full state. Returns the new
    /// state-as-update bytes so the caller can persist them.
    pub fn apply_update(&mut self, update: Vec<u8>) -> &[u8] {
        self.state = update;
        &self.state
    }

    /// The current state-as-update, for persistence.
    pub fn state_as_update(&self) -> &[u8] {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_room_has_empty_state() {
        let client = DocClient::from_storage(None);
        assert!(client.state_as_update().is_empty());
    }

    #[test]
    fn apply_update_replaces_state() {
        let mut client = DocClient::from_storage(Some(vec![1, 2]));
        let new_state = client.apply_update(vec![3, 4, 5]).to_vec();
        assert_eq!(new_state, vec![3, 4, 5]);
        assert_eq!(client.state_as_update(), &[3, 4, 5]);
    }

    #[test]
    fn initial_snapshot_reflects_persisted_state() {
        let client = DocClient::from_storage(Some(vec![0xab]));
        let snapshot = client.initial_snapshot();
        assert_eq!(snapshot.args[0], serde_json::Value::String("ab".into()));
    }
}
