/*
 * File: src/data/mod.rs
 * Purpose: The "map-of-maps" CRDT replica (named arrays of last-writer-wins maps)
 *
 * Mirrors the shape of the teacher's `crdt::Document`: an `apply` entry point
 * that mutates local state and records what happened, with ordering decided
 * by `LogicalTimestamp` (the teacher's `Timestamp` generalized from a single
 * sequence CRDT to a field-keyed map). Ownership ("dead hands") is new: a
 * claim/release side channel that the room coordinator drains into each
 * session's ownership table.
 */

mod timestamp;

pub use timestamp::LogicalTimestamp;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;
use crate::protocol::{Frame, DATA_APPLY_UPDATE};

/// One field slot inside a map: value plus the timestamp it was written with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldEntry {
    pub value: serde_json::Value,
    pub timestamp: LogicalTimestamp,
}

/// An unordered field -> value mapping (spec.md §3's "map").
pub type MapValue = HashMap<String, FieldEntry>;

/// An operation a client may apply to the data model.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum DataOp {
    /// Last-writer-wins write of a single field within a map.
    SetField {
        array_id: String,
        array_index_id: String,
        field: String,
        value: serde_json::Value,
        timestamp: LogicalTimestamp,
    },
    /// Remove an entire map from an array (used by dead-hand cleanup and by
    /// ordinary client-driven deletes).
    RemoveMap {
        array_id: String,
        array_index_id: String,
    },
    /// Claim exclusive ownership of a map, or (if `array_index_id` is
    /// `None`) of the whole array.
    Claim {
        array_id: String,
        array_index_id: Option<String>,
        player_id: String,
        timestamp: LogicalTimestamp,
    },
    /// Release a previously claimed map or array.
    Release {
        array_id: String,
        array_index_id: Option<String>,
        player_id: String,
    },
}

/// Ownership-change notifications the room coordinator routes to sessions.
#[derive(Debug, Clone, PartialEq)]
pub enum DataEvent {
    DeadHand { keys: Vec<String>, player_id: String },
    LiveHand { keys: Vec<String>, player_id: String },
}

/// The result of applying an inbound data frame.
pub enum ApplyOutcome {
    /// The write was rejected (stale timestamp); wire this back to the
    /// originator only.
    Rollback(DataOp),
    /// The write was applied; these ownership events must be routed to the
    /// sessions they concern.
    Applied(Vec<DataEvent>),
}

/// Composite dead-hand key grammar: `"<arrayId>.<arrayIndexId>"` for a single
/// map, or `"<arrayId>"` for an entire array.
pub fn parse_dead_hand_key(key: &str) -> Result<(String, Option<String>), ProtocolError> {
    match key.split_once('.') {
        Some((_array_id, "")) => Err(ProtocolError::MalformedDeadHandKey(key.to_string())),
        Some((array_id, array_index_id)) => {
            Ok((array_id.to_string(), Some(array_index_id.to_string())))
        }
        None if key.is_empty() => Err(ProtocolError::MalformedDeadHandKey(key.to_string())),
        None => Ok((key.to_string(), None)),
    }
}

pub fn dead_hand_key(array_id: &str, array_index_id: Option<&str>) -> String {
    match array_index_id {
        Some(idx) => format!("{array_id}.{idx}"),
        None => array_id.to_string(),
    }
}

/// The fixed schema of named arrays this deployment knows about (spec.md §3).
pub const SCHEMA_ARRAYS: &[&str] = &["worldApps"];

/// Replica of the map-of-maps CRDT.
pub struct DataClient {
    arrays: HashMap<String, HashMap<String, MapValue>>,
    /// dead-hand key -> (owning player, claim timestamp)
    owners: HashMap<String, (String, LogicalTimestamp)>,
}

impl DataClient {
    /// Build a replica from the persisted state of each schema array.
    pub fn from_storage(arrays: HashMap<String, HashMap<String, MapValue>>) -> Self {
        Self {
            arrays,
            owners: HashMap::new(),
        }
    }

    /// The import-snapshot frame sent once to a newly attached session.
    pub fn import_snapshot(&self) -> Frame {
        let payload = serde_json::to_value(&self.arrays)
            .expect("data model state is always JSON-serializable");
        Frame::new(DATA_APPLY_UPDATE, vec![payload])
    }

    /// Release every claim held by `player_id`, as if each had been released
    /// explicitly. Called when a session with this player id disconnects, so
    /// a departed player's claims don't linger as unrecoverable dead hands.
    pub fn release_all_claims(&mut self, player_id: &str) -> Vec<DataEvent> {
        let keys: Vec<String> = self
            .owners
            .iter()
            .filter(|(_, (owner, _))| owner == player_id)
            .map(|(key, _)| key.clone())
            .collect();

        for key in &keys {
            self.owners.remove(key);
        }

        if keys.is_empty() {
            Vec::new()
        } else {
            vec![DataEvent::LiveHand {
                keys,
                player_id: player_id.to_string(),
            }]
        }
    }

    /// Apply an inbound operation, returning whether it was accepted.
    pub fn apply(&mut self, op: DataOp) -> ApplyOutcome {
        match op {
            DataOp::SetField {
                array_id,
                array_index_id,
                field,
                value,
                timestamp,
            } => self.apply_set_field(array_id, array_index_id, field, value, timestamp),
            DataOp::RemoveMap {
                array_id,
                array_index_id,
            } => {
                self.arrays
                    .get_mut(&array_id)
                    .map(|array| array.remove(&array_index_id));
                ApplyOutcome::Applied(vec![])
            }
            DataOp::Claim {
                array_id,
                array_index_id,
                player_id,
                timestamp,
            } => self.apply_claim(array_id, array_index_id, player_id, timestamp),
            DataOp::Release {
                array_id,
                array_index_id,
                player_id,
            } => self.apply_release(array_id, array_index_id, player_id),
        }
    }

    fn apply_set_field(
        &mut self,
        array_id: String,
        array_index_id: String,
        field: String,
        value: serde_json::Value,
        timestamp: LogicalTimestamp,
    ) -> ApplyOutcome {
        let map = self
            .arrays
            .entry(array_id.clone())
            .or_default()
            .entry(array_index_id.clone())
            .or_default();

        if let Some(existing) = map.get(&field) {
            if existing.timestamp >= timestamp {
                return ApplyOutcome::Rollback(DataOp::SetField {
                    array_id,
                    array_index_id,
                    field,
                    value: existing.value.clone(),
                    timestamp: existing.timestamp.clone(),
                });
            }
        }

        map.insert(field, FieldEntry { value, timestamp });
        ApplyOutcome::Applied(vec![])
    }

    fn apply_claim(
        &mut self,
        array_id: String,
        array_index_id: Option<String>,
        player_id: String,
        timestamp: LogicalTimestamp,
    ) -> ApplyOutcome {
        let key = dead_hand_key(&array_id, array_index_id.as_deref());

        if let Some((owner, owned_at)) = self.owners.get(&key) {
            if owner == &player_id {
                // Idempotent re-claim.
                return ApplyOutcome::Applied(vec![DataEvent::DeadHand {
                    keys: vec![key],
                    player_id,
                }]);
            }
            if *owned_at >= timestamp {
                return ApplyOutcome::Rollback(DataOp::Claim {
                    array_id,
                    array_index_id,
                    player_id: owner.clone(),
                    timestamp: owned_at.clone(),
                });
            }
            let previous_owner = owner.clone();
            self.owners.insert(key.clone(), (player_id.clone(), timestamp));
            return ApplyOutcome::Applied(vec![
                DataEvent::LiveHand {
                    keys: vec![key.clone()],
                    player_id: previous_owner,
                },
                DataEvent::DeadHand {
                    keys: vec![key],
                    player_id,
                },
            ]);
        }

        self.owners.insert(key.clone(), (player_id.clone(), timestamp));
        ApplyOutcome::Applied(vec![DataEvent::DeadHand {
            keys: vec![key],
            player_id,
        }])
    }

    fn apply_release(
        &mut self,
        array_id: String,
        array_index_id: Option<String>,
        player_id: String,
    ) -> ApplyOutcome {
        let key = dead_hand_key(&array_id, array_index_id.as_deref());
        match self.owners.get(&key) {
            Some((owner, _)) if owner == &player_id => {
                self.owners.remove(&key);
                ApplyOutcome::Applied(vec![DataEvent::LiveHand {
                    keys: vec![key],
                    player_id,
                }])
            }
            _ => ApplyOutcome::Applied(vec![]),
        }
    }

    /// True if `array_id`/`array_index_id` still exists (used by dead-hand
    /// cleanup to decide whether a synthesized remove is still meaningful).
    pub fn contains(&self, array_id: &str, array_index_id: &str) -> bool {
        self.arrays
            .get(array_id)
            .map(|array| array.contains_key(array_index_id))
            .unwrap_or(false)
    }

    /// All `arrayIndexId`s currently present under `array_id`.
    pub fn array_index_ids(&self, array_id: &str) -> Vec<String> {
        self.arrays
            .get(array_id)
            .map(|array| array.keys().cloned().collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ts(clock: u64, player: &str) -> LogicalTimestamp {
        LogicalTimestamp::new(clock, player)
    }

    #[test]
    fn parses_map_scope_key() {
        assert_eq!(
            parse_dead_hand_key("worldApps.x1").unwrap(),
            ("worldApps".to_string(), Some("x1".to_string()))
        );
    }

    #[test]
    fn parses_array_scope_key() {
        assert_eq!(
            parse_dead_hand_key("worldApps").unwrap(),
            ("worldApps".to_string(), None)
        );
    }

    #[test]
    fn rejects_empty_key() {
        assert!(parse_dead_hand_key("").is_err());
    }

    #[test]
    fn set_field_applies_when_newer() {
        let mut client = DataClient::from_storage(HashMap::new());
        let outcome = client.apply(DataOp::SetField {
            array_id: "worldApps".into(),
            array_index_id: "x1".into(),
            field: "color".into(),
            value: serde_json::json!("red"),
            timestamp: ts(1, "a"),
        });
        assert!(matches!(outcome, ApplyOutcome::Applied(_)));
        assert!(client.contains("worldApps", "x1"));
    }

    #[test]
    fn stale_set_field_is_rolled_back() {
        let mut client = DataClient::from_storage(HashMap::new());
        client.apply(DataOp::SetField {
            array_id: "worldApps".into(),
            array_index_id: "x1".into(),
            field: "color".into(),
            value: serde_json::json!("red"),
            timestamp: ts(5, "a"),
        });

        let outcome = client.apply(DataOp::SetField {
            array_id: "worldApps".into(),
            array_index_id: "x1".into(),
            field: "color".into(),
            value: serde_json::json!("blue"),
            timestamp: ts(1, "b"),
        });

        match outcome {
            ApplyOutcome::Rollback(DataOp::SetField { value, .. }) => {
                assert_eq!(value, serde_json::json!("red"));
            }
            _ => panic!("expected rollback"),
        }
    }

    #[test]
    fn claim_emits_dead_hand_event() {
        let mut client = DataClient::from_storage(HashMap::new());
        let outcome = client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x1".into()),
            player_id: "a".into(),
            timestamp: ts(1, "a"),
        });
        match outcome {
            ApplyOutcome::Applied(events) => {
                assert_eq!(
                    events,
                    vec![DataEvent::DeadHand {
                        keys: vec!["worldApps.x1".into()],
                        player_id: "a".into(),
                    }]
                );
            }
            _ => panic!("expected applied"),
        }
    }

    #[test]
    fn release_emits_live_hand_event_for_owner() {
        let mut client = DataClient::from_storage(HashMap::new());
        client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x1".into()),
            player_id: "a".into(),
            timestamp: ts(1, "a"),
        });
        let outcome = client.apply(DataOp::Release {
            array_id: "worldApps".into(),
            array_index_id: Some("x1".into()),
            player_id: "a".into(),
        });
        match outcome {
            ApplyOutcome::Applied(events) => {
                assert_eq!(
                    events,
                    vec![DataEvent::LiveHand {
                        keys: vec!["worldApps.x1".into()],
                        player_id: "a".into(),
                    }]
                );
            }
            _ => panic!("expected applied"),
        }
    }

    #[test]
    fn release_all_claims_clears_every_key_owned_by_the_player() {
        let mut client = DataClient::from_storage(HashMap::new());
        client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x1".into()),
            player_id: "a".into(),
            timestamp: ts(1, "a"),
        });
        client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x2".into()),
            player_id: "a".into(),
            timestamp: ts(2, "a"),
        });
        client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x3".into()),
            player_id: "b".into(),
            timestamp: ts(3, "b"),
        });

        let events = client.release_all_claims("a");
        match events.as_slice() {
            [DataEvent::LiveHand { keys, player_id }] => {
                let mut keys = keys.clone();
                keys.sort();
                assert_eq!(keys, vec!["worldApps.x1".to_string(), "worldApps.x2".to_string()]);
                assert_eq!(player_id, "a");
            }
            other => panic!("expected a single LiveHand event, got {other:?}"),
        }

        // "b"'s claim on x3 is untouched, and a second call is a no-op.
        assert!(client.release_all_claims("a").is_empty());
        let reclaim = client.apply(DataOp::Claim {
            array_id: "worldApps".into(),
            array_index_id: Some("x3".into()),
            player_id: "a".into(),
            timestamp: ts(1, "a"),
        });
        assert!(matches!(reclaim, ApplyOutcome::Rollback(_)));
    }

    #[test]
    fn array_index_ids_lists_all_maps_under_array() {
        let mut client = DataClient::from_storage(HashMap::new());
        client.apply(DataOp::SetField {
            array_id: "worldApps".into(),
            array_index_id: "x1".into(),
            field: "f".into(),
            value: serde_json::json!(1),
            timestamp: ts(1, "a"),
        });
        client.apply(DataOp::SetField {
            array_id: "worldApps".into(),
            array_index_id: "x2".into(),
            field: "f".into(),
            value: serde_json::json!(1),
            timestamp: ts(1, "a"),
        });
        let mut ids = client.array_index_ids("worldApps");
        ids.sort();
        assert_eq!(ids, vec!["x1".to_string(), "x2".to_string()]);
    }
}
