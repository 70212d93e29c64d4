/*
 * File: src/lock/mod.rs
 * Purpose: Distributed-mutex state machine (spec.md §4.4)
 *
 * One `LockState` per `lockName`: either free, or held by a player with a
 * FIFO queue of waiters. Transitions emit `lockResponse` frames the room
 * coordinator broadcasts to every session.
 */

use std::collections::{HashMap, VecDeque};

use crate::protocol::{Frame, LOCK_RESPONSE};

#[derive(Debug, Clone, Default)]
struct LockState {
    holder: Option<String>,
    queue: VecDeque<String>,
}

/// Replica of the lock subsystem's state for every named lock in a room.
#[derive(Default)]
pub struct LockClient {
    locks: HashMap<String, LockState>,
}

impl LockClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// `lockRequest{playerId, lockName}`.
    ///
    /// Returns the `lockResponse` frame to broadcast, if the request
    /// resulted in an immediate grant (free -> held, or an idempotent
    /// re-request from the current holder); `None` if the requester was
    /// queued behind the current holder.
    pub fn request(&mut self, lock_name: &str, player_id: &str) -> Option<Frame> {
        let state = self.locks.entry(lock_name.to_string()).or_default();

        match &state.holder {
            None => {
                state.holder = Some(player_id.to_string());
                Some(lock_response(lock_name, player_id))
            }
            Some(holder) if holder == player_id => Some(lock_response(lock_name, player_id)),
            Some(_) => {
                if !state.queue.contains(&player_id.to_string()) {
                    state.queue.push_back(player_id.to_string());
                }
                None
            }
        }
    }

    /// `lockRelease{playerId, lockName}`.
    ///
    /// Returns the `lockResponse` frame for the promoted waiter, if any.
    /// A release from a non-holder is logged and ignored by the caller (this
    /// returns `None` without mutating state).
    pub fn release(&mut self, lock_name: &str, player_id: &str) -> Option<Frame> {
        let state = self.locks.get_mut(lock_name)?;
        if state.holder.as_deref() != Some(player_id) {
            return None;
        }

        state.holder = state.queue.pop_front();
        state.holder.clone().map(|next| lock_response(lock_name, &next))
    }

    /// Release every lock held by `player_id` and drop them from every
    /// waiter queue (session-scoped auto-unlock on disconnect, spec.md
    /// §4.4). Returns the `lockResponse` frames for any promotions.
    pub fn release_all_for_player(&mut self, player_id: &str) -> Vec<Frame> {
        let mut responses = Vec::new();
        let lock_names: Vec<String> = self.locks.keys().cloned().collect();
        for lock_name in lock_names {
            if let Some(response) = self.release(&lock_name, player_id) {
                responses.push(response);
            }
            if let Some(state) = self.locks.get_mut(&lock_name) {
                state.queue.retain(|waiter| waiter != player_id);
            }
        }
        responses
    }

    #[cfg(test)]
    fn holder(&self, lock_name: &str) -> Option<&str> {
        self.locks.get(lock_name).and_then(|s| s.holder.as_deref())
    }
}

fn lock_response(lock_name: &str, player_id: &str) -> Frame {
    Frame::new(
        LOCK_RESPONSE,
        vec![
            serde_json::Value::String(player_id.to_string()),
            serde_json::Value::String(lock_name.to_string()),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn free_lock_is_granted_immediately() {
        let mut locks = LockClient::new();
        let response = locks.request("door", "a").unwrap();
        assert_eq!(response.method, LOCK_RESPONSE);
        assert_eq!(locks.holder("door"), Some("a"));
    }

    #[test]
    fn second_requester_is_queued_not_granted() {
        let mut locks = LockClient::new();
        locks.request("door", "a").unwrap();
        let response = locks.request("door", "b");
        assert!(response.is_none());
        assert_eq!(locks.holder("door"), Some("a"));
    }

    #[test]
    fn re_request_by_holder_is_idempotent() {
        let mut locks = LockClient::new();
        locks.request("door", "a").unwrap();
        let response = locks.request("door", "a");
        assert!(response.is_some());
        assert_eq!(locks.holder("door"), Some("a"));
    }

    #[test]
    fn release_promotes_queued_waiter() {
        let mut locks = LockClient::new();
        locks.request("door", "a").unwrap();
        locks.request("door", "b");
        let response = locks.release("door", "a").unwrap();
        assert_eq!(
            response.args[0],
            serde_json::Value::String("b".to_string())
        );
        assert_eq!(locks.holder("door"), Some("b"));
    }

    #[test]
    fn release_by_non_holder_is_ignored() {
        let mut locks = LockClient::new();
        locks.request("door", "a").unwrap();
        let response = locks.release("door", "b");
        assert!(response.is_none());
        assert_eq!(locks.holder("door"), Some("a"));
    }

    #[test]
    fn disconnect_releases_held_lock_and_drops_from_queues() {
        let mut locks = LockClient::new();
        locks.request("door", "a").unwrap();
        locks.request("door", "b");
        locks.request("window", "b").unwrap();

        let responses = locks.release_all_for_player("a");
        assert_eq!(responses.len(), 1);
        assert_eq!(locks.holder("door"), Some("b"));
    }
}
