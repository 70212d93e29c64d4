/*
 * File: src/data/timestamp.rs
 * Purpose: Logical timestamps for last-writer-wins field resolution
 *
 * Adapted from the teacher's `crdt::Timestamp` (Lamport clock + client-id
 * tie-break); the map-of-maps CRDT uses the same ordering to decide which
 * concurrent field write wins.
 */

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A Lamport-style timestamp: a logical clock tied to the player that wrote
/// it, used to order concurrent field writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogicalTimestamp {
    clock: u64,
    player_id: String,
}

impl LogicalTimestamp {
    pub fn new(clock: u64, player_id: impl Into<String>) -> Self {
        Self {
            clock,
            player_id: player_id.into(),
        }
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }
}

impl PartialEq for LogicalTimestamp {
    fn eq(&self, other: &Self) -> bool {
        self.clock == other.clock && self.player_id == other.player_id
    }
}

impl Eq for LogicalTimestamp {}

impl PartialOrd for LogicalTimestamp {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for LogicalTimestamp {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.clock.cmp(&other.clock) {
            Ordering::Equal => self.player_id.cmp(&other.player_id),
            ord => ord,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn higher_clock_wins() {
        let a = LogicalTimestamp::new(1, "p1");
        let b = LogicalTimestamp::new(2, "p1");
        assert!(b > a);
    }

    #[test]
    fn equal_clock_breaks_tie_on_player_id() {
        let a = LogicalTimestamp::new(5, "alice");
        let b = LogicalTimestamp::new(5, "bob");
        assert!(b > a);
    }
}
