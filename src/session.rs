/*
 * File: src/session.rs
 * Purpose: Session table and the three broadcast primitives (spec.md §4.5)
 *
 * One `Session` per live connection. `SessionTable` is the room's list of
 * sessions plus the three ways to fan a frame out to them; a send failure is
 * logged and does not abort the broadcast loop (spec.md §4.5, §7).
 */

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::warn;
use uuid::Uuid;

/// What a session exclusively owns, keyed by its composite dead-hand key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadHandTarget {
    pub array_id: String,
    pub array_index_id: Option<String>,
}

/// A single live client connection within a room.
pub struct Session {
    pub id: Uuid,
    pub player_id: Option<String>,
    pub quit: bool,
    pub dead_hands: HashMap<String, DeadHandTarget>,
    sender: mpsc::UnboundedSender<Vec<u8>>,
}

impl Session {
    pub fn new(
        id: Uuid,
        player_id: Option<String>,
        sender: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Self {
        Self {
            id,
            player_id,
            quit: false,
            dead_hands: HashMap::new(),
            sender,
        }
    }

    fn send(&self, bytes: &[u8]) {
        if self.quit {
            return;
        }
        if let Err(err) = self.sender.send(bytes.to_vec()) {
            warn!(session = %self.id, error = %err, "send failure, dropping message");
        }
    }
}

/// The set of live sessions in a room, plus broadcast primitives over them.
#[derive(Default)]
pub struct SessionTable {
    sessions: Vec<Session>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, session: Session) {
        self.sessions.push(session);
    }

    /// Mark a session terminal and remove it from the table.
    pub fn remove(&mut self, session_id: Uuid) -> Option<Session> {
        let index = self.sessions.iter().position(|s| s.id == session_id)?;
        let mut session = self.sessions.remove(index);
        session.quit = true;
        Some(session)
    }

    pub fn get_mut(&mut self, session_id: Uuid) -> Option<&mut Session> {
        self.sessions.iter_mut().find(|s| s.id == session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Session> {
        self.sessions.iter()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// `playerId`s of all currently attached sessions, excluding absent ones
    /// (spec.md §4.1 step 3's network-init frame).
    pub fn player_ids(&self) -> Vec<String> {
        self.sessions
            .iter()
            .filter_map(|s| s.player_id.clone())
            .collect()
    }

    /// Send to the originating session only.
    pub fn respond_to_self(&self, originator: Uuid, bytes: &[u8]) {
        if let Some(session) = self.sessions.iter().find(|s| s.id == originator) {
            session.send(bytes);
        }
    }

    /// Send to every session except the originator.
    pub fn proxy_to_peers(&self, originator: Uuid, bytes: &[u8]) {
        for session in self.sessions.iter().filter(|s| s.id != originator) {
            session.send(bytes);
        }
    }

    /// Send to every session, including the originator.
    pub fn reflect_to_peers(&self, bytes: &[u8]) {
        for session in self.sessions.iter() {
            session.send(bytes);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session_with_channel(player_id: Option<&str>) -> (Session, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Session::new(Uuid::new_v4(), player_id.map(String::from), tx),
            rx,
        )
    }

    #[tokio::test]
    async fn respond_to_self_only_reaches_originator() {
        let mut table = SessionTable::new();
        let (a, mut a_rx) = session_with_channel(Some("a"));
        let (b, mut b_rx) = session_with_channel(Some("b"));
        let a_id = a.id;
        table.push(a);
        table.push(b);

        table.respond_to_self(a_id, b"hello");

        assert_eq!(a_rx.recv().await.unwrap(), b"hello");
        assert!(b_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn proxy_excludes_originator_reflect_includes_it() {
        let mut table = SessionTable::new();
        let (a, mut a_rx) = session_with_channel(Some("a"));
        let (b, mut b_rx) = session_with_channel(Some("b"));
        let a_id = a.id;
        table.push(a);
        table.push(b);

        table.proxy_to_peers(a_id, b"proxied");
        assert!(a_rx.try_recv().is_err());
        assert_eq!(b_rx.recv().await.unwrap(), b"proxied");

        table.reflect_to_peers(b"reflected");
        assert_eq!(a_rx.recv().await.unwrap(), b"reflected");
        assert_eq!(b_rx.recv().await.unwrap(), b"reflected");
    }

    #[test]
    fn player_ids_excludes_absent_player_id() {
        let mut table = SessionTable::new();
        let (a, _a_rx) = session_with_channel(Some("a"));
        let (anon, _anon_rx) = session_with_channel(None);
        table.push(a);
        table.push(anon);
        assert_eq!(table.player_ids(), vec!["a".to_string()]);
    }

    #[test]
    fn remove_marks_quit_and_drops_from_table() {
        let mut table = SessionTable::new();
        let (a, _rx) = session_with_channel(Some("a"));
        let id = a.id;
        table.push(a);
        let removed = table.remove(id).unwrap();
        assert!(removed.quit);
        assert_eq!(table.len(), 0);
    }
}
