/*
 * File: src/room/coordinator.rs
 * Purpose: The attach sequence, steady-state dispatch, and disconnect cleanup
 *
 * This is the core of the spec (§4.1, §4.2, §4.4): lazy single-flight room
 * init, the ordered attach sequence that guarantees snapshot-before-live
 * delivery, per-frame routing by method class, and dead-hand / lock cleanup
 * on session termination.
 */

use std::sync::Arc;

use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::data::{parse_dead_hand_key, ApplyOutcome, DataEvent, DataOp};
use crate::error::RoomError;
use crate::protocol::{self, Frame, JOIN, LOCK_RELEASE, LOCK_REQUEST};
use crate::session::{DeadHandTarget, Session};
use crate::storage::Storage;

use super::registry::{RoomHandle, RoomInner};

/// A handle to one room plus the collaborators it needs to do its job.
pub struct Room {
    pub handle: Arc<RoomHandle>,
    pub storage: Arc<dyn Storage>,
}

impl Room {
    pub fn new(handle: Arc<RoomHandle>, storage: Arc<dyn Storage>) -> Self {
        Self { handle, storage }
    }

    /// Attach a transport as a new session (spec.md §4.1).
    ///
    /// `outbound` is the sender side of this connection's write loop;
    /// `buffered` is whatever inbound frames arrived while the caller was
    /// waiting for this call to return (the caller is responsible for the
    /// buffering itself -- see `src/http.rs`). Returns the new session id.
    pub async fn attach(
        &self,
        player_id: Option<String>,
        outbound: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<Uuid, RoomError> {
        let inner_mutex = self.handle.ensure_initialized(self.storage.as_ref()).await?;
        let mut inner = inner_mutex.lock().await;

        // Step 3: three snapshots, in order, sent directly to this
        // connection (it is not yet in the session table).
        let data_snapshot = inner.data.import_snapshot();
        let _ = outbound.send(data_snapshot.encode());

        let doc_snapshot = inner.doc.initial_snapshot();
        let _ = outbound.send(doc_snapshot.encode());

        let network_init = Frame::new(
            protocol::INIT_PLAYERS,
            vec![json!({ "playerIds": inner.sessions.player_ids() })],
        );
        let _ = outbound.send(network_init.encode());

        // Step 5: append the session. Dead-hand / live-hand routing happens
        // inline wherever `apply` returns events (see `dispatch_data`), so
        // there is no separate subscribe/unsubscribe lifecycle to leak.
        let session_id = Uuid::new_v4();
        inner
            .sessions
            .push(Session::new(session_id, player_id.clone(), outbound));

        // Step 6: join frame to peers.
        if let Some(player_id) = &player_id {
            let join_frame = Frame::new(JOIN, vec![json!({ "playerId": player_id })]);
            inner.sessions.proxy_to_peers(session_id, &join_frame.encode());
        }

        info!(room = %self.handle.name().as_str(), session = %session_id, "session attached");
        Ok(session_id)
    }

    /// Steady-state per-frame dispatch (spec.md §4.1's routing table).
    pub async fn dispatch(&self, session_id: Uuid, bytes: &[u8]) {
        let frame = match Frame::decode(bytes) {
            Ok(frame) => frame,
            Err(err) => {
                self.report_error(session_id, &err.to_string()).await;
                return;
            }
        };

        let inner_mutex = match self.handle.ensure_initialized(self.storage.as_ref()).await {
            Ok(inner) => inner,
            Err(err) => {
                self.report_error(session_id, &err.to_string()).await;
                return;
            }
        };

        let mut persist_doc: Option<Vec<u8>> = None;
        {
            let mut inner = inner_mutex.lock().await;

            if protocol::is_data_method(frame.method) {
                Self::dispatch_data(&mut inner, session_id, &frame, bytes);
            }
            if protocol::is_doc_method(frame.method) {
                persist_doc = Self::dispatch_doc(&mut inner, session_id, &frame, bytes);
            }
            if protocol::is_lock_method(frame.method) {
                Self::dispatch_lock(&mut inner, &frame);
            }
            if protocol::is_chat_method(frame.method) {
                inner.sessions.reflect_to_peers(bytes);
            }
            if protocol::is_av_method(frame.method) {
                inner.sessions.proxy_to_peers(session_id, bytes);
            }
        }

        if let Some(state) = persist_doc {
            if let Err(err) = self.storage.put("crdt", state).await {
                error!(room = %self.handle.name().as_str(), error = %err, "failed to persist document CRDT");
            }
        }
    }

    fn dispatch_data(inner: &mut RoomInner, session_id: Uuid, frame: &Frame, bytes: &[u8]) {
        let Some(arg) = frame.args.first() else {
            return;
        };
        let op: DataOp = match serde_json::from_value(arg.clone()) {
            Ok(op) => op,
            Err(_) => return,
        };

        match inner.data.apply(op) {
            ApplyOutcome::Rollback(rollback_op) => {
                let rollback_frame = Frame::new(
                    frame.method,
                    vec![serde_json::to_value(&rollback_op).unwrap_or(json!(null))],
                );
                inner
                    .sessions
                    .respond_to_self(session_id, &rollback_frame.encode());
            }
            ApplyOutcome::Applied(events) => {
                route_data_events(inner, &events);
                inner.sessions.proxy_to_peers(session_id, bytes);
            }
        }
    }

    fn dispatch_doc(
        inner: &mut RoomInner,
        session_id: Uuid,
        frame: &Frame,
        bytes: &[u8],
    ) -> Option<Vec<u8>> {
        let update = frame.args.first()?.as_str()?;
        let update_bytes = hex::decode(update).ok()?;
        let state = inner.doc.apply_update(update_bytes).to_vec();
        inner.sessions.proxy_to_peers(session_id, bytes);
        Some(state)
    }

    fn dispatch_lock(inner: &mut RoomInner, frame: &Frame) {
        let (Some(player_id), Some(lock_name)) = (
            frame.args.first().and_then(|v| v.as_str()),
            frame.args.get(1).and_then(|v| v.as_str()),
        ) else {
            return;
        };

        let response = match frame.method {
            LOCK_REQUEST => inner.locks.request(lock_name, player_id),
            LOCK_RELEASE => inner.locks.release(lock_name, player_id),
            _ => {
                warn!(method = frame.method, "unknown lock method, ignoring");
                None
            }
        };

        if let Some(response) = response {
            inner.sessions.reflect_to_peers(&response.encode());
        }
    }

    async fn report_error(&self, session_id: Uuid, message: &str) {
        let inner_mutex = match self.handle.ensure_initialized(self.storage.as_ref()).await {
            Ok(inner) => inner,
            Err(_) => return,
        };
        let inner = inner_mutex.lock().await;
        let frame = json!({ "error": message });
        if let Ok(bytes) = serde_json::to_vec(&frame) {
            inner.sessions.respond_to_self(session_id, &bytes);
        }
    }

    /// Close/error handler (spec.md §4.1's "Close / error"). Idempotent:
    /// safe to call more than once for the same session.
    pub async fn disconnect(&self, session_id: Uuid) -> Result<(), RoomError> {
        let inner_mutex = self.handle.ensure_initialized(self.storage.as_ref()).await?;
        let mut inner = inner_mutex.lock().await;

        let Some(session) = inner.sessions.remove(session_id) else {
            return Ok(()); // already removed; idempotent
        };

        Self::run_dead_hand_cleanup(&mut inner, session_id, &session);

        if let Some(player_id) = &session.player_id {
            for response in inner.locks.release_all_for_player(player_id) {
                inner.sessions.reflect_to_peers(&response.encode());
            }
            let events = inner.data.release_all_claims(player_id);
            route_data_events(&mut inner, &events);
        }

        Ok(())
    }

    /// Dead-hand cleanup (spec.md §4.2): synthesize removes for every key
    /// the departing session owned and proxy them to peers. The local data
    /// client is not mutated here -- peers converge through the normal
    /// replication path when the synthesized remove round-trips.
    fn run_dead_hand_cleanup(inner: &mut RoomInner, session_id: Uuid, session: &Session) {
        for target in session.dead_hands.values() {
            match &target.array_index_id {
                Some(array_index_id) => {
                    if inner.data.contains(&target.array_id, array_index_id) {
                        let remove = DataOp::RemoveMap {
                            array_id: target.array_id.clone(),
                            array_index_id: array_index_id.clone(),
                        };
                        proxy_synthesized_remove(inner, session_id, &remove);
                    }
                }
                None => {
                    for array_index_id in inner.data.array_index_ids(&target.array_id) {
                        let remove = DataOp::RemoveMap {
                            array_id: target.array_id.clone(),
                            array_index_id,
                        };
                        proxy_synthesized_remove(inner, session_id, &remove);
                    }
                }
            }
        }
    }
}

fn proxy_synthesized_remove(inner: &mut RoomInner, originator: Uuid, op: &DataOp) {
    let frame = Frame::new(
        protocol::DATA_APPLY_UPDATE,
        vec![serde_json::to_value(op).unwrap_or(json!(null))],
    );
    inner.sessions.proxy_to_peers(originator, &frame.encode());
}

/// Route `deadhand`/`livehand` events to the sessions they concern (spec.md
/// §4.1 step 4): insert owned keys on dead-hand, erase them on live-hand.
fn route_data_events(inner: &mut RoomInner, events: &[DataEvent]) {
    for event in events {
        match event {
            DataEvent::DeadHand { keys, player_id } => {
                if let Some(session) = find_session_by_player(inner, player_id) {
                    for key in keys {
                        if let Ok((array_id, array_index_id)) = parse_dead_hand_key(key) {
                            session.dead_hands.insert(
                                key.clone(),
                                DeadHandTarget {
                                    array_id,
                                    array_index_id,
                                },
                            );
                        }
                    }
                }
            }
            DataEvent::LiveHand { keys, player_id } => {
                if let Some(session) = find_session_by_player(inner, player_id) {
                    for key in keys {
                        session.dead_hands.remove(key);
                    }
                }
            }
        }
    }
}

fn find_session_by_player<'a>(inner: &'a mut RoomInner, player_id: &str) -> Option<&'a mut Session> {
    inner
        .sessions
        .iter()
        .find(|s| s.player_id.as_deref() == Some(player_id))
        .map(|s| s.id)
        .and_then(move |id| inner.sessions.get_mut(id))
}


