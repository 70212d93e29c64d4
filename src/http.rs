/*
 * File: src/http.rs
 * Purpose: HTTP front end: room allocation and WebSocket upgrade (spec.md §6)
 *
 * Structured like the teacher's `websocket::server::EditorServer`: a route
 * table built with `warp` filters, an `on_upgrade` closure that spawns the
 * read/write tasks for a connection. The room-routing and dead-hand/lock
 * logic itself lives in `crate::room`; this module only wires transports to
 * it.
 */

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;
use warp::ws::{Message as WsMessage, WebSocket};
use warp::{Filter, Reply};

use crate::error::ProtocolError;
use crate::room::{Room, RoomName, RoomRegistry};
use crate::storage::Storage;

/// Shared application state handed to every route.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<RoomRegistry>,
    pub storage: Arc<dyn Storage>,
    pub room_name_max_len: usize,
}

pub fn routes(
    state: AppState,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let create_room = warp::post()
        .and(warp::path("api"))
        .and(warp::path("room"))
        .and(warp::path::end())
        .map(|| warp::reply::with_status(Uuid::new_v4().to_string(), warp::http::StatusCode::OK));

    let health = warp::get()
        .and(warp::path("healthz"))
        .map(|| warp::reply::with_status("ok", warp::http::StatusCode::OK));

    let with_state = {
        let state = state.clone();
        warp::any().map(move || state.clone())
    };

    let join_room = warp::get()
        .and(warp::path("api"))
        .and(warp::path("room"))
        .and(warp::path::param::<String>())
        .and(warp::path("websocket"))
        .and(warp::path::end())
        .and(warp::ws())
        .and(warp::query::<PlayerQuery>())
        .and(with_state)
        .map(
            |name: String, ws: warp::ws::Ws, query: PlayerQuery, state: AppState| {
                if name.len() > state.room_name_max_len {
                    return warp::reply::with_status(
                        "room name too long",
                        warp::http::StatusCode::NOT_FOUND,
                    )
                    .into_response();
                }

                let response = ws.on_upgrade(move |socket| {
                    handle_connection(socket, name, query.player_id, state)
                });
                response.into_response()
            },
        );

    create_room.or(health).or(join_room)
}

#[derive(Debug, serde::Deserialize)]
struct PlayerQuery {
    #[serde(rename = "playerId")]
    player_id: Option<String>,
}

async fn handle_connection(
    socket: WebSocket,
    room_name: String,
    player_id: Option<String>,
    state: AppState,
) {
    let room_name = match RoomName::parse(room_name) {
        Ok(name) => name,
        Err(err) => {
            warn!(error = %err, "rejected websocket upgrade");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();

    let write_task = tokio::spawn(async move {
        while let Some(bytes) = rx.recv().await {
            if let Err(err) = ws_sender.send(WsMessage::binary(bytes)).await {
                warn!(error = %err, "failed to send websocket message");
                break;
            }
        }
    });

    let handle = state.registry.get_or_create(room_name.clone()).await;
    let room = Room::new(handle, state.storage.clone());

    // Attach, buffering any inbound frames that arrive before the three
    // snapshots and the join broadcast have gone out (spec.md §4.1, §5's
    // "snapshot before live updates" ordering invariant).
    let attach_fut = room.attach(player_id, tx.clone());
    tokio::pin!(attach_fut);

    let mut buffered: Vec<Vec<u8>> = Vec::new();
    let session_id = loop {
        tokio::select! {
            result = &mut attach_fut => {
                match result {
                    Ok(id) => break Some(id),
                    Err(err) => {
                        error!(room = %room_name.as_str(), error = %err, "failed to attach session");
                        let _ = tx.send(
                            serde_json::to_vec(&json!({ "error": err.to_string() }))
                                .unwrap_or_default(),
                        );
                        break None;
                    }
                }
            }
            frame = ws_receiver.next() => {
                match frame {
                    Some(Ok(msg)) if msg.is_binary() => buffered.push(msg.into_bytes()),
                    Some(Ok(msg)) if msg.is_text() => {
                        let _ = tx.send(
                            serde_json::to_vec(&json!({ "error": ProtocolError::NonBinaryFrame.to_string() }))
                                .unwrap_or_default(),
                        );
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "websocket error while attaching");
                    }
                    None => break None,
                }
            }
        }
    };

    let Some(session_id) = session_id else {
        write_task.abort();
        return;
    };

    for frame_bytes in buffered {
        room.dispatch(session_id, &frame_bytes).await;
    }

    info!(room = %room_name.as_str(), session = %session_id, "entering steady-state dispatch");

    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) if msg.is_binary() => {
                room.dispatch(session_id, msg.as_bytes()).await;
            }
            Some(Ok(msg)) if msg.is_text() => {
                let _ = tx.send(
                    serde_json::to_vec(&json!({ "error": ProtocolError::NonBinaryFrame.to_string() }))
                        .unwrap_or_default(),
                );
            }
            Some(Ok(_)) => {}
            Some(Err(err)) => {
                warn!(room = %room_name.as_str(), error = %err, "websocket error");
                break;
            }
            None => break,
        }
    }

    if let Err(err) = room.disconnect(session_id).await {
        error!(room = %room_name.as_str(), error = %err, "error during disconnect cleanup");
    }
    write_task.abort();
}
