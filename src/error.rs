/*
 * File: src/error.rs
 * Purpose: Error taxonomy for the room coordinator
 *
 * Mirrors the teacher's `ConnectionError` style (thiserror, one variant per
 * failure mode) but spans the whole coordinator: protocol decoding, storage,
 * and room-state initialization.
 */

use thiserror::Error;

/// Errors surfaced while decoding or routing a wire frame.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("frame must be binary, got a text frame")]
    NonBinaryFrame,
    #[error("failed to decode frame: {0}")]
    Decode(#[from] bincode::Error),
    #[error("malformed dead-hand key: {0}")]
    MalformedDeadHandKey(String),
    #[error("room name exceeds 128 bytes")]
    RoomNameTooLong,
}

/// Errors from the pluggable durable-storage backend.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors raised while creating or initializing a room's shared state.
#[derive(Error, Debug)]
pub enum RoomError {
    #[error("storage failure during room initialization: {0}")]
    Init(#[from] StorageError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}
