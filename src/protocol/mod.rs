/*
 * File: src/protocol/mod.rs
 * Purpose: Wire frame format and method-tag routing classes
 *
 * Every steady-state message is a binary WebSocket frame decoding to
 * `{method, args}` (spec.md §6). This module owns the concrete encoding
 * (bincode, chosen in the same spirit as the teacher's serde-everywhere
 * style) and the per-subsystem `handles_method` predicates the dispatcher
 * uses to classify a frame (spec.md §4.1's routing table).
 */

use serde::{Deserialize, Serialize};

use crate::error::ProtocolError;

// Handshake-layer method tags (spec.md §6).
pub const SET_PLAYER_DATA: u16 = 1;
pub const INIT_PLAYERS: u16 = 2;
pub const JOIN: u16 = 3;
pub const LEAVE: u16 = 4;
pub const CHAT: u16 = 5;
pub const LOG: u16 = 6;
pub const AUDIO: u16 = 7;
pub const AUDIO_START: u16 = 8;
pub const AUDIO_END: u16 = 9;
pub const VIDEO: u16 = 10;
pub const VIDEO_START: u16 = 11;
pub const VIDEO_END: u16 = 12;

// Data-client methods occupy [100, 200).
pub const DATA_RANGE: std::ops::Range<u16> = 100..200;
// Document-CRDT methods occupy [200, 300).
pub const DOC_RANGE: std::ops::Range<u16> = 200..300;
// Lock methods occupy [300, 400).
pub const LOCK_RANGE: std::ops::Range<u16> = 300..400;

pub const DATA_APPLY_UPDATE: u16 = 100;

pub const DOC_APPLY_UPDATE: u16 = 200;

pub const LOCK_REQUEST: u16 = 300;
pub const LOCK_RESPONSE: u16 = 301;
pub const LOCK_RELEASE: u16 = 302;

/// A decoded wire frame: a method tag plus an ordered argument list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Frame {
    pub method: u16,
    pub args: Vec<serde_json::Value>,
}

impl Frame {
    pub fn new(method: u16, args: Vec<serde_json::Value>) -> Self {
        Self { method, args }
    }

    /// Decode a binary WebSocket payload into a frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, ProtocolError> {
        bincode::deserialize(bytes).map_err(ProtocolError::Decode)
    }

    /// Encode this frame back to the binary wire representation.
    pub fn encode(&self) -> Vec<u8> {
        // A Frame only ever holds JSON-representable values produced by this
        // crate; encoding cannot fail.
        bincode::serialize(self).expect("frame is always serializable")
    }
}

/// True for frames the IRC/chat class handles (reflected to everyone).
pub fn is_chat_method(method: u16) -> bool {
    method == CHAT || method == LOG
}

/// True for frames the audio/video class handles (proxied, never reflected).
pub fn is_av_method(method: u16) -> bool {
    matches!(
        method,
        AUDIO | AUDIO_START | AUDIO_END | VIDEO | VIDEO_START | VIDEO_END
    )
}

/// True for frames the data-model subsystem handles.
pub fn is_data_method(method: u16) -> bool {
    DATA_RANGE.contains(&method)
}

/// True for frames the document-CRDT subsystem handles.
pub fn is_doc_method(method: u16) -> bool {
    DOC_RANGE.contains(&method)
}

/// True for frames the lock subsystem handles.
pub fn is_lock_method(method: u16) -> bool {
    LOCK_RANGE.contains(&method)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_binary_encoding() {
        let frame = Frame::new(DATA_APPLY_UPDATE, vec![serde_json::json!({"a": 1})]);
        let bytes = frame.encode();
        let decoded = Frame::decode(&bytes).unwrap();
        assert_eq!(frame, decoded);
    }

    #[test]
    fn method_classes_are_disjoint_across_subsystems() {
        for m in [DATA_APPLY_UPDATE, DOC_APPLY_UPDATE, LOCK_REQUEST] {
            let classes = [is_data_method(m), is_doc_method(m), is_lock_method(m)];
            assert_eq!(classes.iter().filter(|&&c| c).count(), 1);
        }
    }

    #[test]
    fn chat_is_reflect_class_av_is_proxy_class() {
        assert!(is_chat_method(CHAT));
        assert!(is_chat_method(LOG));
        assert!(is_av_method(AUDIO));
        assert!(!is_chat_method(AUDIO));
        assert!(!is_av_method(CHAT));
    }
}
