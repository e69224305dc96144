//! Signaling message envelope
//!
//! One JSON object per relay frame, discriminated by `type`. Clients omit
//! `userId`; the relay stamps it before broadcasting or forwarding so the
//! receiver can attribute the frame to a peer.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::ids::{PeerId, RoomId};

/// Every `type` discriminant this protocol understands.
const MESSAGE_TYPES: [&str; 8] = [
    "chat",
    "userList",
    "offer",
    "answer",
    "ice-candidate",
    "join-voice",
    "leave-voice",
    "voice-invite",
];

/// Errors produced when decoding a relay frame.
///
/// None of these are fatal to the channel; callers log and drop the frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The frame is not valid JSON at all.
    #[error("payload is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),

    /// The `type` discriminant names no known message.
    #[error("unrecognized message type `{0}`")]
    UnknownType(String),

    /// A known message type with missing or ill-typed fields.
    #[error("malformed message: {0}")]
    Malformed(#[source] serde_json::Error),
}

/// Which half of the offer/answer exchange a descriptor carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DescriptorKind {
    Offer,
    Answer,
}

/// A session descriptor produced by the media engine.
///
/// The SDP body is opaque to the signaling layer; it is carried verbatim
/// between the two engines negotiating the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionDescriptor {
    #[serde(rename = "type")]
    pub kind: DescriptorKind,
    pub sdp: String,
}

impl SessionDescriptor {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            kind: DescriptorKind::Answer,
            sdp: sdp.into(),
        }
    }
}

/// A trickled ICE candidate, in the browser's `RTCIceCandidateInit` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateInit {
    pub candidate: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdp_m_line_index: Option<u16>,
}

/// The signaling vocabulary exchanged over the relay channel.
///
/// `user_id` fields identify the originating peer and are stamped by the
/// relay; clients never set them on outbound frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SignalingMessage {
    /// Text chat, broadcast to every other connected user.
    #[serde(rename = "chat", rename_all = "camelCase")]
    Chat {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        message: String,
    },

    /// Server-authoritative roster of every connected user.
    #[serde(rename = "userList")]
    UserList { users: Vec<PeerId> },

    /// Session offer addressed to one peer in a voice room.
    #[serde(rename = "offer", rename_all = "camelCase")]
    Offer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        offer: SessionDescriptor,
        target_user_id: PeerId,
        room_id: RoomId,
    },

    /// Session answer addressed to the offering peer.
    #[serde(rename = "answer", rename_all = "camelCase")]
    Answer {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        answer: SessionDescriptor,
        target_user_id: PeerId,
        room_id: RoomId,
    },

    /// A discovered transport path, trickled to one peer.
    #[serde(rename = "ice-candidate", rename_all = "camelCase")]
    IceCandidate {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        candidate: CandidateInit,
        target_user_id: PeerId,
        room_id: RoomId,
    },

    /// Voice room entry; broadcast to the room's other members.
    #[serde(rename = "join-voice", rename_all = "camelCase")]
    JoinVoice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        room_id: RoomId,
    },

    /// Voice room exit; broadcast to the remaining members.
    #[serde(rename = "leave-voice", rename_all = "camelCase")]
    LeaveVoice {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        room_id: Option<RoomId>,
    },

    /// Call invitation, forwarded to `target_user_id` only.
    #[serde(rename = "voice-invite", rename_all = "camelCase")]
    VoiceInvite {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        user_id: Option<PeerId>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target_user_id: Option<PeerId>,
        room_id: RoomId,
    },
}

impl SignalingMessage {
    /// Decode one relay frame.
    ///
    /// Frames whose `type` is not in the vocabulary decode to
    /// [`DecodeError::UnknownType`] so callers can drop them without
    /// treating the channel as broken.
    pub fn decode(raw: &str) -> Result<Self, DecodeError> {
        let value: serde_json::Value = serde_json::from_str(raw).map_err(DecodeError::Syntax)?;
        let kind = value
            .get("type")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string);

        match serde_json::from_value(value) {
            Ok(message) => Ok(message),
            Err(err) => match kind {
                Some(kind) if !MESSAGE_TYPES.contains(&kind.as_str()) => {
                    Err(DecodeError::UnknownType(kind))
                }
                _ => Err(DecodeError::Malformed(err)),
            },
        }
    }

    /// Encode for the relay channel. Structural inverse of [`decode`].
    ///
    /// [`decode`]: SignalingMessage::decode
    pub fn encode(&self) -> String {
        serde_json::to_string(self).expect("signaling messages serialize to JSON")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_messages() -> Vec<SignalingMessage> {
        vec![
            SignalingMessage::Chat {
                user_id: Some("42".into()),
                message: "hello".to_string(),
            },
            SignalingMessage::UserList {
                users: vec!["1".into(), "2".into(), "3".into()],
            },
            SignalingMessage::Offer {
                user_id: Some("7".into()),
                offer: SessionDescriptor::offer("v=0\r\n"),
                target_user_id: "42".into(),
                room_id: "r1".into(),
            },
            SignalingMessage::Answer {
                user_id: Some("42".into()),
                answer: SessionDescriptor::answer("v=0\r\n"),
                target_user_id: "7".into(),
                room_id: "r1".into(),
            },
            SignalingMessage::IceCandidate {
                user_id: Some("7".into()),
                candidate: CandidateInit {
                    candidate: "candidate:0 1 udp 2130706431 192.0.2.1 54321 typ host"
                        .to_string(),
                    sdp_mid: Some("0".to_string()),
                    sdp_m_line_index: Some(0),
                },
                target_user_id: "42".into(),
                room_id: "r1".into(),
            },
            SignalingMessage::JoinVoice {
                user_id: None,
                room_id: "r1".into(),
            },
            SignalingMessage::LeaveVoice {
                user_id: Some("7".into()),
                room_id: None,
            },
            SignalingMessage::VoiceInvite {
                user_id: None,
                target_user_id: Some("9".into()),
                room_id: "r2".into(),
            },
        ]
    }

    #[test]
    fn test_round_trip_every_variant() {
        for message in sample_messages() {
            let decoded = SignalingMessage::decode(&message.encode())
                .unwrap_or_else(|e| panic!("round trip failed for {:?}: {}", message, e));
            assert_eq!(decoded, message);
        }
    }

    #[test]
    fn test_wire_discriminants_match_the_relay_vocabulary() {
        let encoded = SignalingMessage::JoinVoice {
            user_id: None,
            room_id: "r1".into(),
        }
        .encode();
        assert!(encoded.contains(r#""type":"join-voice""#));

        let encoded = SignalingMessage::IceCandidate {
            user_id: None,
            candidate: CandidateInit {
                candidate: "candidate:0".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            },
            target_user_id: "42".into(),
            room_id: "r1".into(),
        }
        .encode();
        assert!(encoded.contains(r#""type":"ice-candidate""#));
        assert!(encoded.contains(r#""targetUserId":"42""#));
    }

    #[test]
    fn test_outbound_frames_omit_unset_user_id() {
        let encoded = SignalingMessage::Chat {
            user_id: None,
            message: "hi".to_string(),
        }
        .encode();
        assert!(!encoded.contains("userId"));
    }

    #[test]
    fn test_decode_browser_shaped_candidate_fields() {
        let raw = r#"{
            "type": "ice-candidate",
            "candidate": {
                "candidate": "candidate:1 1 udp 2130706431 192.0.2.1 50000 typ host",
                "sdpMid": "audio",
                "sdpMLineIndex": 0
            },
            "targetUserId": "42",
            "roomId": "r1",
            "userId": "7"
        }"#;

        match SignalingMessage::decode(raw).unwrap() {
            SignalingMessage::IceCandidate { candidate, .. } => {
                assert_eq!(candidate.sdp_mid.as_deref(), Some("audio"));
                assert_eq!(candidate.sdp_m_line_index, Some(0));
            }
            other => panic!("expected ice-candidate, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_type_is_reported_as_such() {
        let err = SignalingMessage::decode(r#"{"type":"presence","userId":"1"}"#).unwrap_err();
        match err {
            DecodeError::UnknownType(kind) => assert_eq!(kind, "presence"),
            other => panic!("expected UnknownType, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_json_is_a_syntax_error() {
        let err = SignalingMessage::decode("{not json").unwrap_err();
        assert!(matches!(err, DecodeError::Syntax(_)));
    }

    #[test]
    fn test_known_type_with_missing_fields_is_malformed() {
        let err = SignalingMessage::decode(r#"{"type":"offer","roomId":"r1"}"#).unwrap_err();
        assert!(matches!(err, DecodeError::Malformed(_)));
    }
}
