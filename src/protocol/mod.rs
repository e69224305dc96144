//! Signaling wire protocol
//!
//! Defines the message envelope exchanged over the relay channel and the
//! identifiers it carries.

mod ids;
mod message;

pub use ids::{PeerId, RoomId};
pub use message::{
    CandidateInit, DecodeError, DescriptorKind, SessionDescriptor, SignalingMessage,
};
