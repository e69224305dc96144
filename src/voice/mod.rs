//! Voice call coordination
//!
//! Session registry, per-peer state machines and the room coordinator that
//! together keep a full mesh of peer sessions consistent with the room's
//! membership.

mod error;
mod peer;
mod registry;
mod room;

pub use error::VoiceError;
pub use peer::{PeerSession, SessionState};
pub use registry::SessionRegistry;
pub use room::{RoomCoordinator, RoomMembership, VoiceEvent};
