//! huddle - text chat and ad-hoc mesh voice calls
//!
//! This library provides the signaling and peer-session coordination layer:
//! clients connected through a relay negotiate a full mesh of direct media
//! sessions, one per pair of call participants.

pub mod media;
pub mod protocol;
pub mod relay;
pub mod voice;

pub use protocol::{PeerId, RoomId, SignalingMessage};
pub use voice::RoomCoordinator;
