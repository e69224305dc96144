//! Voice coordination error types

use thiserror::Error;

use crate::media::MediaAcquisitionError;
use crate::protocol::RoomId;

/// Errors surfaced by the room coordinator.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// One room at a time; leave before joining another.
    #[error("already in voice room {0}")]
    AlreadyInRoom(RoomId),

    /// Capture failed; the call start is aborted with no session created.
    #[error(transparent)]
    Acquisition(#[from] MediaAcquisitionError),
}
