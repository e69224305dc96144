//! Engine and session capability traits
//!
//! The Rust rendition of the browser contract the original voice client was
//! written against: `createOffer`/`createAnswer`/`setLocalDescription`/
//! `setRemoteDescription`/`addIceCandidate` plus the asynchronous
//! `icecandidate`/`track` callbacks, which arrive here as [`MediaEvent`]s on
//! the channel handed to [`MediaEngine::open_session`].

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::protocol::{CandidateInit, PeerId, SessionDescriptor};

use super::error::{MediaAcquisitionError, NegotiationError};

/// One local capture track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalTrack {
    pub id: String,
}

/// The local outgoing stream, captured once per call.
///
/// Shared attach-only across every peer session created while the call is
/// active; dropping it releases the capture device.
#[derive(Debug, Clone)]
pub struct LocalStream {
    pub id: String,
    pub tracks: Vec<LocalTrack>,
}

/// A remote track announced by the engine once media starts flowing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteTrack {
    pub id: String,
    pub stream_id: String,
}

/// Asynchronous engine signal for one peer session.
#[derive(Debug, Clone)]
pub struct MediaEvent {
    pub peer_id: PeerId,
    pub kind: MediaEventKind,
}

#[derive(Debug, Clone)]
pub enum MediaEventKind {
    /// A transport path was discovered and should be trickled to the peer.
    CandidateDiscovered(CandidateInit),
    /// The session finished negotiating; media can flow.
    Negotiated,
    /// The peer's stream reached us.
    TrackReceived(RemoteTrack),
}

/// Factory side of the capability interface.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Capture the local outgoing stream (microphone).
    async fn capture(&self) -> Result<LocalStream, MediaAcquisitionError>;

    /// Open a fresh transport handle for one remote peer.
    ///
    /// Engine signals for this session are delivered as [`MediaEvent`]s on
    /// `events`, tagged with `peer_id`.
    fn open_session(
        &self,
        peer_id: PeerId,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Box<dyn MediaSession>;
}

/// One peer's media transport, exclusively owned by its peer session.
#[async_trait]
pub trait MediaSession: Send {
    async fn create_offer(&mut self) -> Result<SessionDescriptor, NegotiationError>;

    async fn create_answer(&mut self) -> Result<SessionDescriptor, NegotiationError>;

    async fn set_local_description(
        &mut self,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError>;

    async fn set_remote_description(
        &mut self,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError>;

    async fn add_ice_candidate(&mut self, candidate: CandidateInit)
        -> Result<(), NegotiationError>;

    /// Attach a local track to be sent once the session connects.
    fn add_track(&mut self, track: LocalTrack);

    /// Whether a remote description has been applied yet. Candidates that
    /// arrive earlier are dropped by the caller.
    fn has_remote_description(&self) -> bool;

    /// Release the transport. Further operations fail with
    /// [`NegotiationError::SessionReleased`].
    fn close(&mut self);
}
