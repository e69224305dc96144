//! Deterministic in-process media engine
//!
//! Stands in for a real transport stack so the signaling layer can be
//! exercised end-to-end without devices or a network: fixed host candidates
//! are announced after the local description is set, and the session reports
//! negotiated as soon as both descriptions are in place.

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::{CandidateInit, PeerId, SessionDescriptor};

use super::engine::{
    LocalStream, LocalTrack, MediaEngine, MediaEvent, MediaEventKind, MediaSession, RemoteTrack,
};
use super::error::{MediaAcquisitionError, NegotiationError};

/// Engine used by the test suite and the reference CLI.
pub struct LoopbackEngine {
    deny_capture: bool,
    candidates_per_session: u16,
}

impl LoopbackEngine {
    pub fn new() -> Self {
        Self {
            deny_capture: false,
            candidates_per_session: 2,
        }
    }

    /// An engine whose capture always fails, for exercising the
    /// permission-denied call-start path.
    pub fn denying_capture() -> Self {
        Self {
            deny_capture: true,
            candidates_per_session: 0,
        }
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn capture(&self) -> Result<LocalStream, MediaAcquisitionError> {
        if self.deny_capture {
            return Err(MediaAcquisitionError::PermissionDenied);
        }

        Ok(LocalStream {
            id: "loopback-capture".to_string(),
            tracks: vec![LocalTrack {
                id: "loopback-audio-0".to_string(),
            }],
        })
    }

    fn open_session(
        &self,
        peer_id: PeerId,
        events: mpsc::UnboundedSender<MediaEvent>,
    ) -> Box<dyn MediaSession> {
        Box::new(LoopbackSession {
            peer_id,
            events,
            local: None,
            remote: None,
            tracks: Vec::new(),
            candidates: self.candidates_per_session,
            announced: false,
            closed: false,
        })
    }
}

struct LoopbackSession {
    peer_id: PeerId,
    events: mpsc::UnboundedSender<MediaEvent>,
    local: Option<SessionDescriptor>,
    remote: Option<SessionDescriptor>,
    tracks: Vec<LocalTrack>,
    candidates: u16,
    announced: bool,
    closed: bool,
}

impl LoopbackSession {
    fn sdp(&self) -> String {
        format!(
            "v=0\r\no=loopback 0 0 IN IP4 127.0.0.1\r\ns={}\r\nt=0 0\r\nm=audio 9 RTP/AVP 111\r\n",
            self.peer_id
        )
    }

    fn emit(&self, kind: MediaEventKind) {
        let _ = self.events.send(MediaEvent {
            peer_id: self.peer_id.clone(),
            kind,
        });
    }

    /// Candidate gathering starts once the local description is applied.
    fn gather_candidates(&self) {
        for index in 0..self.candidates {
            self.emit(MediaEventKind::CandidateDiscovered(CandidateInit {
                candidate: format!(
                    "candidate:{index} 1 udp 2130706431 127.0.0.1 {} typ host",
                    50000 + index
                ),
                sdp_mid: Some("0".to_string()),
                sdp_m_line_index: Some(0),
            }));
        }
    }

    fn maybe_announce(&mut self) {
        if self.announced || self.local.is_none() || self.remote.is_none() {
            return;
        }
        self.announced = true;
        debug!("loopback session with {} negotiated", self.peer_id);

        self.emit(MediaEventKind::Negotiated);
        self.emit(MediaEventKind::TrackReceived(RemoteTrack {
            id: format!("loopback-{}-audio", self.peer_id),
            stream_id: format!("loopback-{}", self.peer_id),
        }));
    }

    fn guard_open(&self) -> Result<(), NegotiationError> {
        if self.closed {
            Err(NegotiationError::SessionReleased)
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl MediaSession for LoopbackSession {
    async fn create_offer(&mut self) -> Result<SessionDescriptor, NegotiationError> {
        self.guard_open()?;
        Ok(SessionDescriptor::offer(self.sdp()))
    }

    async fn create_answer(&mut self) -> Result<SessionDescriptor, NegotiationError> {
        self.guard_open()?;
        Ok(SessionDescriptor::answer(self.sdp()))
    }

    async fn set_local_description(
        &mut self,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        self.guard_open()?;
        self.local = Some(descriptor);
        self.gather_candidates();
        self.maybe_announce();
        Ok(())
    }

    async fn set_remote_description(
        &mut self,
        descriptor: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        self.guard_open()?;
        self.remote = Some(descriptor);
        self.maybe_announce();
        Ok(())
    }

    async fn add_ice_candidate(
        &mut self,
        candidate: CandidateInit,
    ) -> Result<(), NegotiationError> {
        self.guard_open()?;
        if self.remote.is_none() {
            return Err(NegotiationError::CandidateRejected(
                "no remote description".to_string(),
            ));
        }
        debug!(
            "loopback session with {} accepted candidate `{}`",
            self.peer_id, candidate.candidate
        );
        Ok(())
    }

    fn add_track(&mut self, track: LocalTrack) {
        self.tracks.push(track);
    }

    fn has_remote_description(&self) -> bool {
        !self.closed && self.remote.is_some()
    }

    fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_capture_denied() {
        let engine = LoopbackEngine::denying_capture();
        assert!(matches!(
            engine.capture().await,
            Err(MediaAcquisitionError::PermissionDenied)
        ));
    }

    #[tokio::test]
    async fn test_candidates_gathered_after_local_description() {
        let engine = LoopbackEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = engine.open_session("7".into(), tx);

        let offer = session.create_offer().await.unwrap();
        assert!(rx.try_recv().is_err(), "no events before local description");

        session.set_local_description(offer).await.unwrap();
        let event = rx.try_recv().expect("candidate after local description");
        assert!(matches!(event.kind, MediaEventKind::CandidateDiscovered(_)));
    }

    #[tokio::test]
    async fn test_negotiated_once_both_descriptions_set() {
        let engine = LoopbackEngine::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut session = engine.open_session("7".into(), tx);

        let offer = session.create_offer().await.unwrap();
        session.set_local_description(offer).await.unwrap();
        session
            .set_remote_description(SessionDescriptor::answer("v=0\r\n"))
            .await
            .unwrap();

        let mut saw_negotiated = false;
        let mut saw_track = false;
        while let Ok(event) = rx.try_recv() {
            match event.kind {
                MediaEventKind::Negotiated => saw_negotiated = true,
                MediaEventKind::TrackReceived(_) => saw_track = true,
                MediaEventKind::CandidateDiscovered(_) => {}
            }
        }
        assert!(saw_negotiated);
        assert!(saw_track);
    }

    #[tokio::test]
    async fn test_operations_fail_after_close() {
        let engine = LoopbackEngine::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut session = engine.open_session("7".into(), tx);

        session.close();
        assert!(matches!(
            session.create_offer().await,
            Err(NegotiationError::SessionReleased)
        ));
        assert!(!session.has_remote_description());
    }
}
