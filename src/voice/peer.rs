//! Per-peer session state machine
//!
//! One instance per remote participant, driving the offer/answer/candidate
//! exchange from first contact to teardown. All transitions run on the
//! coordinator's task; there is no locking here.

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::media::{LocalTrack, MediaSession, NegotiationError};
use crate::protocol::{CandidateInit, PeerId, RoomId, SessionDescriptor, SignalingMessage};

/// Session state
///
/// ```text
/// [*] --> Idle
/// Idle --> Offering: local side initiates (peer joined our room, or invite)
/// Idle --> Answering: remote offer received
/// Offering --> Connected: remote answer applied
/// Answering --> Connected: engine reports negotiated
/// any --> Closed: peer left, call ended, or peer vanished from the roster
/// ```
///
/// Closed is terminal and entered at most once; a Closed session ignores all
/// further signaling and emits nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Offering,
    Answering,
    Connected,
    Closed,
}

impl SessionState {
    /// Whether the session still reacts to signaling.
    pub fn is_live(&self) -> bool {
        !matches!(self, Self::Closed)
    }
}

/// The signaling-side record for one remote peer.
///
/// Exclusively owns its media transport handle from the moment it starts
/// offering or answering until it is closed.
pub struct PeerSession {
    peer_id: PeerId,
    room_id: RoomId,
    state: SessionState,
    media: Option<Box<dyn MediaSession>>,
    pending_local_tracks: Vec<LocalTrack>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
}

impl PeerSession {
    pub(crate) fn new(
        peer_id: PeerId,
        room_id: RoomId,
        pending_local_tracks: Vec<LocalTrack>,
        outbound: mpsc::UnboundedSender<SignalingMessage>,
    ) -> Self {
        Self {
            peer_id,
            room_id,
            state: SessionState::Idle,
            media: None,
            pending_local_tracks,
            outbound,
        }
    }

    pub fn peer_id(&self) -> &PeerId {
        &self.peer_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Idle -> Offering: take ownership of a fresh media handle, attach the
    /// pending local tracks, and send our offer to the peer.
    pub async fn start_offer(
        &mut self,
        mut media: Box<dyn MediaSession>,
    ) -> Result<(), NegotiationError> {
        if self.state != SessionState::Idle {
            // Simultaneous mutual offers are not resolved; both sides
            // proceed independently and later signaling is ignored here.
            debug!(
                "not offering to {} in state {:?}",
                self.peer_id, self.state
            );
            return Ok(());
        }

        for track in &self.pending_local_tracks {
            media.add_track(track.clone());
        }
        let offer = media.create_offer().await?;
        media.set_local_description(offer.clone()).await?;

        self.media = Some(media);
        self.state = SessionState::Offering;
        info!("offering voice session to {}", self.peer_id);

        let _ = self.outbound.send(SignalingMessage::Offer {
            user_id: None,
            offer,
            target_user_id: self.peer_id.clone(),
            room_id: self.room_id.clone(),
        });
        Ok(())
    }

    /// Idle -> Answering: apply the remote offer and send our answer back.
    pub async fn accept_offer(
        &mut self,
        mut media: Box<dyn MediaSession>,
        offer: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        if self.state != SessionState::Idle {
            debug!(
                "ignoring offer from {} in state {:?}",
                self.peer_id, self.state
            );
            return Ok(());
        }

        for track in &self.pending_local_tracks {
            media.add_track(track.clone());
        }
        media.set_remote_description(offer).await?;
        let answer = media.create_answer().await?;
        media.set_local_description(answer.clone()).await?;

        self.media = Some(media);
        self.state = SessionState::Answering;
        info!("answering voice session from {}", self.peer_id);

        let _ = self.outbound.send(SignalingMessage::Answer {
            user_id: None,
            answer,
            target_user_id: self.peer_id.clone(),
            room_id: self.room_id.clone(),
        });
        Ok(())
    }

    /// Offering -> Connected: apply the peer's answer.
    pub async fn apply_answer(
        &mut self,
        answer: SessionDescriptor,
    ) -> Result<(), NegotiationError> {
        match self.state {
            SessionState::Offering => {
                let media = self.media.as_mut().ok_or(NegotiationError::SessionReleased)?;
                media.set_remote_description(answer).await?;
                self.state = SessionState::Connected;
                info!("voice session with {} connected", self.peer_id);
                Ok(())
            }
            SessionState::Closed => {
                debug!("ignoring answer from {}: session closed", self.peer_id);
                Ok(())
            }
            state => {
                warn!(
                    "unexpected answer from {} in state {:?}",
                    self.peer_id, state
                );
                Ok(())
            }
        }
    }

    /// Feed a trickled candidate to the transport.
    ///
    /// Candidates arriving before a remote description is set are dropped
    /// with a warning rather than queued.
    pub async fn add_remote_candidate(
        &mut self,
        candidate: CandidateInit,
    ) -> Result<(), NegotiationError> {
        if self.state == SessionState::Closed {
            debug!("ignoring candidate from {}: session closed", self.peer_id);
            return Ok(());
        }

        match self.media.as_mut() {
            Some(media) if media.has_remote_description() => {
                media.add_ice_candidate(candidate).await
            }
            _ => {
                warn!(
                    "dropping candidate from {}: no remote description yet",
                    self.peer_id
                );
                Ok(())
            }
        }
    }

    /// Answering -> Connected, on the engine's negotiation-complete signal.
    pub fn on_negotiated(&mut self) {
        match self.state {
            SessionState::Answering => {
                self.state = SessionState::Connected;
                info!("voice session with {} connected", self.peer_id);
            }
            // The offering side connects when the answer is applied.
            state => debug!(
                "negotiated signal for {} in state {:?}",
                self.peer_id, state
            ),
        }
    }

    /// Any state -> Closed. Releases the media handle; idempotent; emits no
    /// further messages for this peer.
    pub fn close(&mut self) {
        if self.state == SessionState::Closed {
            return;
        }
        if let Some(mut media) = self.media.take() {
            media.close();
        }
        self.state = SessionState::Closed;
        debug!("voice session with {} closed", self.peer_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{LoopbackEngine, MediaEngine, MediaEvent};
    use crate::protocol::DescriptorKind;

    struct Fixture {
        session: PeerSession,
        outbound: mpsc::UnboundedReceiver<SignalingMessage>,
        // Keeps loopback event sends from erroring mid-test.
        _media_events: mpsc::UnboundedReceiver<MediaEvent>,
        engine: LoopbackEngine,
        media_tx: mpsc::UnboundedSender<MediaEvent>,
    }

    fn fixture() -> Fixture {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (media_tx, media_rx) = mpsc::unbounded_channel();
        let session = PeerSession::new(
            "7".into(),
            "r1".into(),
            vec![LocalTrack {
                id: "mic".to_string(),
            }],
            out_tx,
        );
        Fixture {
            session,
            outbound: out_rx,
            _media_events: media_rx,
            engine: LoopbackEngine::new(),
            media_tx,
        }
    }

    fn open(fx: &Fixture) -> Box<dyn MediaSession> {
        fx.engine.open_session("7".into(), fx.media_tx.clone())
    }

    #[tokio::test]
    async fn test_start_offer_emits_one_offer() {
        let mut fx = fixture();
        let media = open(&fx);

        fx.session.start_offer(media).await.unwrap();
        assert_eq!(fx.session.state(), SessionState::Offering);

        match fx.outbound.try_recv().unwrap() {
            SignalingMessage::Offer {
                offer,
                target_user_id,
                room_id,
                ..
            } => {
                assert_eq!(offer.kind, DescriptorKind::Offer);
                assert_eq!(target_user_id, "7".into());
                assert_eq!(room_id, "r1".into());
            }
            other => panic!("expected offer, got {:?}", other),
        }
        assert!(fx.outbound.try_recv().is_err(), "exactly one message");
    }

    #[tokio::test]
    async fn test_accept_offer_emits_one_answer() {
        let mut fx = fixture();
        let media = open(&fx);

        fx.session
            .accept_offer(media, SessionDescriptor::offer("v=0\r\n"))
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Answering);

        match fx.outbound.try_recv().unwrap() {
            SignalingMessage::Answer {
                answer,
                target_user_id,
                ..
            } => {
                assert_eq!(answer.kind, DescriptorKind::Answer);
                assert_eq!(target_user_id, "7".into());
            }
            other => panic!("expected answer, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_answer_connects_offering_session() {
        let mut fx = fixture();
        fx.session.start_offer(open(&fx)).await.unwrap();

        fx.session
            .apply_answer(SessionDescriptor::answer("v=0\r\n"))
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_negotiated_signal_connects_answering_session() {
        let mut fx = fixture();
        fx.session
            .accept_offer(open(&fx), SessionDescriptor::offer("v=0\r\n"))
            .await
            .unwrap();

        fx.session.on_negotiated();
        assert_eq!(fx.session.state(), SessionState::Connected);
    }

    #[tokio::test]
    async fn test_early_candidate_is_dropped_without_state_change() {
        let mut fx = fixture();
        fx.session.start_offer(open(&fx)).await.unwrap();
        // Offering: local description set, remote still missing.

        fx.session
            .add_remote_candidate(CandidateInit {
                candidate: "candidate:0 1 udp 1 127.0.0.1 9 typ host".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            })
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Offering);
    }

    #[tokio::test]
    async fn test_offer_while_offering_is_ignored() {
        let mut fx = fixture();
        fx.session.start_offer(open(&fx)).await.unwrap();
        let _ = fx.outbound.try_recv();

        fx.session
            .accept_offer(open(&fx), SessionDescriptor::offer("v=0\r\n"))
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Offering);
        assert!(fx.outbound.try_recv().is_err(), "no answer for glare offer");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_silences_the_session() {
        let mut fx = fixture();
        fx.session.start_offer(open(&fx)).await.unwrap();
        let _ = fx.outbound.try_recv();

        fx.session.close();
        fx.session.close();
        assert_eq!(fx.session.state(), SessionState::Closed);

        // Post-close signaling is ignored, not an error.
        fx.session
            .apply_answer(SessionDescriptor::answer("v=0\r\n"))
            .await
            .unwrap();
        fx.session
            .add_remote_candidate(CandidateInit {
                candidate: "candidate:0".to_string(),
                sdp_mid: None,
                sdp_m_line_index: None,
            })
            .await
            .unwrap();
        assert_eq!(fx.session.state(), SessionState::Closed);
        assert!(fx.outbound.try_recv().is_err());
    }
}
