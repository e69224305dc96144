//! Room membership and the coordinator
//!
//! The coordinator reacts to relay messages and media-engine events, telling
//! the session registry when to create or close per-peer sessions. All of it
//! runs on one task; inbound messages and engine events are serialized by
//! the embedding client's event loop.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::media::{
    LocalStream, LocalTrack, MediaEngine, MediaEvent, MediaEventKind, RemoteTrack,
};
use crate::protocol::{CandidateInit, PeerId, RoomId, SessionDescriptor, SignalingMessage};

use super::error::VoiceError;
use super::peer::SessionState;
use super::registry::SessionRegistry;

/// The single active call, if any: which room we are in and the exclusively
/// owned local capture stream. Both are set on join and cleared together on
/// call end.
#[derive(Default)]
pub struct RoomMembership {
    room_id: Option<RoomId>,
    local_stream: Option<LocalStream>,
}

impl RoomMembership {
    pub fn room_id(&self) -> Option<&RoomId> {
        self.room_id.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.room_id.is_some()
    }

    fn begin(&mut self, room_id: RoomId, stream: LocalStream) {
        self.room_id = Some(room_id);
        self.local_stream = Some(stream);
    }

    /// Clear the membership, releasing the capture stream. Returns the room
    /// that was active.
    fn clear(&mut self) -> Option<RoomId> {
        self.local_stream = None;
        self.room_id.take()
    }

    fn local_tracks(&self) -> Vec<LocalTrack> {
        self.local_stream
            .as_ref()
            .map(|s| s.tracks.clone())
            .unwrap_or_default()
    }
}

/// Outward-facing call events for the embedding client to display.
#[derive(Debug, Clone)]
pub enum VoiceEvent {
    InviteReceived { from: PeerId, room_id: RoomId },
    PeerConnected { peer_id: PeerId },
    PeerClosed { peer_id: PeerId },
    TrackReceived { from: PeerId, track: RemoteTrack },
}

/// Reacts to join/leave/invite and negotiation messages by driving the
/// session registry and the per-peer state machines.
pub struct RoomCoordinator {
    engine: Arc<dyn MediaEngine>,
    registry: SessionRegistry,
    membership: RoomMembership,
    /// Last server-authoritative user list.
    roster: Vec<PeerId>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
    media_events: mpsc::UnboundedSender<MediaEvent>,
    events: mpsc::UnboundedSender<VoiceEvent>,
}

impl RoomCoordinator {
    pub fn new(
        engine: Arc<dyn MediaEngine>,
        outbound: mpsc::UnboundedSender<SignalingMessage>,
        media_events: mpsc::UnboundedSender<MediaEvent>,
        events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Self {
        Self {
            engine,
            registry: SessionRegistry::new(outbound.clone()),
            membership: RoomMembership::default(),
            roster: Vec::new(),
            outbound,
            media_events,
            events,
        }
    }

    pub fn membership(&self) -> &RoomMembership {
        &self.membership
    }

    pub fn roster(&self) -> &[PeerId] {
        &self.roster
    }

    /// Peers with a live (non-Closed) session.
    pub fn live_peers(&self) -> Vec<PeerId> {
        self.registry.live_peers()
    }

    /// Current state of one peer's session, if an entry exists.
    pub fn session_state(&self, peer_id: &PeerId) -> Option<SessionState> {
        self.registry.state_of(peer_id)
    }

    /// Start or join a call: capture the microphone, record the membership
    /// and announce ourselves to the room.
    ///
    /// A capture failure aborts the join; no membership is recorded and no
    /// session is created.
    pub async fn join_room(&mut self, room_id: RoomId) -> Result<(), VoiceError> {
        if let Some(current) = self.membership.room_id() {
            return Err(VoiceError::AlreadyInRoom(current.clone()));
        }

        let stream = self.engine.capture().await?;
        info!("joining voice room {}", room_id);
        self.membership.begin(room_id.clone(), stream);

        let _ = self.outbound.send(SignalingMessage::JoinVoice {
            user_id: None,
            room_id,
        });
        Ok(())
    }

    /// End the call: close every session, announce the exit once and clear
    /// the membership (releasing the capture stream). No-op when idle.
    pub fn leave_room(&mut self) {
        let Some(room_id) = self.membership.clear() else {
            debug!("leave requested with no active call");
            return;
        };

        self.registry.close_all();
        info!("left voice room {}", room_id);
        let _ = self.outbound.send(SignalingMessage::LeaveVoice {
            user_id: None,
            room_id: Some(room_id),
        });
    }

    /// Invite a peer to the current call, bootstrapping a fresh room (and
    /// joining it) when none is active.
    pub async fn invite(&mut self, target: PeerId) -> Result<(), VoiceError> {
        if !self.membership.is_active() {
            self.join_room(RoomId::random()).await?;
        }

        if let Some(room_id) = self.membership.room_id() {
            info!("inviting {} to voice room {}", target, room_id);
            let _ = self.outbound.send(SignalingMessage::VoiceInvite {
                user_id: None,
                target_user_id: Some(target),
                room_id: room_id.clone(),
            });
        }
        Ok(())
    }

    /// Dispatch one decoded relay message.
    ///
    /// Inbound negotiation messages must carry the relay-stamped sender id;
    /// unattributed ones are dropped with a warning.
    pub async fn handle_message(&mut self, message: SignalingMessage) {
        match message {
            SignalingMessage::UserList { users } => self.on_user_list(users),
            SignalingMessage::JoinVoice {
                user_id: Some(peer_id),
                room_id,
            } => self.on_peer_joined(peer_id, room_id).await,
            SignalingMessage::LeaveVoice {
                user_id: Some(peer_id),
                ..
            } => self.on_peer_left(&peer_id),
            SignalingMessage::Offer {
                user_id: Some(peer_id),
                offer,
                room_id,
                ..
            } => self.on_offer(peer_id, offer, room_id).await,
            SignalingMessage::Answer {
                user_id: Some(peer_id),
                answer,
                ..
            } => self.on_answer(&peer_id, answer).await,
            SignalingMessage::IceCandidate {
                user_id: Some(peer_id),
                candidate,
                ..
            } => self.on_candidate(&peer_id, candidate).await,
            SignalingMessage::VoiceInvite {
                user_id: Some(peer_id),
                room_id,
                ..
            } => {
                info!("voice invite from {} for room {}", peer_id, room_id);
                let _ = self.events.send(VoiceEvent::InviteReceived {
                    from: peer_id,
                    room_id,
                });
            }
            // Chat is rendered by the embedding client, not coordinated here.
            SignalingMessage::Chat { .. } => {}
            other => warn!("dropping unattributed voice message: {:?}", other),
        }
    }

    /// A peer joined a room; when it is ours, the local side initiates
    /// toward the newcomer.
    pub async fn on_peer_joined(&mut self, peer_id: PeerId, room_id: RoomId) {
        if self.membership.room_id() != Some(&room_id) {
            debug!("peer {} joined {}, not our room", peer_id, room_id);
            return;
        }

        let media = self
            .engine
            .open_session(peer_id.clone(), self.media_events.clone());
        let tracks = self.membership.local_tracks();
        let session = self.registry.get_or_create(&peer_id, &room_id, &tracks);
        if let Err(err) = session.start_offer(media).await {
            warn!("failed to offer to {}: {}", peer_id, err);
        }
    }

    /// A peer left the call. Its session (if any) is closed; the Closed
    /// entry stays so signaling still in flight from it is ignored.
    pub fn on_peer_left(&mut self, peer_id: &PeerId) {
        let Some(room_id) = self.membership.room_id().cloned() else {
            debug!("peer {} left voice while we are not in a call", peer_id);
            return;
        };

        self.registry.close(peer_id, &room_id);
        let _ = self.events.send(VoiceEvent::PeerClosed {
            peer_id: peer_id.clone(),
        });
    }

    /// Remote offer: answer it, creating the session if this is first
    /// contact with the peer.
    pub async fn on_offer(&mut self, peer_id: PeerId, offer: SessionDescriptor, room_id: RoomId) {
        if self.membership.room_id() != Some(&room_id) {
            debug!("ignoring offer from {} for room {}", peer_id, room_id);
            return;
        }
        if self.registry.is_closed(&peer_id) {
            debug!("ignoring offer from {}: session already closed", peer_id);
            return;
        }

        let media = self
            .engine
            .open_session(peer_id.clone(), self.media_events.clone());
        let tracks = self.membership.local_tracks();
        let session = self.registry.get_or_create(&peer_id, &room_id, &tracks);
        if let Err(err) = session.accept_offer(media, offer).await {
            warn!("failed to answer {}: {}", peer_id, err);
        }
    }

    /// Remote answer for a session we are offering.
    pub async fn on_answer(&mut self, peer_id: &PeerId, answer: SessionDescriptor) {
        let Some(session) = self.registry.get_mut(peer_id) else {
            warn!("dropping answer from {}: no session", peer_id);
            return;
        };

        let before = session.state();
        if let Err(err) = session.apply_answer(answer).await {
            warn!("failed to apply answer from {}: {}", peer_id, err);
            return;
        }
        if before != SessionState::Connected && session.state() == SessionState::Connected {
            let _ = self.events.send(VoiceEvent::PeerConnected {
                peer_id: peer_id.clone(),
            });
        }
    }

    /// Trickled candidate from a peer.
    pub async fn on_candidate(&mut self, peer_id: &PeerId, candidate: CandidateInit) {
        let Some(session) = self.registry.get_mut(peer_id) else {
            warn!("dropping candidate from {}: no session", peer_id);
            return;
        };

        if let Err(err) = session.add_remote_candidate(candidate).await {
            warn!("candidate from {} rejected: {}", peer_id, err);
        }
    }

    /// Server-authoritative roster update. Sessions for peers no longer
    /// connected are closed and removed.
    pub fn on_user_list(&mut self, users: Vec<PeerId>) {
        self.registry.retain_members(&users);
        self.roster = users;
    }

    /// An asynchronous signal from one peer's media transport.
    pub fn on_media_event(&mut self, event: MediaEvent) {
        match event.kind {
            MediaEventKind::CandidateDiscovered(candidate) => {
                let Some(room_id) = self.membership.room_id() else {
                    return;
                };
                let live = self
                    .registry
                    .state_of(&event.peer_id)
                    .is_some_and(|s| s.is_live());
                if !live {
                    debug!("discarding candidate for closed session {}", event.peer_id);
                    return;
                }

                let _ = self.outbound.send(SignalingMessage::IceCandidate {
                    user_id: None,
                    candidate,
                    target_user_id: event.peer_id,
                    room_id: room_id.clone(),
                });
            }
            MediaEventKind::Negotiated => {
                if let Some(session) = self.registry.get_mut(&event.peer_id) {
                    let before = session.state();
                    session.on_negotiated();
                    if before != SessionState::Connected
                        && session.state() == SessionState::Connected
                    {
                        let _ = self.events.send(VoiceEvent::PeerConnected {
                            peer_id: event.peer_id,
                        });
                    }
                }
            }
            MediaEventKind::TrackReceived(track) => {
                let live = self
                    .registry
                    .state_of(&event.peer_id)
                    .is_some_and(|s| s.is_live());
                if !live {
                    debug!("discarding track for closed session {}", event.peer_id);
                    return;
                }
                let _ = self.events.send(VoiceEvent::TrackReceived {
                    from: event.peer_id,
                    track,
                });
            }
        }
    }

    /// The relay channel dropped. Everything is torn down; the embedding
    /// client rebuilds state after reconnecting.
    pub fn on_disconnect(&mut self) {
        if self.membership.is_active() {
            info!("relay channel lost, tearing down the voice call");
        }
        self.registry.close_all();
        self.membership.clear();
        self.roster.clear();
    }
}
