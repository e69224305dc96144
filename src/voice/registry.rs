//! Session registry
//!
//! Owns the PeerId -> PeerSession map. The room coordinator is the single
//! writer; nothing else creates or removes sessions.

use std::collections::HashMap;

use tokio::sync::mpsc;
use tracing::debug;

use crate::media::LocalTrack;
use crate::protocol::{PeerId, RoomId, SignalingMessage};

use super::peer::{PeerSession, SessionState};

pub struct SessionRegistry {
    sessions: HashMap<PeerId, PeerSession>,
    outbound: mpsc::UnboundedSender<SignalingMessage>,
}

impl SessionRegistry {
    pub fn new(outbound: mpsc::UnboundedSender<SignalingMessage>) -> Self {
        Self {
            sessions: HashMap::new(),
            outbound,
        }
    }

    /// Return the existing live session for `peer_id`, or construct a new
    /// Idle one holding the currently-held local tracks.
    ///
    /// A Closed entry left behind by [`close`] is replaced by a fresh Idle
    /// session, so a peer that left and re-joined negotiates from scratch.
    ///
    /// [`close`]: SessionRegistry::close
    pub fn get_or_create(
        &mut self,
        peer_id: &PeerId,
        room_id: &RoomId,
        local_tracks: &[LocalTrack],
    ) -> &mut PeerSession {
        let entry = self.sessions.entry(peer_id.clone()).or_insert_with(|| {
            debug!("creating session entry for {}", peer_id);
            PeerSession::new(
                peer_id.clone(),
                room_id.clone(),
                local_tracks.to_vec(),
                self.outbound.clone(),
            )
        });

        if entry.state() == SessionState::Closed {
            debug!("replacing closed session entry for {}", peer_id);
            *entry = PeerSession::new(
                peer_id.clone(),
                room_id.clone(),
                local_tracks.to_vec(),
                self.outbound.clone(),
            );
        }
        entry
    }

    pub fn get_mut(&mut self, peer_id: &PeerId) -> Option<&mut PeerSession> {
        self.sessions.get_mut(peer_id)
    }

    /// Whether a Closed entry is currently recorded for `peer_id`.
    pub fn is_closed(&self, peer_id: &PeerId) -> bool {
        self.state_of(peer_id) == Some(SessionState::Closed)
    }

    /// Current state of `peer_id`'s session, if an entry exists.
    pub fn state_of(&self, peer_id: &PeerId) -> Option<SessionState> {
        self.sessions.get(peer_id).map(PeerSession::state)
    }

    /// Transition `peer_id`'s session to Closed but keep the entry, so
    /// signaling still in flight from a departed peer is ignored instead of
    /// being re-answered. The entry itself is deleted by [`remove`],
    /// [`retain_members`] or [`close_all`].
    ///
    /// [`remove`]: SessionRegistry::remove
    /// [`retain_members`]: SessionRegistry::retain_members
    /// [`close_all`]: SessionRegistry::close_all
    pub fn close(&mut self, peer_id: &PeerId, room_id: &RoomId) {
        self.get_or_create(peer_id, room_id, &[]).close();
    }

    /// Release `peer_id`'s media handle and drop the entry.
    ///
    /// Idempotent: removing an absent peer is a no-op with no second release
    /// side effect.
    pub fn remove(&mut self, peer_id: &PeerId) {
        if let Some(mut session) = self.sessions.remove(peer_id) {
            session.close();
            debug!("removed session for {}", peer_id);
        }
    }

    /// Close and drop every session whose peer is no longer in the
    /// server-authoritative roster.
    pub fn retain_members(&mut self, roster: &[PeerId]) {
        self.sessions.retain(|peer_id, session| {
            if roster.contains(peer_id) {
                true
            } else {
                debug!("peer {} vanished from the roster", peer_id);
                session.close();
                false
            }
        });
    }

    /// Close and drop everything; used on call end and channel disconnect.
    pub fn close_all(&mut self) {
        for session in self.sessions.values_mut() {
            session.close();
        }
        self.sessions.clear();
    }

    /// Peers whose sessions are still live (not Closed).
    pub fn live_peers(&self) -> Vec<PeerId> {
        self.sessions
            .iter()
            .filter(|(_, s)| s.state().is_live())
            .map(|(id, _)| id.clone())
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> (
        SessionRegistry,
        mpsc::UnboundedReceiver<SignalingMessage>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        (SessionRegistry::new(tx), rx)
    }

    #[test]
    fn test_get_or_create_returns_the_same_session() {
        let (mut registry, _rx) = registry();
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);
        assert_eq!(registry.live_peers(), vec!["7".into()]);
    }

    #[test]
    fn test_remove_twice_is_idempotent() {
        let (mut registry, _rx) = registry();
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);

        registry.remove(&"7".into());
        assert!(registry.is_empty());
        registry.remove(&"7".into());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_close_leaves_a_closed_entry_behind() {
        let (mut registry, _rx) = registry();
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);

        registry.close(&"7".into(), &"r1".into());
        assert!(registry.is_closed(&"7".into()));
        assert!(registry.live_peers().is_empty());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_get_or_create_replaces_a_closed_entry() {
        let (mut registry, _rx) = registry();
        registry.close(&"7".into(), &"r1".into());
        assert!(registry.is_closed(&"7".into()));

        let session = registry.get_or_create(&"7".into(), &"r1".into(), &[]);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[test]
    fn test_retain_members_drops_vanished_peers() {
        let (mut registry, _rx) = registry();
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);
        registry.get_or_create(&"9".into(), &"r1".into(), &[]);

        registry.retain_members(&["9".into(), "11".into()]);
        assert_eq!(registry.live_peers(), vec!["9".into()]);
    }

    #[test]
    fn test_close_all_empties_the_registry() {
        let (mut registry, _rx) = registry();
        registry.get_or_create(&"7".into(), &"r1".into(), &[]);
        registry.get_or_create(&"9".into(), &"r1".into(), &[]);

        registry.close_all();
        assert!(registry.is_empty());
    }
}
