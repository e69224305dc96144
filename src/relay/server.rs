//! Relay server
//!
//! Assigns each WebSocket connection a peer id, keeps the connected-user
//! roster, and moves signaling frames: chat and roster broadcasts fan out,
//! voice room events fan out to room members, negotiation frames are
//! forwarded to their target only. Every broadcast or forwarded frame is
//! stamped with the sender's id so receivers can attribute it.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use crate::protocol::{PeerId, RoomId, SignalingMessage};

use super::error::RelayError;

struct ClientHandle {
    sender: mpsc::UnboundedSender<Message>,
    voice_room: Option<RoomId>,
}

#[derive(Default)]
struct ServerState {
    clients: HashMap<PeerId, ClientHandle>,
}

impl ServerState {
    fn send_to(&self, peer_id: &PeerId, message: &SignalingMessage) {
        if let Some(client) = self.clients.get(peer_id) {
            let _ = client.sender.send(Message::Text(message.encode()));
        } else {
            debug!("dropping frame for unknown peer {}", peer_id);
        }
    }

    fn broadcast(&self, message: &SignalingMessage, exclude: Option<&PeerId>) {
        let frame = Message::Text(message.encode());
        for (peer_id, client) in &self.clients {
            if Some(peer_id) != exclude {
                let _ = client.sender.send(frame.clone());
            }
        }
    }

    fn broadcast_to_room(
        &self,
        room_id: &RoomId,
        message: &SignalingMessage,
        exclude: Option<&PeerId>,
    ) {
        let frame = Message::Text(message.encode());
        for (peer_id, client) in &self.clients {
            if Some(peer_id) != exclude && client.voice_room.as_ref() == Some(room_id) {
                let _ = client.sender.send(frame.clone());
            }
        }
    }

    fn broadcast_user_list(&self) {
        let mut users: Vec<PeerId> = self.clients.keys().cloned().collect();
        users.sort();
        self.broadcast(&SignalingMessage::UserList { users }, None);
    }
}

/// The signaling relay.
pub struct RelayServer {
    state: Arc<RwLock<ServerState>>,
}

impl RelayServer {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ServerState::default())),
        }
    }

    /// Accept connections until cancelled.
    pub async fn run(&self, addr: &str) -> Result<(), RelayError> {
        let listener = TcpListener::bind(addr).await?;
        info!("relay server listening on {}", addr);

        loop {
            match listener.accept().await {
                Ok((stream, remote_addr)) => {
                    debug!("new connection from {}", remote_addr);
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(err) = handle_connection(stream, state).await {
                            warn!("connection from {} ended: {}", remote_addr, err);
                        }
                    });
                }
                Err(err) => {
                    error!("accept error: {}", err);
                }
            }
        }
    }
}

impl Default for RelayServer {
    fn default() -> Self {
        Self::new()
    }
}

async fn handle_connection(
    stream: TcpStream,
    state: Arc<RwLock<ServerState>>,
) -> Result<(), RelayError> {
    let ws_stream = accept_async(stream).await?;
    let (mut write, mut read) = ws_stream.split();

    let peer_id = PeerId::random();
    let (sender, mut outbox) = mpsc::unbounded_channel::<Message>();

    // One writer task per client; handlers only ever touch the sender, so
    // the state lock is never held across an await.
    let writer = tokio::spawn(async move {
        while let Some(frame) = outbox.recv().await {
            if write.send(frame).await.is_err() {
                break;
            }
        }
    });

    {
        let mut state = state.write();
        state.clients.insert(
            peer_id.clone(),
            ClientHandle {
                sender,
                voice_room: None,
            },
        );
        state.broadcast_user_list();
    }
    info!("client {} connected", peer_id);

    while let Some(frame) = read.next().await {
        match frame {
            Ok(Message::Text(text)) => match SignalingMessage::decode(&text) {
                Ok(message) => dispatch(&peer_id, message, &state),
                Err(err) => warn!("dropping frame from {}: {}", peer_id, err),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(err) => {
                warn!("websocket error for {}: {}", peer_id, err);
                break;
            }
        }
    }

    disconnect(&peer_id, &state);
    writer.abort();
    Ok(())
}

/// Route one client frame.
fn dispatch(peer_id: &PeerId, message: SignalingMessage, state: &Arc<RwLock<ServerState>>) {
    match message {
        SignalingMessage::Chat { message, .. } => {
            let state = state.read();
            state.broadcast(
                &SignalingMessage::Chat {
                    user_id: Some(peer_id.clone()),
                    message,
                },
                Some(peer_id),
            );
        }

        SignalingMessage::JoinVoice { room_id, .. } => {
            let mut state = state.write();
            if let Some(client) = state.clients.get_mut(peer_id) {
                client.voice_room = Some(room_id.clone());
            }
            info!("client {} joined voice room {}", peer_id, room_id);
            state.broadcast_to_room(
                &room_id,
                &SignalingMessage::JoinVoice {
                    user_id: Some(peer_id.clone()),
                    room_id: room_id.clone(),
                },
                Some(peer_id),
            );
        }

        SignalingMessage::LeaveVoice { .. } => {
            let mut state = state.write();
            let room = state
                .clients
                .get_mut(peer_id)
                .and_then(|client| client.voice_room.take());
            if let Some(room_id) = room {
                info!("client {} left voice room {}", peer_id, room_id);
                state.broadcast_to_room(
                    &room_id,
                    &SignalingMessage::LeaveVoice {
                        user_id: Some(peer_id.clone()),
                        room_id: Some(room_id.clone()),
                    },
                    Some(peer_id),
                );
            }
        }

        SignalingMessage::VoiceInvite {
            target_user_id: Some(target),
            room_id,
            ..
        } => {
            state.read().send_to(
                &target,
                &SignalingMessage::VoiceInvite {
                    user_id: Some(peer_id.clone()),
                    target_user_id: None,
                    room_id,
                },
            );
        }

        SignalingMessage::Offer {
            offer,
            target_user_id,
            room_id,
            ..
        } => {
            let target = target_user_id.clone();
            state.read().send_to(
                &target,
                &SignalingMessage::Offer {
                    user_id: Some(peer_id.clone()),
                    offer,
                    target_user_id,
                    room_id,
                },
            );
        }

        SignalingMessage::Answer {
            answer,
            target_user_id,
            room_id,
            ..
        } => {
            let target = target_user_id.clone();
            state.read().send_to(
                &target,
                &SignalingMessage::Answer {
                    user_id: Some(peer_id.clone()),
                    answer,
                    target_user_id,
                    room_id,
                },
            );
        }

        SignalingMessage::IceCandidate {
            candidate,
            target_user_id,
            room_id,
            ..
        } => {
            let target = target_user_id.clone();
            state.read().send_to(
                &target,
                &SignalingMessage::IceCandidate {
                    user_id: Some(peer_id.clone()),
                    candidate,
                    target_user_id,
                    room_id,
                },
            );
        }

        // Server-authoritative or malformed for this direction.
        other => debug!("ignoring client frame from {}: {:?}", peer_id, other),
    }
}

/// Drop the client, synthesizing a leave for a peer that vanished mid-call
/// so the survivors close their session promptly.
fn disconnect(peer_id: &PeerId, state: &Arc<RwLock<ServerState>>) {
    let mut state = state.write();
    let room = state
        .clients
        .remove(peer_id)
        .and_then(|client| client.voice_room);

    if let Some(room_id) = room {
        state.broadcast_to_room(
            &room_id,
            &SignalingMessage::LeaveVoice {
                user_id: Some(peer_id.clone()),
                room_id: Some(room_id.clone()),
            },
            Some(peer_id),
        );
    }
    state.broadcast_user_list();
    info!("client {} disconnected", peer_id);
}
