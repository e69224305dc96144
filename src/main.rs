//! huddle - text chat and ad-hoc mesh voice calls

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{warn, Level};
use tracing_subscriber::FmtSubscriber;

use huddle::media::{LoopbackEngine, MediaEngine};
use huddle::protocol::{RoomId, SignalingMessage};
use huddle::relay::{RelayClient, RelayConnection, RelayError};
use huddle::voice::{RoomCoordinator, VoiceEvent};

/// Fixed delay before re-dialing a dropped relay connection.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Parser)]
#[command(name = "huddle")]
#[command(about = "Text chat and ad-hoc mesh voice calls")]
#[command(version)]
struct Cli {
    /// Relay server URL
    #[arg(
        short,
        long,
        default_value = "ws://127.0.0.1:8080",
        env = "HUDDLE_SERVER"
    )]
    server: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn setup_logging(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::INFO };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");
}

fn print_help() {
    println!("Commands:");
    println!("  /call [room]     start or join a voice call");
    println!("  /invite <user>   invite a user to your call");
    println!("  /hangup          leave the call");
    println!("  /users           list connected users");
    println!("  /quit            exit");
    println!("Anything else is sent as chat.");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    print_help();

    let client = RelayClient::new(&cli.server);
    loop {
        match client.connect().await {
            Ok(connection) => {
                println!("Connected to {}", cli.server);
                if run_session(connection).await {
                    return Ok(());
                }
                println!("Lost connection to relay, reconnecting...");
            }
            Err(err) => {
                warn!("relay connect failed: {}", err);
            }
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

/// Drive one relay connection until it drops or the user quits.
///
/// Returns true when the user asked to exit. A fresh coordinator is built
/// per connection, so a reconnect starts from a clean slate.
async fn run_session(mut connection: RelayConnection) -> bool {
    let engine: Arc<dyn MediaEngine> = Arc::new(LoopbackEngine::new());
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
    let (media_tx, mut media_rx) = mpsc::unbounded_channel();
    let (voice_tx, mut voice_rx) = mpsc::unbounded_channel();
    let mut coordinator = RoomCoordinator::new(engine, outbound_tx.clone(), media_tx, voice_tx);

    let stdin = tokio::io::stdin();
    let mut lines = BufReader::new(stdin).lines();

    let quit = 'session: loop {
        // Flush everything the coordinator queued for the relay before
        // waiting for the next event.
        while let Ok(message) = outbound_rx.try_recv() {
            if let Err(err) = connection.send(&message).await {
                warn!("relay send failed: {}", err);
                break 'session false;
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                break 'session true;
            }

            inbound = connection.recv() => match inbound {
                Ok(SignalingMessage::Chat { user_id, message }) => {
                    let from = user_id
                        .map(|id| id.to_string())
                        .unwrap_or_else(|| "?".to_string());
                    println!("💬 {}: {}", from, message);
                }
                Ok(SignalingMessage::UserList { users }) => {
                    let roster: Vec<String> = users.iter().map(ToString::to_string).collect();
                    println!("Online: {}", roster.join(", "));
                    coordinator.on_user_list(users);
                }
                Ok(message) => coordinator.handle_message(message).await,
                Err(RelayError::Disconnected) => break 'session false,
                Err(err) => {
                    warn!("relay error: {}", err);
                    break 'session false;
                }
            },

            Some(event) = media_rx.recv() => coordinator.on_media_event(event),

            Some(event) = voice_rx.recv() => print_voice_event(&event),

            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if handle_line(line.trim(), &mut coordinator, &outbound_tx).await {
                        break 'session true;
                    }
                }
                Ok(None) => break 'session true,
                Err(err) => {
                    warn!("stdin error: {}", err);
                    break 'session true;
                }
            },
        }
    };

    if quit {
        coordinator.leave_room();
        while let Ok(message) = outbound_rx.try_recv() {
            let _ = connection.send(&message).await;
        }
        let _ = connection.close().await;
    } else {
        coordinator.on_disconnect();
    }
    quit
}

/// Interpret one line of user input. Returns true on quit.
async fn handle_line(
    line: &str,
    coordinator: &mut RoomCoordinator,
    outbound: &mpsc::UnboundedSender<SignalingMessage>,
) -> bool {
    if line.is_empty() {
        return false;
    }

    if let Some(rest) = line.strip_prefix('/') {
        let mut parts = rest.split_whitespace();
        match parts.next() {
            Some("quit") | Some("q") => return true,
            Some("help") => print_help(),
            Some("users") => {
                let roster: Vec<String> =
                    coordinator.roster().iter().map(ToString::to_string).collect();
                println!("Online: {}", roster.join(", "));
            }
            Some("call") => {
                let room_id = parts
                    .next()
                    .map(RoomId::from)
                    .unwrap_or_else(RoomId::random);
                match coordinator.join_room(room_id.clone()).await {
                    Ok(()) => println!("📞 Joined voice room {}", room_id),
                    Err(err) => println!("Cannot start call: {}", err),
                }
            }
            Some("hangup") => {
                coordinator.leave_room();
                println!("📴 Left the call");
            }
            Some("invite") => match parts.next() {
                Some(target) => {
                    if let Err(err) = coordinator.invite(target.into()).await {
                        println!("Cannot invite: {}", err);
                    }
                }
                None => println!("Usage: /invite <user>"),
            },
            _ => println!("Unknown command; /help lists them"),
        }
        return false;
    }

    let _ = outbound.send(SignalingMessage::Chat {
        user_id: None,
        message: line.to_string(),
    });
    println!("💬 You: {}", line);
    false
}

fn print_voice_event(event: &VoiceEvent) {
    match event {
        VoiceEvent::InviteReceived { from, room_id } => {
            println!(
                "📞 {} invites you to a call; use /call {} to accept",
                from, room_id
            );
        }
        VoiceEvent::PeerConnected { peer_id } => {
            println!("📞 Voice connected with {}", peer_id);
        }
        VoiceEvent::PeerClosed { peer_id } => {
            println!("📴 {} left the call", peer_id);
        }
        VoiceEvent::TrackReceived { from, .. } => {
            println!("🔊 Receiving audio from {}", from);
        }
    }
}
