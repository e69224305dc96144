//! Relay channel
//!
//! WebSocket transport between clients and the relay server. The relay
//! delivers signaling frames; it never carries media. Delivery is
//! best-effort: there is no acknowledgment or retry, and a reconnect means
//! every peer session gets torn down and rebuilt.

mod client;
mod error;
mod server;

pub use client::{RelayClient, RelayConnection};
pub use error::RelayError;
pub use server::RelayServer;
