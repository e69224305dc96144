//! Media capability interface
//!
//! The signaling layer never touches packets, codecs or devices; it drives
//! any engine that can produce offers/answers and accept candidates. Real
//! engines live outside this crate. [`LoopbackEngine`] is the in-process
//! implementation used by the test suite and the reference CLI.

mod engine;
mod error;
mod loopback;

pub use engine::{
    LocalStream, LocalTrack, MediaEngine, MediaEvent, MediaEventKind, MediaSession, RemoteTrack,
};
pub use error::{MediaAcquisitionError, NegotiationError};
pub use loopback::LoopbackEngine;
