//! Media error types

use thiserror::Error;

/// Failure to capture the local outgoing stream.
///
/// Aborts a call start before any session is created.
#[derive(Debug, Error)]
pub enum MediaAcquisitionError {
    #[error("capture permission denied")]
    PermissionDenied,

    #[error("no capture device available: {0}")]
    DeviceUnavailable(String),
}

/// Failure of a single negotiation step.
///
/// Never closes the session; the failed operation is logged and skipped so a
/// later candidate or renegotiation can still succeed.
#[derive(Debug, Error)]
pub enum NegotiationError {
    #[error("session transport already released")]
    SessionReleased,

    #[error("descriptor rejected: {0}")]
    DescriptorRejected(String),

    #[error("candidate rejected: {0}")]
    CandidateRejected(String),
}
