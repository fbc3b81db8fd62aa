//! Error types for the CEC core

use cec_protocol::{LogicalAddress, ParseError};
use thiserror::Error;

/// Errors surfaced at the edges of the core
///
/// Dispatch and transmit report their outcome as a boolean or an
/// [`AbortReason`](cec_protocol::AbortReason); these errors cover frame
/// decoding, configuration and lookups made through the processor.
#[derive(Debug, Error)]
pub enum CecError {
    /// Frame could not be decoded
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    /// No device exists at this address
    #[error("device not found: {0}")]
    DeviceNotFound(LogicalAddress),

    /// Device is not an audio system
    #[error("not an audio system: {0}")]
    NotAnAudioSystem(LogicalAddress),

    /// Configuration rejected
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The actor task is no longer running
    #[error("actor stopped")]
    ActorStopped,
}
