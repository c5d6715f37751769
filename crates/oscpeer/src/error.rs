//! Peer error types

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PeerError>;

#[derive(Error, Debug)]
pub enum PeerError {
    /// Invalid construction arguments
    #[error("configuration error: {0}")]
    Config(String),

    /// Protocol-level error (patterns, framing, codec)
    #[error("protocol error: {0}")]
    Protocol(#[from] oscpeer_core::Error),

    /// Transport failure
    #[error("transport error: {0}")]
    Transport(#[from] oscpeer_transport::TransportError),

    /// The reply to a call failed validation
    #[error("call rejected: {0}")]
    CallRejected(String),

    /// A newer call on the same return address replaced this one
    #[error("call superseded")]
    CallSuperseded,
}
