//! Error types for oscpeer core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid address format
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Address pattern compilation error
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),

    /// Framed message exceeds the configured maximum
    #[error("frame too large: {0} bytes (max {1})")]
    FrameTooLarge(usize, usize),

    /// Malformed byte stream while deframing
    #[error("framing error: {0}")]
    Framing(String),

    /// OSC packet encoding error
    #[error("encode error: {0}")]
    EncodeError(String),

    /// OSC packet decoding error
    #[error("decode error: {0}")]
    DecodeError(String),
}

impl From<rosc::OscError> for Error {
    fn from(e: rosc::OscError) -> Self {
        Error::DecodeError(format!("{:?}", e))
    }
}
