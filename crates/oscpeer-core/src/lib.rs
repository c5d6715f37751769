//! oscpeer core
//!
//! Core building blocks shared by the oscpeer transport and peer crates:
//! - OSC address pattern compilation and matching ([`Pattern`])
//! - NTP timetag conversion ([`time`])
//! - TCP stream framing, SLIP and length-prefixed ([`frame`])
//! - Message validation seam ([`Validator`], [`MessageSchema`])
//! - Ergonomic message construction ([`MessageBuilder`])
//!
//! The OSC wire codec itself (message/bundle encode and decode) is provided
//! by the `rosc` crate and re-exported here for convenience.

pub mod address;
pub mod error;
pub mod frame;
pub mod message;
pub mod time;
pub mod validate;

pub use address::Pattern;
pub use error::{Error, Result};
pub use frame::{FrameDecoder, Framing};
pub use message::{IntoOscArg, MessageBuilder};
pub use validate::{ArgSpec, MessageSchema, ValidationError, Validator};

pub use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

/// Default maximum framed message size accepted on a TCP stream (64KB).
pub const MAX_FRAME_SIZE: usize = 64 * 1024;
