//! oscpeer
//!
//! A symmetric Open Sound Control endpoint: sends and receives OSC messages
//! and bundles over UDP or TCP with OSC 1.0 or OSC 1.1 framing, routes
//! incoming packets through a pattern-matching dispatcher with a timetag
//! scheduler, and layers request/response calls on top.
//!
//! # Example
//!
//! ```ignore
//! use oscpeer::{MessageBuilder, PeerBuilder};
//!
//! #[tokio::main]
//! async fn main() -> oscpeer::Result<()> {
//!     let peer = PeerBuilder::new("192.168.1.40", 9000)
//!         .udp("0.0.0.0", 9001)
//!         .build()?;
//!
//!     peer.dispatcher().add_handler("/mixer/*/gain", |message| {
//!         println!("{} {:?}", message.addr, message.args);
//!     })?;
//!     peer.start_listening().await?;
//!
//!     peer.send(&MessageBuilder::new("/mixer/3/gain").arg(0.5f32).build())
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod call;
pub mod dispatcher;
pub mod error;
pub mod peer;
mod scheduler;

pub use builder::PeerBuilder;
pub use call::{CallHandler, CallPolicy};
pub use dispatcher::{Dispatcher, Handler};
pub use error::{PeerError, Result};
pub use peer::{Mode, Peer, PeerConfig, PeerEvent};

pub use oscpeer_core::{
    ArgSpec, Framing, MessageBuilder, MessageSchema, Pattern, ValidationError, Validator,
};
pub use rosc::{OscBundle, OscMessage, OscPacket, OscTime, OscType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::builder::PeerBuilder;
    pub use crate::call::{CallHandler, CallPolicy};
    pub use crate::dispatcher::Dispatcher;
    pub use crate::error::{PeerError, Result};
    pub use crate::peer::{Mode, Peer, PeerEvent};
    pub use oscpeer_core::{Framing, MessageBuilder, MessageSchema, Validator};
    pub use rosc::{OscMessage, OscPacket, OscType};
}
