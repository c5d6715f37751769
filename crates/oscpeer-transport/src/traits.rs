//! Transport trait definitions

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// Events produced by a transport's receive side
#[derive(Debug, Clone)]
pub enum TransportEvent {
    /// A complete packet payload was received
    Data(Bytes),
    /// Connection closed (clean or error)
    Disconnected { reason: Option<String> },
    /// Error occurred
    Error(String),
}

/// Trait for sending packet payloads
#[async_trait]
pub trait TransportSender: Send + Sync {
    /// Send one packet payload
    async fn send(&self, data: Bytes) -> Result<()>;

    /// Check if the transport is usable
    fn is_connected(&self) -> bool;

    /// Close the sender
    fn close(&self);
}

/// Trait for receiving transport events
#[async_trait]
pub trait TransportReceiver: Send {
    /// Receive the next event; `None` means the transport is gone
    async fn recv(&mut self) -> Option<TransportEvent>;
}
