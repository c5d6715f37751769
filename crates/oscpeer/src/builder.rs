//! Peer builder

use oscpeer_core::Framing;

use crate::error::{PeerError, Result};
use crate::peer::{Mode, Peer, PeerConfig};

/// Builder for [`Peer`]
///
/// Defaults to TCP with OSC 1.0 (SLIP) framing; `udp` switches transport
/// mode and sets the mandatory local receive socket.
pub struct PeerBuilder {
    remote_addr: String,
    remote_port: u16,
    mode: Mode,
    framing: Framing,
    bind_addr: Option<String>,
    bind_port: Option<u16>,
    max_frame_size: usize,
    keepalive_secs: u64,
}

impl PeerBuilder {
    /// Create a builder for a peer at `remote_addr:remote_port`
    pub fn new(remote_addr: &str, remote_port: u16) -> Self {
        Self {
            remote_addr: remote_addr.to_string(),
            remote_port,
            mode: Mode::Tcp,
            framing: Framing::default(),
            bind_addr: None,
            bind_port: None,
            max_frame_size: oscpeer_core::MAX_FRAME_SIZE,
            keepalive_secs: 30,
        }
    }

    /// Use UDP, receiving on `bind_addr:bind_port`
    pub fn udp(mut self, bind_addr: &str, bind_port: u16) -> Self {
        self.mode = Mode::Udp;
        self.bind_addr = Some(bind_addr.to_string());
        self.bind_port = Some(bind_port);
        self
    }

    /// Use TCP, connecting out on the first send
    pub fn tcp(mut self) -> Self {
        self.mode = Mode::Tcp;
        self
    }

    /// Use TCP and also accept one inbound connection on
    /// `bind_addr:bind_port`
    ///
    /// The peer is symmetric: whichever side sends first opens the
    /// connection, the other side's listener adopts it.
    pub fn tcp_listener(mut self, bind_addr: &str, bind_port: u16) -> Self {
        self.mode = Mode::Tcp;
        self.bind_addr = Some(bind_addr.to_string());
        self.bind_port = Some(bind_port);
        self
    }

    /// Set the packet framing version (TCP streams only)
    pub fn framing(mut self, framing: Framing) -> Self {
        self.framing = framing;
        self
    }

    /// Set the maximum framed message size on TCP streams
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the TCP keep-alive interval (0 disables)
    pub fn keepalive_secs(mut self, secs: u64) -> Self {
        self.keepalive_secs = secs;
        self
    }

    /// Validate the configuration and build the peer
    pub fn build(self) -> Result<Peer> {
        let remote_addr = self
            .remote_addr
            .parse()
            .map_err(|_| PeerError::Config(format!("invalid remote address: {}", self.remote_addr)))?;

        let bind_addr = match &self.bind_addr {
            Some(addr) => Some(
                addr.parse()
                    .map_err(|_| PeerError::Config(format!("invalid bind address: {}", addr)))?,
            ),
            None => None,
        };

        Peer::new(PeerConfig {
            remote_addr,
            remote_port: self.remote_port,
            mode: self.mode,
            framing: self.framing,
            bind_addr,
            bind_port: self.bind_port,
            max_frame_size: self.max_frame_size,
            keepalive_secs: self.keepalive_secs,
        })
    }
}
