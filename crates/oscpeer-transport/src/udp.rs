//! UDP transport implementation
//!
//! Connectionless transport: one OSC packet per datagram, no framing. The
//! receive side reports the datagram source so the caller can apply
//! peer-address filtering.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::net::UdpSocket;
use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::TransportSender;

/// UDP configuration
#[derive(Debug, Clone)]
pub struct UdpConfig {
    /// Maximum packet size
    pub max_packet_size: usize,
}

impl Default for UdpConfig {
    fn default() -> Self {
        Self {
            max_packet_size: 65507, // max UDP payload
        }
    }
}

/// UDP transport (connectionless)
pub struct UdpTransport {
    socket: Arc<UdpSocket>,
    config: UdpConfig,
}

impl UdpTransport {
    /// Bind to a local address
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        Self::bind_with_config(addr, UdpConfig::default()).await
    }

    /// Bind with config
    pub async fn bind_with_config(addr: SocketAddr, config: UdpConfig) -> Result<Self> {
        let socket = UdpSocket::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        info!("udp bound to {}", addr);
        Ok(Self {
            socket: Arc::new(socket),
            config,
        })
    }

    /// Get local address
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.socket.local_addr().map_err(TransportError::Io)
    }

    /// Create a sender bound to a specific remote address
    pub fn sender_to(&self, remote: SocketAddr) -> UdpSender {
        UdpSender {
            socket: self.socket.clone(),
            remote,
            open: Arc::new(AtomicBool::new(true)),
        }
    }

    /// Create a receiver sharing this transport's socket
    pub fn receiver(&self) -> UdpReceiver {
        UdpReceiver {
            socket: self.socket.clone(),
            buf: vec![0u8; self.config.max_packet_size],
        }
    }

    /// Send one datagram to a specific address
    pub async fn send_to(&self, data: &[u8], target: SocketAddr) -> Result<()> {
        self.socket
            .send_to(data, target)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }
}

/// UDP sender (to a specific remote)
pub struct UdpSender {
    socket: Arc<UdpSocket>,
    remote: SocketAddr,
    open: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for UdpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        self.socket
            .send_to(&data, self.remote)
            .await
            .map_err(|e| TransportError::SendFailed(e.to_string()))?;
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.open.store(false, Ordering::SeqCst);
    }
}

/// UDP receiver
pub struct UdpReceiver {
    socket: Arc<UdpSocket>,
    buf: Vec<u8>,
}

impl UdpReceiver {
    /// Receive the next datagram with its source address
    pub async fn recv_from(&mut self) -> Result<(Bytes, SocketAddr)> {
        let (len, from) = self.socket.recv_from(&mut self.buf).await?;
        debug!("udp received {} bytes from {}", len, from);
        Ok((Bytes::copy_from_slice(&self.buf[..len]), from))
    }
}
