//! TCP transport implementation
//!
//! Stream transport for OSC peers. Packet boundaries are recovered with the
//! configured framing: SLIP for OSC 1.0, a 4-byte big-endian length prefix
//! for OSC 1.1. The peer is symmetric, so both an outbound connect and a
//! single-connection accept side are provided; whichever connection comes up
//! first carries the traffic.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use oscpeer_core::Framing;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::error::{Result, TransportError};
use crate::traits::{TransportEvent, TransportReceiver, TransportSender};

/// Default channel buffer size for TCP connections
const DEFAULT_CHANNEL_BUFFER_SIZE: usize = 1000;

/// TCP configuration
#[derive(Debug, Clone)]
pub struct TcpConfig {
    /// Stream framing version
    pub framing: Framing,
    /// Maximum framed message size in bytes
    pub max_frame_size: usize,
    /// Read buffer size
    pub read_buffer_size: usize,
    /// Keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            framing: Framing::default(),
            max_frame_size: oscpeer_core::MAX_FRAME_SIZE,
            read_buffer_size: 8192,
            keepalive_secs: 30,
        }
    }
}

/// TCP transport (outbound connections)
pub struct TcpTransport {
    config: TcpConfig,
}

impl TcpTransport {
    pub fn new(framing: Framing) -> Self {
        Self {
            config: TcpConfig {
                framing,
                ..TcpConfig::default()
            },
        }
    }

    pub fn with_config(config: TcpConfig) -> Self {
        Self { config }
    }

    /// Connect to the remote endpoint
    pub async fn connect(&self, addr: SocketAddr) -> Result<(TcpSender, TcpReceiver)> {
        debug!("connecting to tcp {}", addr);

        let stream = TcpStream::connect(addr)
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        info!("tcp connected to {}", addr);
        Ok(spawn_connection(stream, &self.config))
    }
}

/// Configure socket options and spawn the framed IO loop for a stream
fn spawn_connection(stream: TcpStream, config: &TcpConfig) -> (TcpSender, TcpReceiver) {
    let _ = stream.set_nodelay(true);
    if config.keepalive_secs > 0 {
        let sock = socket2::SockRef::from(&stream);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(std::time::Duration::from_secs(config.keepalive_secs));
        let _ = sock.set_tcp_keepalive(&keepalive);
    }

    let connected = Arc::new(AtomicBool::new(true));
    let (outgoing_tx, outgoing_rx) = mpsc::channel::<Bytes>(DEFAULT_CHANNEL_BUFFER_SIZE);
    let (incoming_tx, incoming_rx) = mpsc::channel::<TransportEvent>(DEFAULT_CHANNEL_BUFFER_SIZE);

    let sender = TcpSender {
        tx: outgoing_tx,
        connected: connected.clone(),
    };
    let receiver = TcpReceiver { rx: incoming_rx };

    let framing = config.framing;
    let max_frame = config.max_frame_size;
    let read_capacity = config.read_buffer_size;

    tokio::spawn(async move {
        let (reader, writer) = stream.into_split();
        run_tcp_io_loop(
            reader,
            writer,
            framing,
            max_frame,
            read_capacity,
            outgoing_rx,
            incoming_tx,
            connected,
        )
        .await;
    });

    (sender, receiver)
}

/// Shared IO loop for TCP connections
#[allow(clippy::too_many_arguments)]
async fn run_tcp_io_loop(
    mut reader: OwnedReadHalf,
    mut writer: OwnedWriteHalf,
    framing: Framing,
    max_frame: usize,
    read_capacity: usize,
    mut outgoing_rx: mpsc::Receiver<Bytes>,
    incoming_tx: mpsc::Sender<TransportEvent>,
    connected: Arc<AtomicBool>,
) {
    let mut decoder = framing.decoder(max_frame);
    let mut read_buf = vec![0u8; read_capacity];

    loop {
        tokio::select! {
            outgoing = outgoing_rx.recv() => {
                let Some(payload) = outgoing else {
                    // sender dropped; close the connection
                    break;
                };
                let frame = framing.encode_frame(&payload);
                if let Err(e) = writer.write_all(&frame).await {
                    error!("tcp write error: {}", e);
                    let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                    break;
                }
            }

            result = reader.read(&mut read_buf) => {
                match result {
                    Ok(0) => {
                        debug!("tcp connection closed by remote");
                        let _ = incoming_tx.send(TransportEvent::Disconnected { reason: None }).await;
                        break;
                    }
                    Ok(n) => {
                        decoder.extend(&read_buf[..n]);
                        let mut failed = false;
                        loop {
                            match decoder.next_frame() {
                                Ok(Some(payload)) => {
                                    if incoming_tx.send(TransportEvent::Data(payload)).await.is_err() {
                                        failed = true;
                                        break;
                                    }
                                }
                                Ok(None) => break,
                                Err(e) => {
                                    error!("tcp framing error: {}", e);
                                    let _ = incoming_tx.send(TransportEvent::Disconnected {
                                        reason: Some(e.to_string()),
                                    }).await;
                                    failed = true;
                                    break;
                                }
                            }
                        }
                        if failed {
                            break;
                        }
                    }
                    Err(e) => {
                        error!("tcp read error: {}", e);
                        let _ = incoming_tx.send(TransportEvent::Error(e.to_string())).await;
                        break;
                    }
                }
            }
        }
    }

    connected.store(false, Ordering::SeqCst);
    let _ = writer.shutdown().await;
}

/// TCP sender for writing packet payloads
pub struct TcpSender {
    tx: mpsc::Sender<Bytes>,
    connected: Arc<AtomicBool>,
}

#[async_trait]
impl TransportSender for TcpSender {
    async fn send(&self, data: Bytes) -> Result<()> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(TransportError::NotConnected);
        }

        self.tx
            .send(data)
            .await
            .map_err(|_| TransportError::ConnectionClosed)
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }
}

/// TCP receiver for reading transport events
pub struct TcpReceiver {
    rx: mpsc::Receiver<TransportEvent>,
}

#[async_trait]
impl TransportReceiver for TcpReceiver {
    async fn recv(&mut self) -> Option<TransportEvent> {
        self.rx.recv().await
    }
}

/// Accept side: listens for a single inbound peer connection
pub struct TcpServer {
    listener: TcpListener,
    config: TcpConfig,
}

impl TcpServer {
    /// Bind to an address
    pub async fn bind(addr: SocketAddr, config: TcpConfig) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| TransportError::BindFailed(e.to_string()))?;

        info!("tcp listening on {}", addr);
        Ok(Self { listener, config })
    }

    /// Accept the next inbound connection
    pub async fn accept(&mut self) -> Result<(TcpSender, TcpReceiver, SocketAddr)> {
        let (stream, peer_addr) = self
            .listener
            .accept()
            .await
            .map_err(|e| TransportError::AcceptFailed(e.to_string()))?;

        info!("tcp connection accepted from {}", peer_addr);
        let (sender, receiver) = spawn_connection(stream, &self.config);
        Ok((sender, receiver, peer_addr))
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(TransportError::Io)
    }
}
