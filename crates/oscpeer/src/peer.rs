//! The OSC peer
//!
//! A peer is a symmetric endpoint bound to one remote address: it sends OSC
//! packets to the remote and dispatches packets received from it. UDP peers
//! exchange datagrams between two bound sockets with strict source-address
//! filtering; TCP peers share one framed stream connection, established by
//! whichever side sends first (the other side accepts).

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use oscpeer_core::Framing;
use oscpeer_transport::tcp::{TcpReceiver, TcpServer, TcpTransport};
use oscpeer_transport::udp::UdpTransport;
use oscpeer_transport::{TcpConfig, TransportEvent, TransportReceiver, TransportSender};
use parking_lot::{Mutex, RwLock};
use rosc::{OscMessage, OscPacket};
use tokio::sync::{mpsc, watch, OnceCell};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::{PeerError, Result};
use crate::PeerBuilder;

/// Buffer size for the incoming transport event channel
const EVENT_BUFFER: usize = 1000;

/// Transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Connectionless datagrams; requires a local bind address
    Udp,
    /// One long-lived framed stream connection
    Tcp,
}

/// Peer configuration
///
/// Usually produced by [`PeerBuilder`].
#[derive(Debug, Clone)]
pub struct PeerConfig {
    /// Remote endpoint address
    pub remote_addr: IpAddr,
    /// Remote endpoint port
    pub remote_port: u16,
    /// Transport mode
    pub mode: Mode,
    /// Packet framing version (affects TCP streams only)
    pub framing: Framing,
    /// Local receive address; required for UDP, optional accept side for TCP
    pub bind_addr: Option<IpAddr>,
    /// Local receive port
    pub bind_port: Option<u16>,
    /// Maximum framed message size on TCP streams
    pub max_frame_size: usize,
    /// TCP keep-alive interval in seconds (0 = disabled)
    pub keepalive_secs: u64,
}

/// Connection lifecycle notifications
#[derive(Debug, Clone)]
pub enum PeerEvent {
    /// A transport link to the remote came up
    Connected,
    /// The transport link went down (or the peer stopped listening)
    Disconnected { reason: Option<String> },
    /// A transport-level failure occurred
    Error(String),
}

type EventCallback = Arc<dyn Fn(&PeerEvent) + Send + Sync>;

type Link = Arc<dyn TransportSender>;

struct EventChannel {
    tx: mpsc::Sender<TransportEvent>,
    rx: Option<mpsc::Receiver<TransportEvent>>,
}

/// A symmetric OSC endpoint
pub struct Peer {
    config: PeerConfig,
    dispatcher: Arc<Dispatcher>,
    udp: OnceCell<Arc<UdpTransport>>,
    link: Arc<RwLock<Option<Link>>>,
    connect_lock: tokio::sync::Mutex<()>,
    events: Mutex<EventChannel>,
    stop_tx: watch::Sender<bool>,
    listening: AtomicBool,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
    last_error: Arc<RwLock<Option<String>>>,
}

impl Peer {
    /// Create a peer from a configuration
    ///
    /// Validates arguments only; sockets are created lazily, so bind and
    /// connect failures surface from [`send`](Peer::send) and
    /// [`start_listening`](Peer::start_listening).
    pub fn new(config: PeerConfig) -> Result<Self> {
        if config.mode == Mode::Udp && (config.bind_addr.is_none() || config.bind_port.is_none()) {
            return Err(PeerError::Config(
                "UDP peers require a local bind address and port".to_string(),
            ));
        }

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (stop_tx, _) = watch::channel(false);

        Ok(Self {
            config,
            dispatcher: Arc::new(Dispatcher::new()),
            udp: OnceCell::new(),
            link: Arc::new(RwLock::new(None)),
            connect_lock: tokio::sync::Mutex::new(()),
            events: Mutex::new(EventChannel {
                tx: event_tx,
                rx: Some(event_rx),
            }),
            stop_tx,
            listening: AtomicBool::new(false),
            tasks: Arc::new(Mutex::new(Vec::new())),
            callbacks: Arc::new(RwLock::new(Vec::new())),
            last_error: Arc::new(RwLock::new(None)),
        })
    }

    /// Create a builder
    pub fn builder(remote_addr: &str, remote_port: u16) -> PeerBuilder {
        PeerBuilder::new(remote_addr, remote_port)
    }

    /// The dispatcher routing this peer's incoming packets
    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    /// Register a connection event observer
    ///
    /// Callbacks run on the peer's internal tasks and must not block.
    pub fn on_event<F>(&self, callback: F)
    where
        F: Fn(&PeerEvent) + Send + Sync + 'static,
    {
        self.callbacks.write().push(Arc::new(callback));
    }

    /// The most recent transport error, if any
    pub fn last_error(&self) -> Option<String> {
        self.last_error.read().clone()
    }

    /// Whether a transport link to the remote is currently up
    pub fn is_connected(&self) -> bool {
        self.link
            .read()
            .as_ref()
            .map(|link| link.is_connected())
            .unwrap_or(false)
    }

    /// Send an OSC message to the remote peer
    ///
    /// Safe before `start_listening` and concurrently with receive. On TCP
    /// the first send opens the connection; a failed send marks the link
    /// broken and the next send reconnects.
    pub async fn send(&self, message: &OscMessage) -> Result<()> {
        self.send_packet(&OscPacket::Message(message.clone())).await
    }

    /// Send a full OSC packet (message or bundle) to the remote peer
    pub async fn send_packet(&self, packet: &OscPacket) -> Result<()> {
        let data = rosc::encoder::encode(packet)
            .map_err(|e| oscpeer_core::Error::EncodeError(format!("{:?}", e)))
            .map_err(PeerError::from)?;

        let link = self.ensure_link().await?;
        if let Err(e) = link.send(Bytes::from(data)).await {
            link.close();
            *self.link.write() = None;
            record_error(&self.last_error, &self.callbacks, e.to_string());
            return Err(e.into());
        }
        Ok(())
    }

    /// Start receiving from the remote peer. Idempotent.
    ///
    /// Also starts the dispatcher's bundle scheduler.
    pub async fn start_listening(&self) -> Result<()> {
        if self.listening.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.stop_tx.send_replace(false);
        self.dispatcher.start_scheduler();

        let started = match self.config.mode {
            Mode::Udp => self.start_udp_listener().await,
            Mode::Tcp => self.start_tcp_listener().await,
        };

        if let Err(e) = started {
            self.listening.store(false, Ordering::SeqCst);
            self.dispatcher.stop_scheduler().await;
            return Err(e);
        }

        info!(
            "peer listening ({} remote {}:{})",
            match self.config.mode {
                Mode::Udp => "udp",
                Mode::Tcp => "tcp",
            },
            self.config.remote_addr,
            self.config.remote_port
        );
        Ok(())
    }

    /// Stop receiving and release the transport. Idempotent.
    ///
    /// Joins all background tasks and stops the bundle scheduler; after this
    /// returns no handler is invoked. Must not be called from inside a
    /// handler: the receive task cannot join itself.
    pub async fn stop_listening(&self) {
        if !self.listening.swap(false, Ordering::SeqCst) {
            return;
        }

        self.stop_tx.send_replace(true);
        if let Some(link) = self.link.write().take() {
            link.close();
        }

        let handles: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for handle in handles {
            let _ = handle.await;
        }

        self.dispatcher.stop_scheduler().await;
        emit(&self.callbacks, &PeerEvent::Disconnected { reason: None });
        info!("peer stopped listening");
    }

    fn remote_sockaddr(&self) -> SocketAddr {
        SocketAddr::new(self.config.remote_addr, self.config.remote_port)
    }

    fn tcp_config(&self) -> TcpConfig {
        TcpConfig {
            framing: self.config.framing,
            max_frame_size: self.config.max_frame_size,
            keepalive_secs: self.config.keepalive_secs,
            ..TcpConfig::default()
        }
    }

    async fn ensure_udp(&self) -> Result<Arc<UdpTransport>> {
        let transport = self
            .udp
            .get_or_try_init(|| async {
                let bind = match (self.config.bind_addr, self.config.bind_port) {
                    (Some(addr), Some(port)) => SocketAddr::new(addr, port),
                    _ => {
                        return Err(PeerError::Config(
                            "UDP peers require a local bind address and port".to_string(),
                        ))
                    }
                };
                let transport = UdpTransport::bind(bind).await?;
                Ok(Arc::new(transport))
            })
            .await?;
        Ok(transport.clone())
    }

    /// Get the current transport link, establishing one if needed
    async fn ensure_link(&self) -> Result<Link> {
        if let Some(link) = self.current_link() {
            return Ok(link);
        }

        let _guard = self.connect_lock.lock().await;
        // another sender may have connected while we waited
        if let Some(link) = self.current_link() {
            return Ok(link);
        }

        let link: Link = match self.config.mode {
            Mode::Udp => {
                let udp = self.ensure_udp().await?;
                Arc::new(udp.sender_to(self.remote_sockaddr()))
            }
            Mode::Tcp => {
                let transport = TcpTransport::with_config(self.tcp_config());
                let (sender, receiver) = transport.connect(self.remote_sockaddr()).await?;
                self.spawn_forwarder(receiver);
                emit(&self.callbacks, &PeerEvent::Connected);
                Arc::new(sender)
            }
        };

        // the accept loop may have adopted an inbound connection while we
        // were dialing; that link wins and ours is closed
        let existing = {
            let mut slot = self.link.write();
            match slot.as_ref().filter(|l| l.is_connected()).cloned() {
                Some(existing) => Some(existing),
                None => {
                    *slot = Some(link.clone());
                    None
                }
            }
        };
        if let Some(existing) = existing {
            debug!("inbound connection adopted while dialing, dropping outbound link");
            link.close();
            return Ok(existing);
        }
        Ok(link)
    }

    fn current_link(&self) -> Option<Link> {
        self.link
            .read()
            .as_ref()
            .filter(|link| link.is_connected())
            .cloned()
    }

    /// Forward a TCP connection's events into the peer's event channel
    fn spawn_forwarder(&self, receiver: TcpReceiver) {
        let events_tx = self.events.lock().tx.clone();
        let stop_rx = self.stop_tx.subscribe();
        let handle = tokio::spawn(forward_events(receiver, events_tx, stop_rx));
        self.tasks.lock().push(handle);
    }

    async fn start_udp_listener(&self) -> Result<()> {
        let udp = self.ensure_udp().await?;
        let receiver = udp.receiver();

        let handle = tokio::spawn(run_udp_receive_loop(
            receiver,
            self.remote_sockaddr(),
            self.dispatcher.clone(),
            self.callbacks.clone(),
            self.last_error.clone(),
            self.stop_tx.subscribe(),
        ));
        self.tasks.lock().push(handle);
        Ok(())
    }

    async fn start_tcp_listener(&self) -> Result<()> {
        // the event channel is consumed by the pump; recreate it when
        // restarting after a stop
        let event_rx = {
            let mut events = self.events.lock();
            match events.rx.take() {
                Some(rx) => rx,
                None => {
                    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
                    events.tx = tx;
                    rx
                }
            }
        };

        let pump = tokio::spawn(run_event_pump(
            event_rx,
            self.dispatcher.clone(),
            self.link.clone(),
            self.callbacks.clone(),
            self.last_error.clone(),
            self.stop_tx.subscribe(),
        ));
        self.tasks.lock().push(pump);

        if let (Some(addr), Some(port)) = (self.config.bind_addr, self.config.bind_port) {
            let server = TcpServer::bind(SocketAddr::new(addr, port), self.tcp_config()).await?;
            let accept = tokio::spawn(run_accept_loop(
                server,
                self.link.clone(),
                self.events.lock().tx.clone(),
                self.tasks.clone(),
                self.callbacks.clone(),
                self.stop_tx.subscribe(),
            ));
            self.tasks.lock().push(accept);
        }

        Ok(())
    }
}

/// Receive datagrams, filter by source, decode, dispatch
///
/// This models a peer-to-peer link, not a general listener: datagrams whose
/// source is not the configured remote endpoint are dropped.
async fn run_udp_receive_loop(
    mut receiver: oscpeer_transport::udp::UdpReceiver,
    remote: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
    last_error: Arc<RwLock<Option<String>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // a dropped peer counts as shutdown too
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            received = receiver.recv_from() => {
                match received {
                    Ok((data, from)) => {
                        if from != remote {
                            debug!("dropping datagram from unexpected source {}", from);
                            continue;
                        }
                        decode_and_dispatch(&dispatcher, &data);
                    }
                    Err(e) => {
                        error!("udp receive failed: {}", e);
                        record_error(&last_error, &callbacks, e.to_string());
                        break;
                    }
                }
            }
        }
    }
}

/// Drain transport events from TCP connections: decode data frames, track
/// link state
async fn run_event_pump(
    mut event_rx: mpsc::Receiver<TransportEvent>,
    dispatcher: Arc<Dispatcher>,
    link: Arc<RwLock<Option<Link>>>,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
    last_error: Arc<RwLock<Option<String>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // a dropped peer counts as shutdown too
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            event = event_rx.recv() => {
                match event {
                    Some(TransportEvent::Data(data)) => decode_and_dispatch(&dispatcher, &data),
                    Some(TransportEvent::Disconnected { reason }) => {
                        debug!("link closed: {:?}", reason);
                        *link.write() = None;
                        emit(&callbacks, &PeerEvent::Disconnected { reason });
                    }
                    Some(TransportEvent::Error(e)) => {
                        *link.write() = None;
                        record_error(&last_error, &callbacks, e);
                    }
                    None => break,
                }
            }
        }
    }
}

/// Accept inbound connections; the first connection wins, later ones are
/// dropped while a link is up
async fn run_accept_loop(
    mut server: TcpServer,
    link: Arc<RwLock<Option<Link>>>,
    events_tx: mpsc::Sender<TransportEvent>,
    tasks: Arc<Mutex<Vec<JoinHandle<()>>>>,
    callbacks: Arc<RwLock<Vec<EventCallback>>>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // a dropped peer counts as shutdown too
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            accepted = server.accept() => {
                match accepted {
                    Ok((sender, receiver, from)) => {
                        {
                            let mut slot = link.write();
                            if slot.as_ref().map(|l| l.is_connected()).unwrap_or(false) {
                                debug!("link already up, dropping inbound connection from {}", from);
                                continue;
                            }
                            *slot = Some(Arc::new(sender));
                        }
                        let handle = tokio::spawn(forward_events(
                            receiver,
                            events_tx.clone(),
                            stop_rx.clone(),
                        ));
                        tasks.lock().push(handle);
                        emit(&callbacks, &PeerEvent::Connected);
                    }
                    Err(e) => {
                        warn!("accept failed: {}", e);
                    }
                }
            }
        }
    }
}

/// Copy one connection's events into the peer's shared event channel
async fn forward_events(
    mut receiver: TcpReceiver,
    events_tx: mpsc::Sender<TransportEvent>,
    mut stop_rx: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            changed = stop_rx.changed() => {
                // a dropped peer counts as shutdown too
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
            event = receiver.recv() => {
                match event {
                    Some(event) => {
                        let closing = matches!(event, TransportEvent::Disconnected { .. });
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                        if closing {
                            break;
                        }
                    }
                    None => break,
                }
            }
        }
    }
}

fn decode_and_dispatch(dispatcher: &Arc<Dispatcher>, data: &[u8]) {
    match rosc::decoder::decode_udp(data) {
        Ok((_, packet)) => dispatcher.dispatch(&packet),
        Err(e) => warn!("discarding undecodable packet: {:?}", e),
    }
}

fn emit(callbacks: &RwLock<Vec<EventCallback>>, event: &PeerEvent) {
    // never run observer code under the lock
    let callbacks: Vec<EventCallback> = callbacks.read().clone();
    for callback in callbacks {
        callback(event);
    }
}

fn record_error(
    last_error: &RwLock<Option<String>>,
    callbacks: &RwLock<Vec<EventCallback>>,
    message: String,
) {
    *last_error.write() = Some(message.clone());
    emit(callbacks, &PeerEvent::Error(message));
}
