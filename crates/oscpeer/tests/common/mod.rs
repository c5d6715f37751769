//! Shared helpers for integration tests
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use oscpeer::OscMessage;
use parking_lot::Mutex;
use tokio::time::sleep;

/// Collects dispatched messages for later assertions
#[derive(Clone, Default)]
pub struct MessageCollector {
    messages: Arc<Mutex<Vec<OscMessage>>>,
}

impl MessageCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handler closure feeding this collector
    pub fn handler(&self) -> impl Fn(&OscMessage) + Send + Sync + 'static {
        let messages = self.messages.clone();
        move |message: &OscMessage| {
            messages.lock().push(message.clone());
        }
    }

    pub fn messages(&self) -> Vec<OscMessage> {
        self.messages.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.messages.lock().len()
    }

    /// Wait until at least `count` messages arrived or `timeout` passes
    pub async fn wait_for_count(&self, count: usize, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.count() >= count {
                return true;
            }
            sleep(Duration::from_millis(10)).await;
        }
        self.count() >= count
    }
}

/// Get a free UDP port on the loopback interface
pub fn free_udp_port() -> u16 {
    let socket = std::net::UdpSocket::bind("127.0.0.1:0").expect("bind probe socket");
    socket.local_addr().expect("probe local addr").port()
}

/// Get a free TCP port on the loopback interface
pub fn free_tcp_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind probe listener");
    listener.local_addr().expect("probe local addr").port()
}
