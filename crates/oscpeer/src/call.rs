//! Request/response calls
//!
//! OSC has no native request/response pairing; a call sends a message and
//! waits for the reply the remote peer is expected to address to an agreed
//! return address. The call handler keeps a registry of pending calls keyed
//! by return address and doubles as a dispatcher handler: installed as the
//! default handler (or on a specific return pattern), it feeds incoming
//! messages back to the matching waiter.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use oscpeer_core::{ValidationError, Validator};
use rosc::OscMessage;
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::{PeerError, Result};
use crate::{Dispatcher, Peer};

/// What to do when a call is issued on a return address that already has a
/// pending call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CallPolicy {
    /// The new call supersedes the old one; the old caller fails with
    /// [`PeerError::CallSuperseded`].
    #[default]
    Replace,
    /// Calls queue up; replies satisfy them first-in first-out.
    Queue,
}

enum Outcome {
    Reply(OscMessage),
    Rejected(ValidationError),
    Superseded,
}

struct PendingCall {
    token: u64,
    tx: oneshot::Sender<Outcome>,
    validator: Option<Arc<dyn Validator>>,
}

type PendingMap = DashMap<String, VecDeque<PendingCall>>;

/// Synchronous request/response layer over a peer
pub struct CallHandler {
    peer: Arc<Peer>,
    pending: Arc<PendingMap>,
    policy: CallPolicy,
    next_token: AtomicU64,
}

impl CallHandler {
    pub fn new(peer: Arc<Peer>) -> Self {
        Self::with_policy(peer, CallPolicy::default())
    }

    pub fn with_policy(peer: Arc<Peer>, policy: CallPolicy) -> Self {
        Self {
            peer,
            pending: Arc::new(DashMap::new()),
            policy,
            next_token: AtomicU64::new(0),
        }
    }

    /// Register this call handler as the peer dispatcher's default handler
    pub fn install(&self, dispatcher: &Dispatcher) {
        dispatcher.add_default_handler(self.handler());
    }

    /// Register this call handler on a specific return address pattern
    pub fn install_at(&self, dispatcher: &Dispatcher, pattern: &str) -> Result<()> {
        dispatcher.add_handler(pattern, self.handler())
    }

    /// Send `message` and wait up to `timeout` for a reply on `return_addr`
    /// (the message's own address when `None`).
    ///
    /// Returns `Ok(Some(reply))` on success and `Ok(None)` when the call
    /// times out; a reply that fails the validator, or a supersession by a
    /// newer call, is an error.
    pub async fn call(
        &self,
        message: &OscMessage,
        return_addr: Option<&str>,
        timeout: Duration,
        validator: Option<Arc<dyn Validator>>,
    ) -> Result<Option<OscMessage>> {
        let return_addr = return_addr.unwrap_or(&message.addr).to_string();
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = oneshot::channel();

        {
            let mut queue = self.pending.entry(return_addr.clone()).or_default();
            if self.policy == CallPolicy::Replace {
                for old in queue.drain(..) {
                    let _ = old.tx.send(Outcome::Superseded);
                }
            }
            queue.push_back(PendingCall {
                token,
                tx,
                validator,
            });
        }

        if let Err(e) = self.peer.send(message).await {
            self.forget(&return_addr, token);
            return Err(e);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(Outcome::Reply(reply))) => Ok(Some(reply)),
            Ok(Ok(Outcome::Rejected(e))) => Err(PeerError::CallRejected(e.to_string())),
            Ok(Ok(Outcome::Superseded)) => Err(PeerError::CallSuperseded),
            // registry dropped underneath us; same as no reply
            Ok(Err(_)) => Ok(None),
            Err(_) => {
                debug!("call on {} timed out", return_addr);
                self.forget(&return_addr, token);
                Ok(None)
            }
        }
    }

    /// Build the dispatcher handler feeding replies to waiting callers
    pub fn handler(&self) -> impl Fn(&OscMessage) + Send + Sync + 'static {
        let pending = self.pending.clone();
        move |message: &OscMessage| {
            let entry = {
                let Some(mut queue) = pending.get_mut(&message.addr) else {
                    debug!("no pending call for {}, dropping", message.addr);
                    return;
                };
                queue.pop_front()
            };
            let Some(entry) = entry else {
                return;
            };
            pending.remove_if(&message.addr, |_, queue| queue.is_empty());

            if let Some(validator) = &entry.validator {
                if let Err(e) = validator.validate(message) {
                    warn!("reply on {} failed validation: {}", message.addr, e);
                    let _ = entry.tx.send(Outcome::Rejected(e));
                    return;
                }
            }

            let _ = entry.tx.send(Outcome::Reply(message.clone()));
        }
    }

    /// Drop one pending call by token, e.g. after its deadline passed
    fn forget(&self, return_addr: &str, token: u64) {
        if let Some(mut queue) = self.pending.get_mut(return_addr) {
            queue.retain(|p| p.token != token);
        }
        self.pending.remove_if(return_addr, |_, queue| queue.is_empty());
    }
}
