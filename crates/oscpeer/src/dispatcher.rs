//! Incoming packet dispatch
//!
//! The dispatcher routes decoded OSC packets to registered handlers.
//! Handlers are keyed by address pattern (OSC wildcards supported), invoked
//! in registration order, and optionally guarded by a validator. Repeated
//! lookups of the same concrete address are served from a match cache that
//! is invalidated whenever the handler table changes.
//!
//! Bundles with an immediate or past timetag unpack in place; future-dated
//! bundles go to the background scheduler worker.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use oscpeer_core::{time, Pattern, Validator};
use parking_lot::Mutex;
use rosc::{OscBundle, OscMessage, OscPacket};
use tokio::time::Instant;
use tracing::{debug, error, trace};

use crate::error::Result;
use crate::scheduler::Scheduler;

/// A message handler
pub type Handler = Arc<dyn Fn(&OscMessage) + Send + Sync>;

struct HandlerEntry {
    pattern: Pattern,
    handler: Handler,
    validator: Option<Arc<dyn Validator>>,
}

/// Fallback invoked when no pattern matches an incoming address
struct FallbackHandler {
    handler: Handler,
    validator: Option<Arc<dyn Validator>>,
}

#[derive(Default)]
struct Registry {
    /// Registration order is invocation order
    entries: Vec<Arc<HandlerEntry>>,
    /// Concrete address -> matching entries. Cleared on every table change.
    cache: HashMap<String, Vec<Arc<HandlerEntry>>>,
}

/// Routes decoded OSC packets to handlers
pub struct Dispatcher {
    registry: Mutex<Registry>,
    fallback: Mutex<Option<Arc<FallbackHandler>>>,
    scheduler: Scheduler,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Dispatcher {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry::default()),
            fallback: Mutex::new(None),
            scheduler: Scheduler::new(),
        }
    }

    /// Register a handler for an address pattern
    ///
    /// Multiple handlers may share a pattern; they are invoked in
    /// registration order. Malformed patterns are rejected here.
    pub fn add_handler<F>(&self, pattern: &str, handler: F) -> Result<()>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.insert(pattern, Arc::new(handler), None)
    }

    /// Register a handler whose messages must pass a validator first
    pub fn add_handler_validated<F>(
        &self,
        pattern: &str,
        handler: F,
        validator: Arc<dyn Validator>,
    ) -> Result<()>
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        self.insert(pattern, Arc::new(handler), Some(validator))
    }

    fn insert(
        &self,
        pattern: &str,
        handler: Handler,
        validator: Option<Arc<dyn Validator>>,
    ) -> Result<()> {
        let pattern = normalize(pattern);
        let matcher = Pattern::compile(pattern)?;

        let mut registry = self.registry.lock();
        registry.entries.push(Arc::new(HandlerEntry {
            pattern: matcher,
            handler,
            validator,
        }));
        registry.cache.clear();
        Ok(())
    }

    /// Remove all handlers registered under exactly this pattern string
    ///
    /// Removing an absent pattern is a no-op.
    pub fn remove_handler(&self, pattern: &str) {
        let pattern = normalize(pattern);
        let mut registry = self.registry.lock();
        registry.entries.retain(|e| e.pattern.as_str() != pattern);
        registry.cache.clear();
    }

    /// Set the fallback handler, replacing any prior one
    ///
    /// The fallback runs only for messages no registered pattern matches.
    pub fn add_default_handler<F>(&self, handler: F)
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        *self.fallback.lock() = Some(Arc::new(FallbackHandler {
            handler: Arc::new(handler),
            validator: None,
        }));
    }

    /// Set a validated fallback handler, replacing any prior one
    pub fn add_default_handler_validated<F>(&self, handler: F, validator: Arc<dyn Validator>)
    where
        F: Fn(&OscMessage) + Send + Sync + 'static,
    {
        *self.fallback.lock() = Some(Arc::new(FallbackHandler {
            handler: Arc::new(handler),
            validator: Some(validator),
        }));
    }

    /// Remove the fallback handler
    pub fn clear_default_handler(&self) {
        *self.fallback.lock() = None;
    }

    /// Dispatch a decoded packet
    ///
    /// Messages route to their handlers synchronously on the calling task.
    /// Bundles unpack immediately or are handed to the scheduler, depending
    /// on their timetag.
    pub fn dispatch(self: &Arc<Self>, packet: &OscPacket) {
        match packet {
            OscPacket::Message(message) => self.dispatch_message(message),
            OscPacket::Bundle(bundle) => self.dispatch_bundle(bundle),
        }
    }

    fn dispatch_message(&self, message: &OscMessage) {
        let matched = self.lookup(&message.addr);

        if matched.is_empty() {
            let fallback = self.fallback.lock().clone();
            match fallback {
                Some(fallback) => run_handler(
                    "default",
                    &fallback.handler,
                    fallback.validator.as_ref(),
                    message,
                ),
                None => trace!("no handler for {}", message.addr),
            }
            return;
        }

        for entry in matched {
            run_handler(
                entry.pattern.as_str(),
                &entry.handler,
                entry.validator.as_ref(),
                message,
            );
        }
    }

    fn dispatch_bundle(self: &Arc<Self>, bundle: &OscBundle) {
        if time::is_immediate(bundle.timetag) {
            self.dispatch_elements(bundle);
            return;
        }

        let fire_at = crate::scheduler::instant_for_timetag(bundle.timetag);
        if fire_at <= Instant::now() {
            // past fire times run now rather than being dropped
            self.dispatch_elements(bundle);
        } else {
            self.scheduler.start(self);
            self.scheduler.schedule(fire_at, bundle.clone());
        }
    }

    /// Dispatch every element of a bundle, in order
    pub(crate) fn dispatch_elements(self: &Arc<Self>, bundle: &OscBundle) {
        for element in &bundle.content {
            self.dispatch(element);
        }
    }

    fn lookup(&self, addr: &str) -> Vec<Arc<HandlerEntry>> {
        let mut registry = self.registry.lock();

        if let Some(cached) = registry.cache.get(addr) {
            return cached.clone();
        }

        let matched: Vec<Arc<HandlerEntry>> = registry
            .entries
            .iter()
            .filter(|e| e.pattern.matches(addr))
            .cloned()
            .collect();

        registry.cache.insert(addr.to_string(), matched.clone());
        matched
    }

    /// Start the bundle scheduler worker. Idempotent.
    pub fn start_scheduler(self: &Arc<Self>) {
        self.scheduler.start(self);
    }

    /// Stop the bundle scheduler, discarding queued bundles. Idempotent.
    pub async fn stop_scheduler(&self) {
        self.scheduler.stop().await;
    }
}

/// Validate and invoke one handler; a panicking handler must not take down
/// the dispatch of its siblings or of later messages.
fn run_handler(
    label: &str,
    handler: &Handler,
    validator: Option<&Arc<dyn Validator>>,
    message: &OscMessage,
) {
    if let Some(validator) = validator {
        if let Err(e) = validator.validate(message) {
            debug!("handler {} skipped for {}: {}", label, message.addr, e);
            return;
        }
    }

    if catch_unwind(AssertUnwindSafe(|| handler(message))).is_err() {
        error!("handler {} panicked on {}", label, message.addr);
    }
}

/// Strip a trailing slash from non-root patterns before registration
fn normalize(pattern: &str) -> &str {
    if pattern.len() > 1 {
        pattern.strip_suffix('/').unwrap_or(pattern)
    } else {
        pattern
    }
}
