//! # Event Dispatcher
//!
//! Asynchronous fan-out of inbound messages to locally bound handlers.
//! `dispatch` never blocks: each message becomes a task that polls the
//! [`HandlerRegistry`] every `interval` until a handler turns up or the
//! dispatch window closes, then invokes the handler inside that task.
//! Messages whose handler never appears are logged and dropped.

use crate::config::{DispatchConfig, PoolMode};
use crate::error::{MeshError, Result};
use crate::events::registry::HandlerRegistry;
use crate::events::types::ClusterMessage;
use crate::logging::{log_dispatch_operation, log_error};
use futures::FutureExt;
use parking_lot::Mutex;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

/// Dispatcher statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Messages delivered to a handler
    pub dispatched: u64,
    /// Messages dropped because no handler appeared in time
    pub dropped: u64,
    /// Handler invocations that returned an error or panicked
    pub handler_failures: u64,
    /// Dispatch tasks currently running or queued
    pub in_flight: u64,
}

#[derive(Debug, Default)]
struct DispatchCounters {
    dispatched: AtomicU64,
    dropped: AtomicU64,
    handler_failures: AtomicU64,
    in_flight: AtomicU64,
}

/// Asynchronous event dispatcher backed by the Tokio runtime
pub struct EventDispatcher {
    registry: Arc<HandlerRegistry>,
    interval: Duration,
    timeout: Duration,
    runtime: Handle,
    /// Queue feeding the single worker when running in `PoolMode::Single`
    single_worker: Mutex<Option<mpsc::UnboundedSender<ClusterMessage>>>,
    closed: AtomicBool,
    counters: Arc<DispatchCounters>,
}

impl EventDispatcher {
    /// Create a dispatcher on the current Tokio runtime
    pub fn new(registry: Arc<HandlerRegistry>, config: &DispatchConfig) -> Result<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| MeshError::RuntimeUnavailable(e.to_string()))?;
        Ok(Self::with_runtime(registry, config, runtime))
    }

    /// Create a dispatcher spawning onto an explicit runtime
    pub fn with_runtime(registry: Arc<HandlerRegistry>, config: &DispatchConfig, runtime: Handle) -> Self {
        let interval = Duration::from_millis(config.interval_ms);
        let timeout = Duration::from_millis(config.timeout_ms);
        let counters = Arc::new(DispatchCounters::default());

        let single_worker = match config.pool {
            PoolMode::Single => {
                info!("Event dispatcher will use a single worker");
                let (tx, mut rx) = mpsc::unbounded_channel::<ClusterMessage>();
                let registry = registry.clone();
                let counters = counters.clone();
                runtime.spawn(async move {
                    while let Some(message) = rx.recv().await {
                        run_dispatch(&registry, interval, timeout, message, &counters).await;
                    }
                    debug!("Single dispatch worker stopped");
                });
                Some(tx)
            }
            PoolMode::Cached => {
                info!("Event dispatcher will use a task per event");
                None
            }
        };

        Self {
            registry,
            interval,
            timeout,
            runtime,
            single_worker: Mutex::new(single_worker),
            closed: AtomicBool::new(false),
            counters,
        }
    }

    /// Dispatch a message to its handler. Returns immediately.
    pub fn dispatch(&self, message: ClusterMessage) {
        if self.closed.load(Ordering::Acquire) {
            warn!(event_type = message.event_type(), "Dispatcher is shut down, dropping event");
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        self.counters.in_flight.fetch_add(1, Ordering::Relaxed);

        let worker = self.single_worker.lock().clone();
        match worker {
            Some(tx) => {
                if let Err(mpsc::error::SendError(message)) = tx.send(message) {
                    warn!(event_type = message.event_type(), "Dispatch worker gone, dropping event");
                    self.counters.in_flight.fetch_sub(1, Ordering::Relaxed);
                    self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => {
                let registry = self.registry.clone();
                let counters = self.counters.clone();
                let (interval, timeout) = (self.interval, self.timeout);
                self.runtime.spawn(async move {
                    run_dispatch(&registry, interval, timeout, message, &counters).await;
                });
            }
        }
    }

    /// Stop accepting new messages. Queued and running tasks finish.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.single_worker.lock().take();
        info!("Event dispatcher shut down");
    }

    pub fn registry(&self) -> &Arc<HandlerRegistry> {
        &self.registry
    }

    pub fn stats(&self) -> DispatchStats {
        DispatchStats {
            dispatched: self.counters.dispatched.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            handler_failures: self.counters.handler_failures.load(Ordering::Relaxed),
            in_flight: self.counters.in_flight.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("interval", &self.interval)
            .field("timeout", &self.timeout)
            .field("handlers", &self.registry.len())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Poll for a handler until found or the window closes, then invoke it
async fn run_dispatch(
    registry: &HandlerRegistry,
    interval: Duration,
    timeout: Duration,
    message: ClusterMessage,
    counters: &DispatchCounters,
) {
    let deadline = Instant::now() + timeout;

    let handler = loop {
        if let Some(handler) = registry.lookup(&message) {
            break Some(handler);
        }
        let now = Instant::now();
        if now >= deadline {
            break None;
        }
        sleep(interval.min(deadline - now)).await;
    };

    match handler {
        Some(handler) => {
            log_dispatch_operation("dispatch", message.id(), message.event_type(), Some(handler.name()), "handling");
            let event_type = message.event_type().to_string();
            let outcome = AssertUnwindSafe(handler.handle(message)).catch_unwind().await;
            match outcome {
                Ok(Ok(())) => {
                    counters.dispatched.fetch_add(1, Ordering::Relaxed);
                }
                Ok(Err(e)) => {
                    counters.dispatched.fetch_add(1, Ordering::Relaxed);
                    counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    log_error("event_dispatcher", "handle", &e.to_string(), Some(&event_type));
                }
                Err(_) => {
                    counters.handler_failures.fetch_add(1, Ordering::Relaxed);
                    log_error("event_dispatcher", "handle", "handler panicked", Some(&event_type));
                }
            }
        }
        None => {
            counters.dropped.fetch_add(1, Ordering::Relaxed);
            let err = MeshError::DispatchTimeout {
                event_type: message.event_type().to_string(),
            };
            warn!(event_id = message.id(), timeout_ms = timeout.as_millis() as u64, "{err}");
        }
    }

    counters.in_flight.fetch_sub(1, Ordering::Relaxed);
}
