//! Connection supervisor
//!
//! Owns the single link to the backend MCP server and everything about its
//! lifecycle: guarded initialization, the periodic health probe, and bounded
//! reconnection with a fixed delay. Readers (the forwarder, HTTP handlers)
//! get cheap snapshots; only the supervisor mutates connection state.

use crate::config::SupervisorConfig;
use crate::core::protocol::JsonRpcRequest;
use crate::core::scheduler::ScheduledTask;
use crate::core::state::{ConnectionState, ConnectionStatus, SupervisorEvent};
use crate::transport::{Link, LinkFactory};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};
use url::Url;

/// A live link tagged with the connection generation that produced it
#[derive(Clone)]
pub struct LinkHandle {
    pub generation: u64,
    pub link: Arc<dyn Link>,
}

impl std::fmt::Debug for LinkHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkHandle")
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

struct SupervisorInner {
    endpoint: Url,
    factory: Arc<dyn LinkFactory>,
    config: SupervisorConfig,
    state: RwLock<ConnectionState>,
    link: RwLock<Option<LinkHandle>>,
    initializing: AtomicBool,
    reconnect_attempts: AtomicU32,
    generation: AtomicU64,
    health_timer: Mutex<Option<ScheduledTask>>,
    retry_timer: Mutex<Option<ScheduledTask>>,
    events: broadcast::Sender<SupervisorEvent>,
}

impl SupervisorInner {
    fn emit(&self, event: SupervisorEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }
}

/// Clears the in-progress flag on every exit from an initialize attempt,
/// including when the attempt's future is dropped mid-flight.
struct InitializingGuard<'a> {
    inner: &'a SupervisorInner,
}

impl Drop for InitializingGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = self.inner.state.write();
            if *state == ConnectionState::Connecting {
                *state = ConnectionState::Disconnected;
            }
        }
        self.inner.initializing.store(false, Ordering::SeqCst);
    }
}

/// Supervises the one backend link. Cloning yields another handle to the
/// same supervisor.
#[derive(Clone)]
pub struct ConnectionSupervisor {
    inner: Arc<SupervisorInner>,
}

impl ConnectionSupervisor {
    pub fn new(endpoint: Url, factory: Arc<dyn LinkFactory>, config: SupervisorConfig) -> Self {
        let (events, _) = broadcast::channel(64);

        Self {
            inner: Arc::new(SupervisorInner {
                endpoint,
                factory,
                config,
                state: RwLock::new(ConnectionState::Disconnected),
                link: RwLock::new(None),
                initializing: AtomicBool::new(false),
                reconnect_attempts: AtomicU32::new(0),
                generation: AtomicU64::new(0),
                health_timer: Mutex::new(None),
                retry_timer: Mutex::new(None),
                events,
            }),
        }
    }

    fn from_inner(inner: Arc<SupervisorInner>) -> Self {
        Self { inner }
    }

    pub fn endpoint(&self) -> &Url {
        &self.inner.endpoint
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.inner.config
    }

    /// Establish the link unless it is already up or being brought up.
    ///
    /// Returns `false` immediately if another attempt is in flight. On
    /// failure a retry is scheduled while attempts remain; once they are
    /// exhausted the failure is only logged and published as
    /// [`SupervisorEvent::ReconnectExhausted`].
    pub async fn initialize(&self) -> bool {
        let inner = &*self.inner;

        if inner.initializing.load(Ordering::SeqCst) {
            debug!("Initialization already in progress");
            return false;
        }
        if self.state() == ConnectionState::Connected {
            return true;
        }
        if inner
            .initializing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Initialization already in progress");
            return false;
        }
        let _guard = InitializingGuard { inner };

        // Another attempt may have finished between the checks above
        if self.state() == ConnectionState::Connected {
            return true;
        }

        self.connect().await
    }

    async fn connect(&self) -> bool {
        let inner = &*self.inner;
        *inner.state.write() = ConnectionState::Connecting;

        self.cancel_retry();
        self.stop_health_timer();
        self.close_stale_link().await;

        info!(
            endpoint = %inner.endpoint,
            attempt = inner.reconnect_attempts.load(Ordering::SeqCst),
            "Connecting to MCP server"
        );

        match inner.factory.open(&inner.endpoint).await {
            Ok(link) => {
                let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
                *inner.link.write() = Some(LinkHandle { generation, link });
                inner.reconnect_attempts.store(0, Ordering::SeqCst);
                *inner.state.write() = ConnectionState::Connected;
                self.start_health_timer();

                info!(generation, "Connected to MCP server at {}", inner.endpoint);
                inner.emit(SupervisorEvent::Connected { generation });
                true
            }
            Err(e) => {
                *inner.state.write() = ConnectionState::Disconnected;
                warn!("Failed to connect to MCP server at {}: {}", inner.endpoint, e);
                inner.emit(SupervisorEvent::Disconnected {
                    reason: e.to_string(),
                });
                self.schedule_retry();
                false
            }
        }
    }

    async fn close_stale_link(&self) {
        let stale = self.inner.link.write().take();
        if let Some(handle) = stale {
            debug!(generation = handle.generation, "Closing previous link");
            if let Err(e) = handle.link.close().await {
                warn!("Error closing previous link: {}", e);
            }
        }
    }

    fn schedule_retry(&self) {
        let inner = &*self.inner;
        let attempts = inner.reconnect_attempts.load(Ordering::SeqCst);
        let max = inner.config.max_reconnect_attempts;

        if attempts >= max {
            error!(
                attempts,
                "Max reconnection attempts reached, automatic reconnection stopped"
            );
            inner.emit(SupervisorEvent::ReconnectExhausted { attempts });
            return;
        }

        let delay = inner.config.reconnect_delay();
        info!(
            attempt = attempts + 1,
            max_attempts = max,
            "Reconnecting in {}ms",
            delay.as_millis()
        );
        inner.emit(SupervisorEvent::RetryScheduled {
            attempt: attempts + 1,
            delay,
        });

        let weak = Arc::downgrade(&self.inner);
        let task = ScheduledTask::after(delay, async move {
            if let Some(inner) = weak.upgrade() {
                inner.reconnect_attempts.fetch_add(1, Ordering::SeqCst);
                ConnectionSupervisor::from_inner(inner).initialize().await;
            }
        });

        if let Some(previous) = inner.retry_timer.lock().replace(task) {
            previous.cancel();
        }
    }

    fn cancel_retry(&self) {
        if let Some(task) = self.inner.retry_timer.lock().take() {
            task.cancel();
        }
    }

    fn start_health_timer(&self) {
        let period = self.inner.config.health_check_interval();
        let weak: Weak<SupervisorInner> = Arc::downgrade(&self.inner);

        let task = ScheduledTask::every(period, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => ConnectionSupervisor::from_inner(inner).health_check().await,
                    None => false,
                }
            }
        });

        if let Some(previous) = self.inner.health_timer.lock().replace(task) {
            previous.cancel();
        }
    }

    fn stop_health_timer(&self) {
        if let Some(task) = self.inner.health_timer.lock().take() {
            task.cancel();
        }
    }

    /// Probe the link once. Driven by the health timer; returns whether the
    /// timer that called it should keep running.
    pub async fn health_check(&self) -> bool {
        let inner = &*self.inner;

        let Some(handle) = self.current_link() else {
            debug!("Health check skipped, link not connected");
            self.stop_health_timer();
            return false;
        };

        let timeout = inner.config.health_check_timeout();
        let failure = match tokio::time::timeout(timeout, handle.link.send(JsonRpcRequest::ping()))
            .await
        {
            Ok(Ok(response)) => {
                if let Some(error) = response.error {
                    debug!("Health probe answered with error {}: {}", error.code, error.message);
                }
                None
            }
            Ok(Err(e)) => Some(e.to_string()),
            Err(_) => Some(format!("probe timed out after {}ms", timeout.as_millis())),
        };

        let Some(reason) = failure else {
            debug!(generation = handle.generation, "Health check passed");
            return true;
        };

        warn!("Health check failed: {}", reason);
        inner.emit(SupervisorEvent::HealthCheckFailed {
            reason: reason.clone(),
        });

        // A check against a link that was already replaced must leave the
        // newer link and its timer alone
        if !self.mark_disconnected(handle.generation, &reason) {
            debug!(
                generation = handle.generation,
                "Health check failure belongs to a replaced link"
            );
            return false;
        }

        self.initialize().await;
        false
    }

    /// Record that the link of `generation` is dead. A report against a
    /// link that has since been replaced is ignored. Returns whether the
    /// state changed.
    pub fn mark_disconnected(&self, generation: u64, reason: &str) -> bool {
        let inner = &*self.inner;

        let current = inner.link.read().as_ref().map(|h| h.generation);
        if current != Some(generation) {
            debug!(generation, ?current, "Ignoring fault from a replaced link");
            return false;
        }

        {
            let mut state = inner.state.write();
            if *state != ConnectionState::Connected {
                return false;
            }
            *state = ConnectionState::Disconnected;
        }

        self.stop_health_timer();
        warn!(generation, "MCP link marked disconnected: {}", reason);
        inner.emit(SupervisorEvent::Disconnected {
            reason: reason.to_string(),
        });
        true
    }

    /// Clear the attempt counter and try to connect again. This is the way
    /// out of exhaustion without restarting the process.
    pub async fn reset(&self) -> bool {
        info!("Manual reconnection requested");
        self.cancel_retry();
        self.inner.reconnect_attempts.store(0, Ordering::SeqCst);
        self.initialize().await
    }

    /// Stop timers and close the link
    pub async fn shutdown(&self) {
        info!("Shutting down connection supervisor");
        self.cancel_retry();
        self.stop_health_timer();
        *self.inner.state.write() = ConnectionState::Disconnected;
        self.close_stale_link().await;
    }

    /// The live link, if connected
    pub fn current_link(&self) -> Option<LinkHandle> {
        if self.state() != ConnectionState::Connected {
            return None;
        }
        self.inner.link.read().clone()
    }

    pub fn state(&self) -> ConnectionState {
        *self.inner.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    pub fn is_initializing(&self) -> bool {
        self.inner.initializing.load(Ordering::SeqCst)
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.inner.reconnect_attempts.load(Ordering::SeqCst)
    }

    /// Snapshot for status responses; reads live values, no side effects
    pub fn status(&self) -> ConnectionStatus {
        ConnectionStatus {
            is_connected: self.is_connected(),
            is_initializing: self.is_initializing(),
            reconnect_attempts: self.reconnect_attempts(),
            max_reconnect_attempts: self.inner.config.max_reconnect_attempts,
        }
    }

    pub fn health_timer_active(&self) -> bool {
        self.inner
            .health_timer
            .lock()
            .as_ref()
            .map(ScheduledTask::is_active)
            .unwrap_or(false)
    }

    pub fn retry_pending(&self) -> bool {
        self.inner
            .retry_timer
            .lock()
            .as_ref()
            .map(ScheduledTask::is_active)
            .unwrap_or(false)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SupervisorEvent> {
        self.inner.events.subscribe()
    }
}
