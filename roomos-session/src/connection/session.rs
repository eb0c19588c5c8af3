//! Connection Session
//!
//! One [`ConnectionSession`] tracks the link to one device:
//!
//! ```text
//! NotConnected --connect--> Connecting --ok--> Connected
//!       ^                       |                  |
//!       |                       +--error--> Failed |
//!       +------ disconnect / remote close / heartbeat failure
//! ```
//!
//! While `Connected` a heartbeat task probes the device every
//! `heartbeat_interval`; the first failed or unanswered probe drops the
//! connection. A second task watches the transport and drops the connection
//! when the device closes it. Each connection gets a generation number so
//! that a task belonging to a replaced connection can never touch the
//! current one, and exactly one `Disconnected` event is emitted per
//! connection.

use super::events::{ConnectionEvent, DisconnectReason, ObserverId, SessionObserver};
use super::identity::DeviceIdentity;
use crate::transport::{RpcClient, RpcConnector};
use crate::xapi::{XPath, XRoot};
use crate::{Credentials, Result, SessionError};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default time between heartbeat probes
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// Default limit on opening the transport
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Session lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection and no attempt in progress
    NotConnected,
    /// Connect attempt in progress
    Connecting,
    /// Transport open, heartbeat running
    Connected,
    /// Last connect attempt failed
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::NotConnected => write!(f, "not connected"),
            SessionState::Connecting => write!(f, "connecting"),
            SessionState::Connected => write!(f, "connected"),
            SessionState::Failed => write!(f, "failed"),
        }
    }
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Time between heartbeat probes; also the deadline for each probe
    pub heartbeat_interval: Duration,
    /// Limit on opening the transport (`None` waits for the transport's own timeout)
    pub connect_timeout: Option<Duration>,
    /// Leaf read by heartbeat and `ping()`
    pub probe_path: XPath,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: HEARTBEAT_INTERVAL,
            connect_timeout: Some(CONNECT_TIMEOUT),
            probe_path: XPath::from_parts(XRoot::Status, &["SystemUnit", "Uptime"]),
        }
    }
}

/// Mutable part of a session, guarded by one lock
struct SessionInner {
    state: SessionState,
    credentials: Option<Credentials>,
    identity: Option<DeviceIdentity>,
    handle: Option<Arc<dyn RpcClient>>,
    heartbeat: Option<JoinHandle<()>>,
    close_watch: Option<JoinHandle<()>>,
    generation: u64,
}

impl SessionInner {
    /// Move the live connection out so it can be torn down outside the lock
    fn release(&mut self) -> Released {
        Released {
            handle: self.handle.take(),
            heartbeat: self.heartbeat.take(),
            close_watch: self.close_watch.take(),
        }
    }
}

struct Released {
    handle: Option<Arc<dyn RpcClient>>,
    heartbeat: Option<JoinHandle<()>>,
    close_watch: Option<JoinHandle<()>>,
}

impl Released {
    fn finish(self) {
        if let Some(task) = self.heartbeat {
            task.abort();
        }
        if let Some(task) = self.close_watch {
            task.abort();
        }
        if let Some(handle) = self.handle {
            handle.close();
        }
    }
}

struct Shared {
    id: Uuid,
    device_id: String,
    config: SessionConfig,
    connector: Arc<dyn RpcConnector>,
    inner: Mutex<SessionInner>,
    observers: RwLock<Vec<(ObserverId, Arc<dyn SessionObserver>)>>,
    next_observer: AtomicU64,
}

impl Shared {
    fn emit(&self, event: ConnectionEvent) {
        let observers: Vec<Arc<dyn SessionObserver>> = self
            .observers
            .read()
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect();

        for observer in observers {
            observer.on_event(&event);
        }
    }

    /// Drop the live connection of `generation`, if it is still current
    fn drop_connection(&self, generation: u64, reason: DisconnectReason) {
        let (host, released) = {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != SessionState::Connected {
                return;
            }
            inner.generation += 1;
            inner.state = SessionState::NotConnected;
            inner.identity = None;
            let host = inner
                .credentials
                .take()
                .map(|c| c.host)
                .unwrap_or_default();
            (host, inner.release())
        };
        released.finish();

        warn!("Lost connection to {} ({}): {}", self.device_id, host, reason);
        self.emit(ConnectionEvent::Disconnected {
            device_id: self.device_id.clone(),
            host,
            reason,
        });
    }

    /// Mark attempt `generation` failed, if it is still current
    fn fail_attempt(&self, generation: u64, host: &str, error: &SessionError) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation || inner.state != SessionState::Connecting {
                return;
            }
            inner.state = SessionState::Failed;
            inner.credentials = None;
        }

        warn!("Connect of {} to {} failed: {}", self.device_id, host, error);
        self.emit(ConnectionEvent::ConnectFailed {
            device_id: self.device_id.clone(),
            host: host.to_string(),
            message: error.user_message(),
        });
    }
}

/// Fails the attempt if `connect` is dropped before it settles
struct PendingConnect<'a> {
    shared: &'a Shared,
    generation: u64,
    host: String,
    settled: bool,
}

impl PendingConnect<'_> {
    fn fail(mut self, error: &SessionError) {
        self.settled = true;
        self.shared.fail_attempt(self.generation, &self.host, error);
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.settled {
            let error =
                SessionError::invalid_state(format!("connect to {} was cancelled", self.host));
            self.shared.fail_attempt(self.generation, &self.host, &error);
        }
    }
}

/// Connection state machine for one device
pub struct ConnectionSession {
    shared: Arc<Shared>,
}

impl ConnectionSession {
    /// Create a session in `NotConnected`
    pub fn new(
        device_id: impl Into<String>,
        connector: Arc<dyn RpcConnector>,
        config: SessionConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                device_id: device_id.into(),
                config,
                connector,
                inner: Mutex::new(SessionInner {
                    state: SessionState::NotConnected,
                    credentials: None,
                    identity: None,
                    handle: None,
                    heartbeat: None,
                    close_watch: None,
                    generation: 0,
                }),
                observers: RwLock::new(Vec::new()),
                next_observer: AtomicU64::new(1),
            }),
        }
    }

    /// Unique id of this session instance
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Device this session belongs to
    pub fn device_id(&self) -> &str {
        &self.shared.device_id
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.shared.inner.lock().state
    }

    /// Whether the session is `Connected`
    pub fn is_connected(&self) -> bool {
        self.state() == SessionState::Connected
    }

    /// Host of the current (or in-progress) connection
    pub fn host(&self) -> Option<String> {
        self.shared
            .inner
            .lock()
            .credentials
            .as_ref()
            .map(|c| c.host.clone())
    }

    /// Identity read at connect; `None` unless connected
    pub fn identity(&self) -> Option<DeviceIdentity> {
        self.shared.inner.lock().identity.clone()
    }

    /// RPC handle of the live connection
    pub fn rpc_handle(&self) -> Option<Arc<dyn RpcClient>> {
        let inner = self.shared.inner.lock();
        match inner.state {
            SessionState::Connected => inner.handle.clone(),
            _ => None,
        }
    }

    /// Whether the heartbeat task is running
    pub fn heartbeat_running(&self) -> bool {
        self.shared
            .inner
            .lock()
            .heartbeat
            .as_ref()
            .is_some_and(|task| !task.is_finished())
    }

    /// Register an observer for this session's events
    pub fn subscribe(&self, observer: Arc<dyn SessionObserver>) -> ObserverId {
        let id = ObserverId(self.shared.next_observer.fetch_add(1, Ordering::Relaxed));
        self.shared.observers.write().push((id, observer));
        id
    }

    /// Remove an observer; returns false if it was not registered
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let mut observers = self.shared.observers.write();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    /// Connect to the device
    ///
    /// Emits `Connecting`, then `Connected` or `ConnectFailed`. Calling this
    /// while already connected replaces the live connection without a
    /// `Disconnected` event; calling it while a connect is in progress is an
    /// error. Dropping the returned future before it completes fails the
    /// attempt.
    pub async fn connect(&self, credentials: Credentials) -> Result<()> {
        credentials.validate()?;
        let host = credentials.host.clone();
        let device_id = self.shared.device_id.clone();

        let (generation, replaced) = {
            let mut inner = self.shared.inner.lock();
            if inner.state == SessionState::Connecting {
                return Err(SessionError::invalid_state(format!(
                    "{} is already connecting",
                    device_id
                )));
            }
            inner.generation += 1;
            inner.state = SessionState::Connecting;
            inner.identity = None;
            inner.credentials = Some(credentials.clone());
            (inner.generation, inner.release())
        };
        replaced.finish();
        let pending = PendingConnect {
            shared: &self.shared,
            generation,
            host: host.clone(),
            settled: false,
        };

        info!("Connecting {} to {}", device_id, host);
        self.shared.emit(ConnectionEvent::Connecting {
            device_id: device_id.clone(),
            host: host.clone(),
        });

        let attempt = self.shared.connector.connect(&credentials);
        let outcome = match self.shared.config.connect_timeout {
            Some(limit) => time::timeout(limit, attempt).await.unwrap_or_else(|_| {
                Err(SessionError::Timeout(format!(
                    "{} did not answer within {:?}",
                    host, limit
                )))
            }),
            None => attempt.await,
        };

        let handle = match outcome {
            Ok(handle) => handle,
            Err(e) => {
                pending.fail(&e);
                return Err(e);
            }
        };

        let identity =
            DeviceIdentity::fetch(handle.as_ref(), self.shared.config.heartbeat_interval).await;

        {
            let mut inner = self.shared.inner.lock();
            if inner.generation != generation {
                drop(inner);
                handle.close();
                return Err(SessionError::invalid_state(format!(
                    "connect to {} was cancelled",
                    device_id
                )));
            }

            let weak = Arc::downgrade(&self.shared);
            inner.heartbeat = Some(tokio::spawn(run_heartbeat(
                weak.clone(),
                generation,
                handle.clone(),
                self.shared.config.heartbeat_interval,
                self.shared.config.probe_path.clone(),
            )));
            inner.close_watch = Some(tokio::spawn(watch_remote_close(
                weak,
                generation,
                handle.clone(),
            )));
            inner.handle = Some(handle);
            inner.identity = Some(identity.clone());
            inner.state = SessionState::Connected;
        }
        pending.settle();

        info!(
            "Connected {} to {} ({}, {})",
            device_id, identity.unit_name, identity.platform, identity.software_version
        );
        self.shared.emit(ConnectionEvent::Connected {
            device_id,
            host,
            identity,
        });
        Ok(())
    }

    /// Disconnect from the device
    ///
    /// Idempotent. Emits `Disconnected` only when a connection was live or
    /// being established.
    pub fn disconnect(&self) {
        let (previous, host, released) = {
            let mut inner = self.shared.inner.lock();
            let previous = inner.state;
            if previous == SessionState::NotConnected {
                return;
            }
            inner.generation += 1;
            inner.state = SessionState::NotConnected;
            inner.identity = None;
            let host = inner
                .credentials
                .take()
                .map(|c| c.host)
                .unwrap_or_default();
            (previous, host, inner.release())
        };
        released.finish();

        if matches!(previous, SessionState::Connected | SessionState::Connecting) {
            info!("Disconnected {} from {}", self.shared.device_id, host);
            self.shared.emit(ConnectionEvent::Disconnected {
                device_id: self.shared.device_id.clone(),
                host,
                reason: DisconnectReason::Requested,
            });
        }
    }

    /// Probe the device once; false when not connected or the probe fails
    pub async fn ping(&self) -> bool {
        let Some(handle) = self.rpc_handle() else {
            return false;
        };
        match handle.get(&self.shared.config.probe_path).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Ping of {} failed: {}", self.shared.device_id, e);
                false
            }
        }
    }
}

impl fmt::Debug for ConnectionSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionSession")
            .field("id", &self.shared.id)
            .field("device_id", &self.shared.device_id)
            .field("state", &self.state())
            .finish()
    }
}

impl Drop for ConnectionSession {
    fn drop(&mut self) {
        let released = self.shared.inner.lock().release();
        released.finish();
    }
}

async fn run_heartbeat(
    session: Weak<Shared>,
    generation: u64,
    handle: Arc<dyn RpcClient>,
    interval: Duration,
    probe: XPath,
) {
    let mut ticker = time::interval_at(Instant::now() + interval, interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let failure = match time::timeout(interval, handle.get(&probe)).await {
            Ok(Ok(_)) => {
                debug!("Heartbeat ok on {}", handle.endpoint());
                continue;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("no answer within {:?}", interval),
        };

        if let Some(shared) = session.upgrade() {
            warn!("Heartbeat to {} failed: {}", shared.device_id, failure);
            shared.drop_connection(generation, DisconnectReason::HeartbeatFailed);
        }
        return;
    }
}

async fn watch_remote_close(session: Weak<Shared>, generation: u64, handle: Arc<dyn RpcClient>) {
    handle.closed().await;
    if let Some(shared) = session.upgrade() {
        shared.drop_connection(generation, DisconnectReason::RemoteClosed);
    }
}
