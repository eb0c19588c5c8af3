//! Connection Manager
//!
//! Keeps at most one [`ConnectionSession`] per device id and forwards every
//! session event to subscribers.
//!
//! ## Pool rules
//!
//! - `get_connection` returns the pooled session for a device or creates one
//! - a session that fails to connect or loses its connection is evicted
//! - an evicted session that connects again is re-pooled if its slot is
//!   free and, under [`LimitPolicy::Enforce`], the pool is below the limit
//! - the session limit is advisory by default (a warning); with
//!   [`LimitPolicy::Enforce`] creating a session past the limit fails

use super::events::{ConnectionEvent, SessionObserver};
use super::session::{ConnectionSession, SessionConfig};
use crate::transport::RpcConnector;
use crate::{Credentials, Result, SessionError};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Default session limit
pub const MAX_SESSIONS: usize = 10;

/// Capacity of the event broadcast channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// What happens when the session limit is reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LimitPolicy {
    /// Log a warning and create the session anyway
    #[default]
    Advisory,
    /// Refuse with `ResourceExhausted`
    Enforce,
}

/// Manager configuration
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Session limit
    pub max_sessions: usize,
    /// Behavior at the limit
    pub limit_policy: LimitPolicy,
    /// Settings for every session created by the manager
    pub session: SessionConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_sessions: MAX_SESSIONS,
            limit_policy: LimitPolicy::Advisory,
            session: SessionConfig::default(),
        }
    }
}

type Pool = Mutex<HashMap<String, Arc<ConnectionSession>>>;

/// Keeps the pool in step with one session and forwards its events
struct PoolObserver {
    pool: Weak<Pool>,
    session: Weak<ConnectionSession>,
    session_id: Uuid,
    max_sessions: usize,
    limit_policy: LimitPolicy,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl SessionObserver for PoolObserver {
    fn on_event(&self, event: &ConnectionEvent) {
        if let Some(pool) = self.pool.upgrade() {
            let device_id = event.device_id();
            match event {
                ConnectionEvent::ConnectFailed { .. } | ConnectionEvent::Disconnected { .. } => {
                    let evicted = {
                        let mut sessions = pool.lock();
                        let owns_slot = sessions
                            .get(device_id)
                            .is_some_and(|s| s.id() == self.session_id);
                        if owns_slot {
                            sessions.remove(device_id)
                        } else {
                            None
                        }
                    };
                    if evicted.is_some() {
                        debug!("Evicted session for {} from pool", device_id);
                    }
                }
                ConnectionEvent::Connected { .. } => {
                    if let Some(session) = self.session.upgrade() {
                        let mut sessions = pool.lock();
                        match sessions.get(device_id) {
                            None if self.limit_policy == LimitPolicy::Enforce
                                && sessions.len() >= self.max_sessions =>
                            {
                                warn!(
                                    "Session limit ({}) reached, not re-pooling {}",
                                    self.max_sessions, device_id
                                );
                            }
                            None => {
                                sessions.insert(device_id.to_string(), session);
                                debug!("Re-pooled session for {}", device_id);
                            }
                            Some(existing) if existing.id() != self.session_id => {
                                warn!(
                                    "{} already has a pooled session, keeping it",
                                    device_id
                                );
                            }
                            Some(_) => {}
                        }
                    }
                }
                ConnectionEvent::Connecting { .. } => {}
            }
        }

        self.event_tx.on_event(event);
    }
}

/// Pool of device sessions
pub struct ConnectionManager {
    connector: Arc<dyn RpcConnector>,
    config: ManagerConfig,
    sessions: Arc<Pool>,
    event_tx: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionManager {
    /// Create an empty pool
    pub fn new(connector: Arc<dyn RpcConnector>, config: ManagerConfig) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            connector,
            config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            event_tx,
        }
    }

    /// Manager configuration
    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    /// Subscribe to events from every session the manager creates
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.event_tx.subscribe()
    }

    /// Get the pooled session for a device, creating it if needed
    ///
    /// A new session starts `NotConnected`; call
    /// [`ConnectionSession::connect`] on it.
    pub fn get_connection(&self, device_id: &str) -> Result<Arc<ConnectionSession>> {
        let mut sessions = self.sessions.lock();
        if let Some(session) = sessions.get(device_id) {
            return Ok(session.clone());
        }

        if sessions.len() >= self.config.max_sessions {
            match self.config.limit_policy {
                LimitPolicy::Enforce => {
                    return Err(SessionError::ResourceExhausted(format!(
                        "Maximum sessions ({}) reached",
                        self.config.max_sessions
                    )));
                }
                LimitPolicy::Advisory => warn!(
                    "Session limit ({}) reached, creating session for {} anyway",
                    self.config.max_sessions, device_id
                ),
            }
        }

        let session = Arc::new(ConnectionSession::new(
            device_id,
            self.connector.clone(),
            self.config.session.clone(),
        ));
        session.subscribe(Arc::new(PoolObserver {
            pool: Arc::downgrade(&self.sessions),
            session: Arc::downgrade(&session),
            session_id: session.id(),
            max_sessions: self.config.max_sessions,
            limit_policy: self.config.limit_policy,
            event_tx: self.event_tx.clone(),
        }));
        sessions.insert(device_id.to_string(), session.clone());

        debug!(
            "Created session for {} ({} pooled)",
            device_id,
            sessions.len()
        );
        Ok(session)
    }

    /// Get (or create) the device's session and connect it
    pub async fn connect_device(
        &self,
        device_id: &str,
        credentials: Credentials,
    ) -> Result<Arc<ConnectionSession>> {
        let session = self.get_connection(device_id)?;
        session.connect(credentials).await?;
        Ok(session)
    }

    /// Pooled session for a device, if any
    pub fn session(&self, device_id: &str) -> Option<Arc<ConnectionSession>> {
        self.sessions.lock().get(device_id).cloned()
    }

    /// Ids of all pooled devices, sorted
    pub fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.sessions.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Remove a device's session from the pool and disconnect it
    ///
    /// No effect for unknown devices.
    pub fn disconnect_device(&self, device_id: &str) {
        let session = self.sessions.lock().remove(device_id);
        if let Some(session) = session {
            info!("Disconnecting device {}", device_id);
            session.disconnect();
        }
    }

    /// Disconnect every pooled session and empty the pool
    pub fn disconnect_all(&self) {
        let drained: Vec<Arc<ConnectionSession>> =
            self.sessions.lock().drain().map(|(_, s)| s).collect();
        if !drained.is_empty() {
            info!("Disconnecting {} devices", drained.len());
        }
        for session in drained {
            session.disconnect();
        }
    }

    /// Number of pooled sessions
    pub fn active_connection_count(&self) -> usize {
        self.sessions.lock().len()
    }

    /// Whether the pool is below the session limit
    pub fn can_add_more_connections(&self) -> bool {
        self.active_connection_count() < self.config.max_sessions
    }
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("devices", &self.device_ids())
            .field("max_sessions", &self.config.max_sessions)
            .field("limit_policy", &self.config.limit_policy)
            .finish()
    }
}
