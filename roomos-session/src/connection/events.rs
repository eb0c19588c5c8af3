//! Connection Event System
//!
//! Sessions report lifecycle changes to registered observers. Observers are
//! called synchronously, after the session has released its own state lock,
//! in registration order.

use super::identity::DeviceIdentity;
use std::fmt;
use tokio::sync::{broadcast, mpsc};

/// Why a live session went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectReason {
    /// `disconnect()` was called
    Requested,
    /// The device closed the transport
    RemoteClosed,
    /// A heartbeat probe failed or went unanswered
    HeartbeatFailed,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::Requested => write!(f, "disconnect requested"),
            DisconnectReason::RemoteClosed => write!(f, "closed by device"),
            DisconnectReason::HeartbeatFailed => write!(f, "heartbeat failed"),
        }
    }
}

/// Events emitted by a session
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// A connect attempt started
    Connecting {
        /// Device the session belongs to
        device_id: String,
        /// Host being connected to
        host: String,
    },

    /// The transport is up and identity fields have been read
    Connected {
        /// Device the session belongs to
        device_id: String,
        /// Connected host
        host: String,
        /// Best-effort identity
        identity: DeviceIdentity,
    },

    /// A connect attempt failed; the session is `Failed`
    ConnectFailed {
        /// Device the session belongs to
        device_id: String,
        /// Host that could not be reached
        host: String,
        /// Guidance text for display
        message: String,
    },

    /// A live (or pending) connection ended
    Disconnected {
        /// Device the session belongs to
        device_id: String,
        /// Host the session was connected to
        host: String,
        /// What ended it
        reason: DisconnectReason,
    },
}

impl ConnectionEvent {
    /// Device the event refers to
    pub fn device_id(&self) -> &str {
        match self {
            ConnectionEvent::Connecting { device_id, .. }
            | ConnectionEvent::Connected { device_id, .. }
            | ConnectionEvent::ConnectFailed { device_id, .. }
            | ConnectionEvent::Disconnected { device_id, .. } => device_id,
        }
    }

    /// Host the event refers to
    pub fn host(&self) -> &str {
        match self {
            ConnectionEvent::Connecting { host, .. }
            | ConnectionEvent::Connected { host, .. }
            | ConnectionEvent::ConnectFailed { host, .. }
            | ConnectionEvent::Disconnected { host, .. } => host,
        }
    }
}

/// Receives session events
///
/// Implementations must not block and must not call back into the session
/// that is notifying them.
pub trait SessionObserver: Send + Sync {
    /// Called once per event
    fn on_event(&self, event: &ConnectionEvent);
}

impl SessionObserver for mpsc::UnboundedSender<ConnectionEvent> {
    fn on_event(&self, event: &ConnectionEvent) {
        let _ = self.send(event.clone());
    }
}

impl SessionObserver for broadcast::Sender<ConnectionEvent> {
    fn on_event(&self, event: &ConnectionEvent) {
        // No receivers is fine
        let _ = self.send(event.clone());
    }
}

/// Handle returned by `subscribe`, used to unsubscribe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverId(pub(crate) u64);
