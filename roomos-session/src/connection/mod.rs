//! Device sessions and the session pool
//!
//! - [`ConnectionSession`]: connect/disconnect state machine with heartbeat
//! - [`ConnectionManager`]: one session per device id, event fan-out
//! - [`ConnectionEvent`]: lifecycle notifications

pub mod events;
pub mod identity;
pub mod manager;
pub mod session;

pub use events::{ConnectionEvent, DisconnectReason, ObserverId, SessionObserver};
pub use identity::DeviceIdentity;
pub use manager::{ConnectionManager, LimitPolicy, ManagerConfig, MAX_SESSIONS};
pub use session::{
    ConnectionSession, SessionConfig, SessionState, CONNECT_TIMEOUT, HEARTBEAT_INTERVAL,
};
