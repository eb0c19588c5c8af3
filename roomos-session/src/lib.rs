//! RoomOS Session Layer
//!
//! This library manages authenticated xAPI connections to Cisco RoomOS
//! collaboration endpoints: one session per device with a heartbeat, a pool
//! keyed by device id, and lifecycle events for anything that wants to track
//! which devices are online.
//!
//! ```rust,no_run
//! use roomos_session::{ConnectionManager, Credentials, ManagerConfig, WebSocketConnector};
//! use roomos_session::xapi::XapiExt;
//! use std::sync::Arc;
//!
//! # async fn run() -> roomos_session::Result<()> {
//! let connector = Arc::new(WebSocketConnector::default());
//! let manager = ConnectionManager::new(connector, ManagerConfig::default());
//!
//! let session = manager
//!     .connect_device("boardroom", Credentials::new("10.0.0.5", "admin", ""))
//!     .await?;
//! if let Some(xapi) = session.rpc_handle() {
//!     let uptime = xapi.status("SystemUnit/Uptime").await?;
//!     println!("up {} s", uptime);
//! }
//! manager.disconnect_all();
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod credentials;
pub mod jsonrpc;
pub mod transport;
pub mod xapi;

mod error;

pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionSession, DeviceIdentity, DisconnectReason,
    LimitPolicy, ManagerConfig, ObserverId, SessionConfig, SessionObserver, SessionState,
};
pub use credentials::Credentials;
pub use error::{Result, SessionError};
pub use transport::{
    RpcClient, RpcConnector, TransportConfig, TrustPolicy, WebSocketClient, WebSocketConnector,
};
pub use xapi::{XPath, XRoot, XapiExt};

#[cfg(test)]
pub mod test_utils;
