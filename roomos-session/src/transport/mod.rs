//! xAPI Transport Layer
//!
//! The session layer only depends on the [`RpcConnector`] / [`RpcClient`]
//! traits. The WebSocket JSON-RPC implementation used against real devices
//! lives in [`websocket`]; certificate trust handling in [`tls`].

mod r#trait;
pub mod tls;
pub mod websocket;

pub use r#trait::{RpcClient, RpcConnector};
pub use tls::TrustPolicy;
pub use websocket::{TransportConfig, WebSocketClient, WebSocketConnector};
