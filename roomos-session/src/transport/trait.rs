//! Transport Trait Abstraction
//!
//! Typed interface over the device's remote object tree. A connector opens a
//! client ("ready") or fails ("error"); the client resolves
//! [`RpcClient::closed`] when the remote end goes away ("close").

use crate::xapi::XPath;
use crate::{Credentials, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;

/// Live handle to one device's xAPI
///
/// Handles are shared by reference between the owning session and any
/// number of callers. Calls on the same handle are independent; nothing
/// serializes them.
#[async_trait]
pub trait RpcClient: Send + Sync + Debug {
    /// Endpoint this client is connected to
    fn endpoint(&self) -> &str;

    /// Read a leaf or subtree
    ///
    /// # Errors
    ///
    /// Returns the device's error for unknown paths, or `ConnectionClosed`
    /// if the transport goes away before the answer arrives.
    async fn get(&self, path: &XPath) -> Result<Value>;

    /// Write a configuration leaf
    async fn set(&self, path: &XPath, value: Value) -> Result<()>;

    /// Invoke a command
    async fn invoke(&self, command: &XPath, args: Value) -> Result<Value>;

    /// Start closing the transport; returns immediately
    fn close(&self);

    /// Resolves once the transport is closed, from either side
    async fn closed(&self);

    /// Whether the transport is still open
    fn is_open(&self) -> bool;
}

/// Factory for RPC clients
#[async_trait]
pub trait RpcConnector: Send + Sync + Debug {
    /// Open a connection and authenticate
    ///
    /// # Errors
    ///
    /// Returns a classified connect-time error (authentication, certificate,
    /// reachability) whose `user_message()` is suitable for display.
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn RpcClient>>;
}
