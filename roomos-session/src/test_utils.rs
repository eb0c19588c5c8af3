//! Test doubles for the transport traits

use crate::connection::ConnectionEvent;
use crate::transport::{RpcClient, RpcConnector};
use crate::xapi::XPath;
use crate::{Credentials, Result, SessionError};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Drain everything currently queued on an observer channel
pub fn collect_events(rx: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> Vec<ConnectionEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

/// In-memory device
#[derive(Debug)]
pub struct MockClient {
    endpoint: String,
    values: Mutex<HashMap<String, Value>>,
    failing_paths: Mutex<HashSet<String>>,
    hanging_paths: Mutex<HashSet<String>>,
    fail_all: AtomicBool,
    closed_tx: watch::Sender<bool>,
    gets: AtomicUsize,
}

impl MockClient {
    pub fn new(endpoint: &str) -> Self {
        let values = HashMap::from([
            ("Config/SystemUnit/Name".to_string(), json!("Boardroom")),
            (
                "Status/SystemUnit/ProductPlatform".to_string(),
                json!("Room Kit Pro"),
            ),
            (
                "Status/SystemUnit/Software/Version".to_string(),
                json!("ce11.14.1.5"),
            ),
            ("Status/SystemUnit/Uptime".to_string(), json!(1234)),
        ]);
        let (closed_tx, _) = watch::channel(false);
        Self {
            endpoint: endpoint.to_string(),
            values: Mutex::new(values),
            failing_paths: Mutex::new(HashSet::new()),
            hanging_paths: Mutex::new(HashSet::new()),
            fail_all: AtomicBool::new(false),
            closed_tx,
            gets: AtomicUsize::new(0),
        }
    }

    pub fn set_value(&self, path: &str, value: Value) {
        self.values.lock().insert(path.to_string(), value);
    }

    pub fn value(&self, path: &str) -> Option<Value> {
        self.values.lock().get(path).cloned()
    }

    pub fn fail_path(&self, path: &str) {
        self.failing_paths.lock().insert(path.to_string());
    }

    /// Never answer reads of `path`
    pub fn hang_path(&self, path: &str) {
        self.hanging_paths.lock().insert(path.to_string());
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Simulate the device closing the socket
    pub fn remote_close(&self) {
        self.closed_tx.send_replace(true);
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcClient for MockClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, path: &XPath) -> Result<Value> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if !self.is_open() {
            return Err(SessionError::ConnectionClosed(self.endpoint.clone()));
        }
        let key = path.to_string();
        let hang = self.hanging_paths.lock().contains(&key);
        if hang {
            std::future::pending::<()>().await;
        }
        if self.fail_all.load(Ordering::SeqCst) || self.failing_paths.lock().contains(&key) {
            return Err(SessionError::Rpc {
                code: 1,
                message: "No match on Path argument".to_string(),
            });
        }
        self.values.lock().get(&key).cloned().ok_or(SessionError::Rpc {
            code: 1,
            message: "No match on Path argument".to_string(),
        })
    }

    async fn set(&self, path: &XPath, value: Value) -> Result<()> {
        self.set_value(&path.to_string(), value);
        Ok(())
    }

    async fn invoke(&self, _command: &XPath, _args: Value) -> Result<Value> {
        Ok(json!({ "status": "OK" }))
    }

    fn close(&self) {
        self.closed_tx.send_replace(true);
    }

    async fn closed(&self) {
        let mut rx = self.closed_tx.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }

    fn is_open(&self) -> bool {
        !*self.closed_tx.borrow()
    }
}

/// Connector handing out [`MockClient`]s
#[derive(Debug, Default)]
pub struct MockConnector {
    failing_hosts: Mutex<HashSet<String>>,
    hanging_hosts: Mutex<HashSet<String>>,
    hanging_paths: Mutex<HashSet<String>>,
    clients: Mutex<Vec<Arc<MockClient>>>,
    connects: AtomicUsize,
}

impl MockConnector {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Refuse connections to `host`
    pub fn fail_host(&self, host: &str) {
        self.failing_hosts.lock().insert(host.to_string());
    }

    /// Never answer connections to `host`
    pub fn hang_host(&self, host: &str) {
        self.hanging_hosts.lock().insert(host.to_string());
    }

    /// Clients created from now on never answer reads of `path`
    pub fn hang_path(&self, path: &str) {
        self.hanging_paths.lock().insert(path.to_string());
    }

    pub fn last_client(&self) -> Option<Arc<MockClient>> {
        self.clients.lock().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RpcConnector for MockConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn RpcClient>> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let hang = self.hanging_hosts.lock().contains(&credentials.host);
        if hang {
            std::future::pending::<()>().await;
        }
        let fail = self.failing_hosts.lock().contains(&credentials.host);
        if fail {
            return Err(SessionError::ConnectionRefused(format!(
                "{}: connection refused",
                credentials.host
            )));
        }

        let client = Arc::new(MockClient::new(&credentials.endpoint(true)));
        for path in self.hanging_paths.lock().iter() {
            client.hang_path(path);
        }
        self.clients.lock().push(client.clone());
        Ok(client)
    }
}
