//! WebSocket JSON-RPC transport
//!
//! One background task owns the socket. Callers hand it requests over a
//! channel together with a oneshot responder; the task matches responses to
//! requests by id. When the socket closes, from either side, every request
//! still in flight fails with `ConnectionClosed` and [`RpcClient::closed`]
//! resolves.

use super::{RpcClient, RpcConnector, TrustPolicy};
use crate::jsonrpc::{RpcMessage, RpcRequest};
use crate::xapi::XPath;
use crate::{Credentials, Result, SessionError};
use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, oneshot, watch};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{header::AUTHORIZATION, HeaderValue};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async_tls_with_config, WebSocketStream};
use tracing::{debug, info, warn};

/// Transport configuration
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Use `wss://` for bare hosts (devices only serve the xAPI over HTTPS by default)
    pub secure: bool,
    /// Certificate trust policy for `wss://`
    pub trust: TrustPolicy,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            secure: true,
            trust: TrustPolicy::WebPki,
        }
    }
}

/// Opens [`WebSocketClient`]s
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    config: TransportConfig,
}

impl WebSocketConnector {
    /// Create a connector
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl RpcConnector for WebSocketConnector {
    async fn connect(&self, credentials: &Credentials) -> Result<Arc<dyn RpcClient>> {
        credentials.validate()?;

        let endpoint = credentials.endpoint(self.config.secure);
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| SessionError::from_websocket_error(e, &credentials.host))?;

        let auth = HeaderValue::from_str(&credentials.basic_auth_header()).map_err(|_| {
            SessionError::InvalidCredentials("username contains invalid characters".to_string())
        })?;
        request.headers_mut().insert(AUTHORIZATION, auth);

        let tls = self.config.trust.connector()?;

        info!("Opening xAPI WebSocket to {}", endpoint);
        let (stream, _response) = connect_async_tls_with_config(request, None, false, tls)
            .await
            .map_err(|e| SessionError::from_websocket_error(e, &credentials.host))?;

        Ok(Arc::new(WebSocketClient::spawn(stream, endpoint)))
    }
}

type PendingTx = oneshot::Sender<Result<Value>>;

/// Commands sent to the socket task
enum ClientCommand {
    /// Send a request and route its response to `response_tx`
    Call {
        request: RpcRequest,
        response_tx: PendingTx,
    },
    /// Send a close frame and stop
    Close,
}

/// xAPI client over an established WebSocket
pub struct WebSocketClient {
    endpoint: String,
    command_tx: mpsc::UnboundedSender<ClientCommand>,
    closed_rx: watch::Receiver<bool>,
    next_id: AtomicU64,
}

impl WebSocketClient {
    /// Take ownership of an open WebSocket and start the socket task
    pub fn spawn<S>(stream: WebSocketStream<S>, endpoint: String) -> Self
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (closed_tx, closed_rx) = watch::channel(false);

        tokio::spawn(run_socket(stream, command_rx, closed_tx, endpoint.clone()));

        Self {
            endpoint,
            command_tx,
            closed_rx,
            next_id: AtomicU64::new(1),
        }
    }

    async fn call(&self, build: impl FnOnce(u64) -> RpcRequest) -> Result<Value> {
        let request = build(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (response_tx, response_rx) = oneshot::channel();

        self.command_tx
            .send(ClientCommand::Call {
                request,
                response_tx,
            })
            .map_err(|_| SessionError::ConnectionClosed(self.endpoint.clone()))?;

        response_rx
            .await
            .map_err(|_| SessionError::ConnectionClosed(self.endpoint.clone()))?
    }
}

impl std::fmt::Debug for WebSocketClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebSocketClient")
            .field("endpoint", &self.endpoint)
            .field("open", &self.is_open())
            .finish()
    }
}

#[async_trait]
impl RpcClient for WebSocketClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn get(&self, path: &XPath) -> Result<Value> {
        self.call(|id| RpcRequest::get(id, path)).await
    }

    async fn set(&self, path: &XPath, value: Value) -> Result<()> {
        self.call(|id| RpcRequest::set(id, path, value)).await?;
        Ok(())
    }

    async fn invoke(&self, command: &XPath, args: Value) -> Result<Value> {
        self.call(|id| RpcRequest::command(id, command, args)).await
    }

    fn close(&self) {
        let _ = self.command_tx.send(ClientCommand::Close);
    }

    async fn closed(&self) {
        let mut closed_rx = self.closed_rx.clone();
        let _ = closed_rx.wait_for(|closed| *closed).await;
    }

    fn is_open(&self) -> bool {
        !*self.closed_rx.borrow()
    }
}

async fn run_socket<S>(
    stream: WebSocketStream<S>,
    mut command_rx: mpsc::UnboundedReceiver<ClientCommand>,
    closed_tx: watch::Sender<bool>,
    endpoint: String,
) where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (mut ws_tx, mut ws_rx) = stream.split();
    let mut pending: HashMap<u64, PendingTx> = HashMap::new();

    let reason = loop {
        tokio::select! {
            cmd = command_rx.recv() => match cmd {
                Some(ClientCommand::Call { request, response_tx }) => {
                    let text = match request.to_text() {
                        Ok(text) => text,
                        Err(e) => {
                            let _ = response_tx.send(Err(e));
                            continue;
                        }
                    };
                    debug!("xAPI -> {} #{} {}", endpoint, request.id, request.method);
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        let _ = response_tx.send(Err(SessionError::from_websocket_error(e, &endpoint)));
                        break "send failed";
                    }
                    pending.insert(request.id, response_tx);
                }
                Some(ClientCommand::Close) | None => {
                    let _ = ws_tx.close().await;
                    break "closed locally";
                }
            },
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => route_frame(text.as_str(), &mut pending, &endpoint),
                Some(Ok(Message::Close(_))) => break "closed by device",
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("xAPI socket error on {}: {}", endpoint, e);
                    break "socket error";
                }
                None => break "stream ended",
            },
        }
    };

    let closed_error = || SessionError::ConnectionClosed(format!("{}: {}", endpoint, reason));

    command_rx.close();
    while let Ok(cmd) = command_rx.try_recv() {
        if let ClientCommand::Call { response_tx, .. } = cmd {
            let _ = response_tx.send(Err(closed_error()));
        }
    }
    for (_, tx) in pending.drain() {
        let _ = tx.send(Err(closed_error()));
    }

    let _ = closed_tx.send(true);
    info!("xAPI WebSocket to {} {}", endpoint, reason);
}

fn route_frame(text: &str, pending: &mut HashMap<u64, PendingTx>, endpoint: &str) {
    match RpcMessage::parse(text) {
        Ok(RpcMessage::Response { id, outcome }) => match pending.remove(&id) {
            Some(tx) => {
                debug!("xAPI <- {} #{}", endpoint, id);
                let _ = tx.send(outcome.map_err(SessionError::from));
            }
            None => debug!("Unsolicited response #{} from {}", id, endpoint),
        },
        Ok(RpcMessage::Notification { method, .. }) => {
            debug!("Ignoring {} notification from {}", method, endpoint);
        }
        Err(e) => warn!("Unreadable frame from {}: {}", endpoint, e),
    }
}
