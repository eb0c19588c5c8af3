//! In-process fake RoomOS device for integration tests
//!
//! Serves the xAPI JSON-RPC subset the session layer uses (`xGet`, `xSet`,
//! `xCommand/...`) on a local WebSocket, with HTTP Basic authentication on
//! the upgrade request.

#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::Message;

pub const USERNAME: &str = "admin";
pub const PASSWORD: &str = "secret";

struct DeviceState {
    values: Mutex<HashMap<String, Value>>,
    silent: AtomicBool,
    connections: AtomicUsize,
    kick_tx: broadcast::Sender<()>,
}

pub struct FakeDevice {
    addr: SocketAddr,
    state: Arc<DeviceState>,
}

impl FakeDevice {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let values = HashMap::from([
            ("Config/SystemUnit/Name".to_string(), json!("Huddle 4")),
            (
                "Status/SystemUnit/ProductPlatform".to_string(),
                json!("Desk Pro"),
            ),
            (
                "Status/SystemUnit/Software/Version".to_string(),
                json!("RoomOS 11.14.1.5"),
            ),
            ("Status/SystemUnit/Uptime".to_string(), json!(86400)),
        ]);
        let (kick_tx, _) = broadcast::channel(4);
        let state = Arc::new(DeviceState {
            values: Mutex::new(values),
            silent: AtomicBool::new(false),
            connections: AtomicUsize::new(0),
            kick_tx,
        });

        let accept_state = state.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(serve_connection(stream, accept_state.clone()));
            }
        });

        Self { addr, state }
    }

    /// Host string to put in credentials
    pub fn host(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub fn value(&self, path: &str) -> Option<Value> {
        self.state.values.lock().unwrap().get(path).cloned()
    }

    /// Stop answering requests (sockets stay open)
    pub fn set_silent(&self, silent: bool) {
        self.state.silent.store(silent, Ordering::SeqCst);
    }

    /// Close every open socket from the device side
    pub fn drop_clients(&self) {
        let _ = self.state.kick_tx.send(());
    }

    pub fn open_connections(&self) -> usize {
        self.state.connections.load(Ordering::SeqCst)
    }
}

fn expected_auth() -> String {
    use base64::Engine as _;
    let token =
        base64::engine::general_purpose::STANDARD.encode(format!("{}:{}", USERNAME, PASSWORD));
    format!("Basic {}", token)
}

async fn serve_connection(stream: TcpStream, state: Arc<DeviceState>) {
    let check_auth = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        let authorized = request
            .headers()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v == expected_auth());
        if authorized {
            Ok(response)
        } else {
            let mut rejection = ErrorResponse::new(Some("Unauthorized".to_string()));
            *rejection.status_mut() = StatusCode::UNAUTHORIZED;
            Err(rejection)
        }
    };

    let Ok(mut ws) = tokio_tungstenite::accept_hdr_async(stream, check_auth).await else {
        return;
    };
    let mut kick_rx = state.kick_tx.subscribe();
    state.connections.fetch_add(1, Ordering::SeqCst);

    loop {
        tokio::select! {
            _ = kick_rx.recv() => {
                let _ = ws.close(None).await;
                break;
            }
            frame = ws.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    if state.silent.load(Ordering::SeqCst) {
                        continue;
                    }
                    if let Some(reply) = handle_request(text.as_str(), &state) {
                        if ws.send(Message::Text(reply.to_string().into())).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.connections.fetch_sub(1, Ordering::SeqCst);
}

fn handle_request(text: &str, state: &DeviceState) -> Option<Value> {
    let request: Value = serde_json::from_str(text).ok()?;
    let id = request.get("id")?.clone();
    let method = request.get("method")?.as_str()?.to_string();
    let params = request.get("params").cloned().unwrap_or(Value::Null);

    let path = params
        .get("Path")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(Value::as_str)
                .collect::<Vec<_>>()
                .join("/")
        })
        .unwrap_or_default();

    let outcome = match method.as_str() {
        "xGet" => state
            .values
            .lock()
            .unwrap()
            .get(&path)
            .cloned()
            .ok_or_else(|| no_match(&path)),
        "xSet" => {
            let value = params.get("Value").cloned().unwrap_or(Value::Null);
            state.values.lock().unwrap().insert(path, value);
            Ok(Value::Null)
        }
        "xCommand/Call/Disconnect" => Err(json!({
            "code": 1,
            "message": "Command failed",
            "data": { "Reason": "No active call" }
        })),
        m if m.starts_with("xCommand/") => Ok(json!({ "status": "OK", "echo": params })),
        _ => Err(json!({ "code": -32601, "message": "Method not found" })),
    };

    Some(match outcome {
        Ok(result) => json!({ "jsonrpc": "2.0", "id": id, "result": result }),
        Err(error) => json!({ "jsonrpc": "2.0", "id": id, "error": error }),
    })
}

fn no_match(path: &str) -> Value {
    json!({
        "code": 3,
        "message": "No match on Path argument",
        "data": { "Path": path }
    })
}
