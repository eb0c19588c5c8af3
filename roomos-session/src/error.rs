//! Error handling for RoomOS sessions
//!
//! This module provides the error type shared by the transport, the session
//! state machine and the connection pool. Errors from underlying libraries
//! are converted with `thiserror` / `From` so `?` works everywhere.
//!
//! ## Error Handling Patterns
//!
//! ### Basic Usage
//!
//! ```rust
//! use roomos_session::Result;
//!
//! fn parse_reply(data: &str) -> Result<serde_json::Value> {
//!     // JSON errors convert automatically
//!     let value: serde_json::Value = serde_json::from_str(data)?;
//!     Ok(value)
//! }
//! ```
//!
//! ### Error Matching
//!
//! ```rust
//! use roomos_session::SessionError;
//!
//! fn describe(error: &SessionError) -> &'static str {
//!     match error {
//!         SessionError::AuthenticationFailed(_) => "check username and password",
//!         SessionError::CertificateUntrusted(_) => "trust the device certificate",
//!         e if e.is_recoverable() => "try connecting again",
//!         _ => "see logs",
//!     }
//! }
//! ```
//!
//! ## Error Categories
//!
//! ### Connect-time errors
//! Bad credentials, unreachable host, untrusted self-signed certificate,
//! WebSocket disabled on the device. All of them leave the session `Failed`
//! and are only recovered by a fresh `connect()`.
//!
//! ### Runtime errors
//! `ConnectionClosed` for requests in flight when the socket goes away,
//! `Rpc` for errors reported by the device itself.
//!
//! ### Usage errors
//! `InvalidCredentials`, `InvalidPath`, `InvalidState`, `NotConnected`,
//! `ResourceExhausted` (only with an enforced session limit).

use thiserror::Error;
use tokio_tungstenite::tungstenite;

/// Result type for session operations
pub type Result<T> = std::result::Result<T, SessionError>;

/// Errors that can occur while talking to a RoomOS device
#[derive(Error, Debug)]
pub enum SessionError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Credentials are missing a required field
    ///
    /// ```rust
    /// use roomos_session::SessionError;
    ///
    /// let error = SessionError::InvalidCredentials("host is required".to_string());
    /// assert_eq!(error.to_string(), "Invalid credentials: host is required");
    /// ```
    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    /// The device rejected the username/password
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    /// The device certificate was not trusted by the configured policy
    #[error("Certificate not trusted: {0}")]
    CertificateUntrusted(String),

    /// The device answered over HTTP but refused the WebSocket upgrade
    #[error("WebSocket unavailable: {0}")]
    WebSocketDisabled(String),

    /// Connection timeout
    #[error("Connection timeout: {0}")]
    Timeout(String),

    /// Connection refused
    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    /// Network unreachable
    #[error("Network unreachable: {0}")]
    NetworkUnreachable(String),

    /// Network connection error
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Other WebSocket transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// The transport closed while a request was in flight
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// There is no live connection to the device
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Error reported by the device in a JSON-RPC response
    ///
    /// ```rust
    /// use roomos_session::SessionError;
    ///
    /// let error = SessionError::Rpc { code: -32601, message: "Unknown command".to_string() };
    /// assert_eq!(error.to_string(), "Device error -32601: Unknown command");
    /// ```
    #[error("Device error {code}: {message}")]
    Rpc {
        /// JSON-RPC error code
        code: i64,
        /// Error message from the device
        message: String,
    },

    /// Malformed xAPI path
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Operation attempted in the wrong session state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Session limit reached under an enforced limit policy
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    /// Convert an I/O error into a more specific network error
    ///
    /// ```rust
    /// use roomos_session::SessionError;
    /// use std::io::{Error, ErrorKind};
    ///
    /// let io_error = Error::new(ErrorKind::ConnectionRefused, "refused");
    /// let error = SessionError::from_io_error(io_error, "connecting to 10.0.0.5");
    /// assert!(matches!(error, SessionError::ConnectionRefused(_)));
    /// ```
    pub fn from_io_error(error: std::io::Error, context: &str) -> Self {
        use std::io::ErrorKind;

        match error.kind() {
            ErrorKind::TimedOut => SessionError::Timeout(format!("{}: {}", context, error)),
            ErrorKind::ConnectionRefused => {
                SessionError::ConnectionRefused(format!("{}: {}", context, error))
            }
            ErrorKind::NetworkUnreachable | ErrorKind::HostUnreachable => {
                SessionError::NetworkUnreachable(format!("{}: {}", context, error))
            }
            ErrorKind::ConnectionReset | ErrorKind::ConnectionAborted | ErrorKind::BrokenPipe => {
                SessionError::NetworkError(format!(
                    "{}: connection interrupted ({})",
                    context, error
                ))
            }
            _ => SessionError::Io(error),
        }
    }

    /// Classify a WebSocket handshake/transport error
    pub fn from_websocket_error(error: tungstenite::Error, host: &str) -> Self {
        use tungstenite::http::StatusCode;

        match error {
            tungstenite::Error::Io(e) => {
                let tls_failure = e
                    .get_ref()
                    .and_then(|inner| inner.downcast_ref::<rustls::Error>())
                    .map(|tls| tls.to_string());
                match tls_failure {
                    Some(reason) => {
                        SessionError::CertificateUntrusted(format!("{}: {}", host, reason))
                    }
                    None => SessionError::from_io_error(e, host),
                }
            }
            tungstenite::Error::Tls(e) => SessionError::CertificateUntrusted(format!("{}: {}", host, e)),
            tungstenite::Error::Http(response) => match response.status() {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    SessionError::AuthenticationFailed(format!(
                        "{} rejected the credentials ({})",
                        host,
                        response.status()
                    ))
                }
                status => SessionError::WebSocketDisabled(format!(
                    "{} refused the WebSocket upgrade ({})",
                    host, status
                )),
            },
            tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
                SessionError::ConnectionClosed(host.to_string())
            }
            tungstenite::Error::Url(e) => {
                SessionError::InvalidCredentials(format!("bad host '{}': {}", host, e))
            }
            other => SessionError::Transport(format!("{}: {}", host, other)),
        }
    }

    /// Check if this error is transient and a fresh connect may succeed
    ///
    /// ```rust
    /// use roomos_session::SessionError;
    ///
    /// assert!(SessionError::Timeout("10.0.0.5".to_string()).is_recoverable());
    /// assert!(!SessionError::AuthenticationFailed("10.0.0.5".to_string()).is_recoverable());
    /// ```
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            SessionError::Timeout(_)
                | SessionError::NetworkError(_)
                | SessionError::NetworkUnreachable(_)
                | SessionError::ConnectionRefused(_)
                | SessionError::ConnectionClosed(_)
                | SessionError::Io(_)
        )
    }

    /// Check if this error requires user action before reconnecting
    pub fn requires_user_action(&self) -> bool {
        matches!(
            self,
            SessionError::InvalidCredentials(_)
                | SessionError::AuthenticationFailed(_)
                | SessionError::CertificateUntrusted(_)
                | SessionError::WebSocketDisabled(_)
                | SessionError::Configuration(_)
        )
    }

    /// Get a user-facing message with guidance on how to fix the problem
    ///
    /// ```rust
    /// use roomos_session::SessionError;
    ///
    /// let error = SessionError::WebSocketDisabled("10.0.0.5".to_string());
    /// assert!(error.user_message().contains("NetworkServices"));
    /// ```
    pub fn user_message(&self) -> String {
        match self {
            SessionError::InvalidCredentials(msg) => {
                format!("Invalid connection details: {}.", msg)
            }
            SessionError::AuthenticationFailed(_) => {
                "Authentication failed. Check the username and password, and that the user has the admin role.".to_string()
            }
            SessionError::CertificateUntrusted(msg) => {
                format!(
                    "The device certificate is not trusted ({}). Open https://<device> in a browser and accept the certificate, or allow self-signed certificates.",
                    msg
                )
            }
            SessionError::WebSocketDisabled(msg) => {
                format!(
                    "WebSocket connection refused ({}). Enable it on the device with: xConfiguration NetworkServices Websocket: FollowHTTPService, and make sure HTTPS is enabled.",
                    msg
                )
            }
            SessionError::Timeout(msg) => {
                format!("Connection timeout: {}. Check that the device is reachable.", msg)
            }
            SessionError::ConnectionRefused(_) => {
                "Connection refused. Check the host address and that HTTP(S) is enabled on the device.".to_string()
            }
            SessionError::NetworkUnreachable(_) => {
                "Network unreachable. Check the network path to the device.".to_string()
            }
            SessionError::NetworkError(msg) => {
                format!("Network error: {}. Connection may be unstable.", msg)
            }
            SessionError::Transport(msg) => format!("Transport error: {}.", msg),
            SessionError::ConnectionClosed(_) => {
                "The connection to the device was closed.".to_string()
            }
            SessionError::NotConnected(_) => "Not connected to the device.".to_string(),
            SessionError::Rpc { message, .. } => format!("The device reported: {}.", message),
            SessionError::InvalidPath(msg) => format!("Invalid xAPI path: {}.", msg),
            SessionError::InvalidState(msg) => format!("Invalid state: {}.", msg),
            SessionError::ResourceExhausted(msg) => {
                format!("{}. Disconnect another device first.", msg)
            }
            SessionError::Configuration(msg) => {
                format!("Configuration error: {}. Check your settings.", msg)
            }
            SessionError::Io(e) => format!("I/O error: {}.", e),
            SessionError::Json(e) => format!("Data format error: {}.", e),
        }
    }

    /// Create an invalid state error
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        SessionError::InvalidState(msg.into())
    }
}
