//! Device credentials
//!
//! Credentials live in memory for as long as a session is connecting or
//! connected and are dropped on disconnect. Nothing in this crate persists
//! them, and the `Debug` impl never prints the password.

use crate::{Result, SessionError};
use base64::Engine as _;

/// Host and login for one RoomOS device
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Host name or IP, optionally with a port or a `ws://` / `wss://` scheme
    pub host: String,
    /// Username (usually an admin-role local user)
    pub username: String,
    /// Password, may be empty on factory-default devices
    pub password: String,
}

impl Credentials {
    /// Create credentials
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into().trim().to_string(),
            username: username.into(),
            password: password.into(),
        }
    }

    /// Check that host and username are present
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(SessionError::InvalidCredentials(
                "host is required".to_string(),
            ));
        }
        if self.username.is_empty() {
            return Err(SessionError::InvalidCredentials(
                "username is required".to_string(),
            ));
        }
        Ok(())
    }

    /// WebSocket endpoint for the xAPI on this host
    ///
    /// ```rust
    /// use roomos_session::Credentials;
    ///
    /// let creds = Credentials::new("192.168.1.100", "admin", "");
    /// assert_eq!(creds.endpoint(true), "wss://192.168.1.100/ws");
    /// assert_eq!(creds.endpoint(false), "ws://192.168.1.100/ws");
    ///
    /// let creds = Credentials::new("ws://127.0.0.1:8080", "admin", "");
    /// assert_eq!(creds.endpoint(true), "ws://127.0.0.1:8080/ws");
    /// ```
    pub fn endpoint(&self, secure: bool) -> String {
        let host = self.host.trim().trim_end_matches('/');
        if host.starts_with("ws://") || host.starts_with("wss://") {
            let after_scheme = host.split_once("://").map(|(_, rest)| rest).unwrap_or(host);
            if after_scheme.contains('/') {
                host.to_string()
            } else {
                format!("{}/ws", host)
            }
        } else {
            let scheme = if secure { "wss" } else { "ws" };
            format!("{}://{}/ws", scheme, host)
        }
    }

    /// Value of the HTTP `Authorization` header for the upgrade request
    pub fn basic_auth_header(&self) -> String {
        let token = base64::engine::general_purpose::STANDARD
            .encode(format!("{}:{}", self.username, self.password));
        format!("Basic {}", token)
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
