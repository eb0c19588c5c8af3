//! Error Classification Tests
//!
//! Checks how connect-time and runtime failures are classified:
//! - transient network failures are recoverable
//! - credential, certificate and WebSocket setup problems need the user
//! - guidance text for each connect failure
//! - session limit enforcement

use async_trait::async_trait;
use roomos_session::{
    ConnectionManager, ConnectionSession, Credentials, LimitPolicy, ManagerConfig, Result,
    RpcClient, RpcConnector, SessionConfig, SessionError, SessionState,
};
use std::sync::Arc;

/// Connector whose every attempt fails with the same error
#[derive(Debug)]
struct FailingConnector {
    make_error: fn() -> SessionError,
}

#[async_trait]
impl RpcConnector for FailingConnector {
    async fn connect(&self, _credentials: &Credentials) -> Result<Arc<dyn RpcClient>> {
        Err((self.make_error)())
    }
}

/// Transient failures are worth retrying
#[test]
fn test_recoverable_error_classification() {
    let error = SessionError::Timeout("10.0.0.5".to_string());
    assert!(error.is_recoverable());
    assert!(!error.requires_user_action());

    let error = SessionError::NetworkUnreachable("10.0.0.5".to_string());
    assert!(error.is_recoverable());
    assert!(!error.requires_user_action());

    let error = SessionError::ConnectionClosed("10.0.0.5".to_string());
    assert!(error.is_recoverable());
}

/// Setup problems need the user to change something first
#[test]
fn test_user_action_required_classification() {
    let error = SessionError::AuthenticationFailed("10.0.0.5".to_string());
    assert!(!error.is_recoverable());
    assert!(error.requires_user_action());

    let error = SessionError::CertificateUntrusted("self-signed".to_string());
    assert!(!error.is_recoverable());
    assert!(error.requires_user_action());

    let error = SessionError::WebSocketDisabled("404".to_string());
    assert!(!error.is_recoverable());
    assert!(error.requires_user_action());
}

/// Errors from the device itself are neither
#[test]
fn test_device_error_classification() {
    let error = SessionError::Rpc {
        code: 1,
        message: "Command failed".to_string(),
    };
    assert!(!error.is_recoverable());
    assert!(!error.requires_user_action());
}

/// Guidance text points at the fix
#[test]
fn test_error_user_messages() {
    let message = SessionError::CertificateUntrusted("self-signed".to_string()).user_message();
    assert!(message.contains("browser"));
    assert!(message.contains("self-signed"));

    let message = SessionError::WebSocketDisabled("10.0.0.5".to_string()).user_message();
    assert!(message.contains("xConfiguration NetworkServices Websocket"));

    let message = SessionError::AuthenticationFailed("10.0.0.5".to_string()).user_message();
    assert!(message.contains("username and password"));

    let message = SessionError::ResourceExhausted("Maximum sessions (2) reached".to_string())
        .user_message();
    assert!(message.starts_with("Maximum sessions (2) reached"));
}

/// A connect failure reaches the session's observers as guidance text
#[tokio::test]
async fn test_connect_failure_carries_user_message() {
    let connector = Arc::new(FailingConnector {
        make_error: || SessionError::CertificateUntrusted("unknown issuer".to_string()),
    });
    let session = ConnectionSession::new("lobby", connector, SessionConfig::default());
    let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel::<roomos_session::ConnectionEvent>();
    session.subscribe(Arc::new(tx));

    let err = session
        .connect(Credentials::new("10.0.0.7", "admin", ""))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::CertificateUntrusted(_)));
    assert_eq!(session.state(), SessionState::Failed);

    let _connecting = rx.recv().await.unwrap();
    match rx.recv().await.unwrap() {
        roomos_session::ConnectionEvent::ConnectFailed { message, host, .. } => {
            assert_eq!(host, "10.0.0.7");
            assert!(message.contains("unknown issuer"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

/// Enforced limits refuse new devices but keep serving pooled ones
#[test]
fn test_enforced_session_limit() {
    let connector = Arc::new(FailingConnector {
        make_error: || SessionError::Timeout("unused".to_string()),
    });
    let manager = ConnectionManager::new(
        connector,
        ManagerConfig {
            max_sessions: 1,
            limit_policy: LimitPolicy::Enforce,
            ..Default::default()
        },
    );

    manager.get_connection("a").unwrap();
    let err = manager.get_connection("b").unwrap_err();
    assert!(matches!(err, SessionError::ResourceExhausted(_)));
    assert!(!err.requires_user_action());
    assert!(manager.get_connection("a").is_ok());
}
