//! Session Lifecycle Integration Tests
//!
//! Drives the connection manager and sessions over the real WebSocket
//! transport against an in-process fake device.

mod common;

use common::{FakeDevice, PASSWORD, USERNAME};
use roomos_session::xapi::XapiExt;
use roomos_session::{
    ConnectionEvent, ConnectionManager, Credentials, DisconnectReason, ManagerConfig,
    SessionConfig, SessionState, TransportConfig, WebSocketConnector,
};
use serde_json::json;
use std::sync::{Arc, Once};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::timeout;

static INIT_LOGGING: Once = Once::new();

fn init_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::DEBUG)
            .try_init();
    });
}

fn manager(heartbeat: Duration) -> ConnectionManager {
    init_logging();
    let connector = Arc::new(WebSocketConnector::new(TransportConfig {
        secure: false,
        ..Default::default()
    }));
    let config = ManagerConfig {
        session: SessionConfig {
            heartbeat_interval: heartbeat,
            connect_timeout: Some(Duration::from_secs(5)),
            ..Default::default()
        },
        ..Default::default()
    };
    ConnectionManager::new(connector, config)
}

async fn next_disconnect(events: &mut broadcast::Receiver<ConnectionEvent>) -> DisconnectReason {
    timeout(Duration::from_secs(10), async {
        loop {
            if let ConnectionEvent::Disconnected { reason, .. } = events.recv().await.unwrap() {
                return reason;
            }
        }
    })
    .await
    .expect("expected a Disconnected event")
}

#[tokio::test]
async fn test_connect_reads_identity_and_serves_calls() {
    let device = FakeDevice::start().await;
    let manager = manager(Duration::from_secs(30));
    let mut events = manager.subscribe();

    let session = manager
        .connect_device("huddle", Credentials::new(device.host(), USERNAME, PASSWORD))
        .await
        .unwrap();

    assert_eq!(session.state(), SessionState::Connected);
    let identity = session.identity().unwrap();
    assert_eq!(identity.unit_name, "Huddle 4");
    assert_eq!(identity.platform, "Desk Pro");
    assert_eq!(identity.software_version, "RoomOS 11.14.1.5");

    assert!(matches!(events.recv().await.unwrap(), ConnectionEvent::Connecting { .. }));
    match events.recv().await.unwrap() {
        ConnectionEvent::Connected {
            device_id,
            identity,
            ..
        } => {
            assert_eq!(device_id, "huddle");
            assert_eq!(identity.platform, "Desk Pro");
        }
        other => panic!("unexpected event {:?}", other),
    }

    let xapi = session.rpc_handle().unwrap();
    xapi.set_config("SystemUnit/Name", json!("Quiet Room"))
        .await
        .unwrap();
    assert_eq!(device.value("Config/SystemUnit/Name"), Some(json!("Quiet Room")));
    assert!(session.ping().await);

    manager.disconnect_device("huddle");
    assert_eq!(next_disconnect(&mut events).await, DisconnectReason::Requested);
    assert!(session.rpc_handle().is_none());
    timeout(Duration::from_secs(5), xapi.closed())
        .await
        .expect("transport should close after disconnect");
}

#[tokio::test]
async fn test_bad_password_fails_and_evicts() {
    let device = FakeDevice::start().await;
    let manager = manager(Duration::from_secs(30));
    let mut events = manager.subscribe();

    let session = manager.get_connection("huddle").unwrap();
    let err = session
        .connect(Credentials::new(device.host(), USERNAME, "nope"))
        .await
        .unwrap_err();

    assert!(err.requires_user_action());
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(manager.active_connection_count(), 0);

    let _connecting = events.recv().await.unwrap();
    match events.recv().await.unwrap() {
        ConnectionEvent::ConnectFailed { message, .. } => {
            assert!(message.starts_with("Authentication failed"));
        }
        other => panic!("unexpected event {:?}", other),
    }
}

#[tokio::test]
async fn test_device_closing_socket_disconnects_session() {
    let device = FakeDevice::start().await;
    let manager = manager(Duration::from_secs(30));
    let mut events = manager.subscribe();

    let session = manager
        .connect_device("huddle", Credentials::new(device.host(), USERNAME, PASSWORD))
        .await
        .unwrap();

    device.drop_clients();
    assert_eq!(next_disconnect(&mut events).await, DisconnectReason::RemoteClosed);
    assert_eq!(session.state(), SessionState::NotConnected);
    assert!(!session.heartbeat_running());
    assert_eq!(manager.active_connection_count(), 0);
}

#[tokio::test]
async fn test_unresponsive_device_fails_heartbeat() {
    let device = FakeDevice::start().await;
    let manager = manager(Duration::from_millis(200));
    let mut events = manager.subscribe();

    let session = manager
        .connect_device("huddle", Credentials::new(device.host(), USERNAME, PASSWORD))
        .await
        .unwrap();

    device.set_silent(true);
    assert_eq!(
        next_disconnect(&mut events).await,
        DisconnectReason::HeartbeatFailed
    );
    assert_eq!(session.state(), SessionState::NotConnected);
    assert_eq!(manager.active_connection_count(), 0);

    // Exactly one Disconnected per connection
    tokio::time::sleep(Duration::from_millis(600)).await;
    while let Ok(event) = events.try_recv() {
        assert!(!matches!(event, ConnectionEvent::Disconnected { .. }));
    }
}

#[tokio::test]
async fn test_reconnect_after_remote_close() {
    let device = FakeDevice::start().await;
    let manager = manager(Duration::from_secs(30));
    let mut events = manager.subscribe();
    let creds = Credentials::new(device.host(), USERNAME, PASSWORD);

    let session = manager.connect_device("huddle", creds.clone()).await.unwrap();
    device.drop_clients();
    next_disconnect(&mut events).await;
    assert!(manager.session("huddle").is_none());

    session.connect(creds).await.unwrap();
    assert!(session.is_connected());
    let pooled = manager.session("huddle").unwrap();
    assert!(Arc::ptr_eq(&pooled, &session));
}
