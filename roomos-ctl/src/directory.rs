//! Device Directory
//!
//! Online/offline view of devices built from the session manager's event
//! stream.

use chrono::{DateTime, Utc};
use roomos_session::{ConnectionEvent, DeviceIdentity};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Reachability of one device as last reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    /// Connect in progress
    Connecting,
    /// Session connected
    Online,
    /// Connect failed or connection lost
    Offline,
}

impl fmt::Display for Presence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Presence::Connecting => write!(f, "connecting"),
            Presence::Online => write!(f, "online"),
            Presence::Offline => write!(f, "offline"),
        }
    }
}

/// Directory entry
#[derive(Debug, Clone, Serialize)]
pub struct DeviceStatus {
    /// Device id
    pub device_id: String,
    /// Last host used
    pub host: String,
    /// Current presence
    pub presence: Presence,
    /// Identity from the last successful connect
    pub identity: Option<DeviceIdentity>,
    /// Why the device is offline, if known
    pub detail: Option<String>,
    /// When presence last changed
    pub since: DateTime<Utc>,
}

/// Devices keyed by id
#[derive(Debug, Default)]
pub struct DeviceDirectory {
    devices: BTreeMap<String, DeviceStatus>,
}

impl DeviceDirectory {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Update from one event and return the new entry
    pub fn apply(&mut self, event: &ConnectionEvent) -> &DeviceStatus {
        let (presence, identity, detail) = match event {
            ConnectionEvent::Connecting { .. } => (Presence::Connecting, None, None),
            ConnectionEvent::Connected { identity, .. } => {
                (Presence::Online, Some(identity.clone()), None)
            }
            ConnectionEvent::ConnectFailed { message, .. } => {
                (Presence::Offline, None, Some(message.clone()))
            }
            ConnectionEvent::Disconnected { reason, .. } => {
                (Presence::Offline, None, Some(reason.to_string()))
            }
        };

        let entry = self
            .devices
            .entry(event.device_id().to_string())
            .or_insert_with(|| DeviceStatus {
                device_id: event.device_id().to_string(),
                host: event.host().to_string(),
                presence,
                identity: None,
                detail: None,
                since: Utc::now(),
            });

        if entry.presence != presence {
            entry.since = Utc::now();
        }
        entry.host = event.host().to_string();
        entry.presence = presence;
        entry.detail = detail;
        // Keep the last known identity while offline
        if identity.is_some() {
            entry.identity = identity;
        }
        entry
    }

    /// Entry for a device
    pub fn get(&self, device_id: &str) -> Option<&DeviceStatus> {
        self.devices.get(device_id)
    }

    /// All entries, ordered by id
    pub fn entries(&self) -> impl Iterator<Item = &DeviceStatus> {
        self.devices.values()
    }

    /// Number of devices currently online
    pub fn online_count(&self) -> usize {
        self.devices
            .values()
            .filter(|d| d.presence == Presence::Online)
            .count()
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<16} {:<10} {}", self.device_id, self.presence, self.host)?;
        if let Some(identity) = &self.identity {
            write!(
                f,
                "  {} / {} / {}",
                identity.unit_name, identity.platform, identity.software_version
            )?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "  ({})", detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roomos_session::DisconnectReason;

    fn identity() -> DeviceIdentity {
        DeviceIdentity {
            unit_name: "Boardroom".to_string(),
            platform: "Room Bar".to_string(),
            software_version: "RoomOS 11.14".to_string(),
        }
    }

    #[test]
    fn test_connect_cycle() {
        let mut directory = DeviceDirectory::new();

        directory.apply(&ConnectionEvent::Connecting {
            device_id: "board".to_string(),
            host: "10.0.0.5".to_string(),
        });
        assert_eq!(directory.get("board").unwrap().presence, Presence::Connecting);

        directory.apply(&ConnectionEvent::Connected {
            device_id: "board".to_string(),
            host: "10.0.0.5".to_string(),
            identity: identity(),
        });
        assert_eq!(directory.online_count(), 1);

        let entry = directory.apply(&ConnectionEvent::Disconnected {
            device_id: "board".to_string(),
            host: "10.0.0.5".to_string(),
            reason: DisconnectReason::HeartbeatFailed,
        });
        assert_eq!(entry.presence, Presence::Offline);
        assert_eq!(entry.detail.as_deref(), Some("heartbeat failed"));
        assert_eq!(entry.identity.as_ref().unwrap().platform, "Room Bar");
        assert_eq!(directory.online_count(), 0);
    }

    #[test]
    fn test_connect_failure_keeps_guidance() {
        let mut directory = DeviceDirectory::new();
        directory.apply(&ConnectionEvent::ConnectFailed {
            device_id: "lobby".to_string(),
            host: "lobby.local".to_string(),
            message: "Authentication failed.".to_string(),
        });

        let entry = directory.get("lobby").unwrap();
        assert_eq!(entry.presence, Presence::Offline);
        assert!(entry.to_string().contains("Authentication failed."));
    }

    #[test]
    fn test_status_serializes_as_json() {
        let mut directory = DeviceDirectory::new();
        let status = directory.apply(&ConnectionEvent::Connected {
            device_id: "board".to_string(),
            host: "10.0.0.5".to_string(),
            identity: identity(),
        });

        let json = serde_json::to_value(status).unwrap();
        assert_eq!(json["device_id"], "board");
        assert_eq!(json["presence"], "online");
        assert_eq!(json["identity"]["unit_name"], "Boardroom");
        assert!(json["detail"].is_null());
        assert!(json["since"].is_string());
    }

    #[test]
    fn test_entries_are_sorted() {
        let mut directory = DeviceDirectory::new();
        for id in ["c", "a", "b"] {
            directory.apply(&ConnectionEvent::Connecting {
                device_id: id.to_string(),
                host: format!("{}.local", id),
            });
        }
        let ids: Vec<_> = directory.entries().map(|d| d.device_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
