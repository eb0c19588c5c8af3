//! Device identity read after connect

use crate::transport::RpcClient;
use crate::xapi::{XPath, XRoot, XapiExt};
use serde::Serialize;
use std::time::Duration;
use tokio::time;
use tracing::warn;

/// Placeholder for identity fields that could not be read
pub const UNKNOWN: &str = "Unknown";

/// Descriptive fields of a connected device
///
/// Read once per successful connect. Any field that cannot be read is
/// `"Unknown"`; a missing field never fails the connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    /// `Config/SystemUnit/Name`
    pub unit_name: String,
    /// `Status/SystemUnit/ProductPlatform`
    pub platform: String,
    /// `Status/SystemUnit/Software/Version`
    pub software_version: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            unit_name: UNKNOWN.to_string(),
            platform: UNKNOWN.to_string(),
            software_version: UNKNOWN.to_string(),
        }
    }
}

impl DeviceIdentity {
    /// Read all identity fields concurrently
    ///
    /// A field with no answer within `limit` is `"Unknown"`.
    pub async fn fetch(client: &dyn RpcClient, limit: Duration) -> Self {
        let name = XPath::from_parts(XRoot::Config, &["SystemUnit", "Name"]);
        let platform = XPath::from_parts(XRoot::Status, &["SystemUnit", "ProductPlatform"]);
        let version = XPath::from_parts(XRoot::Status, &["SystemUnit", "Software", "Version"]);

        let (unit_name, platform, software_version) = tokio::join!(
            read_field(client, &name, limit),
            read_field(client, &platform, limit),
            read_field(client, &version, limit),
        );

        Self {
            unit_name,
            platform,
            software_version,
        }
    }
}

async fn read_field(client: &dyn RpcClient, path: &XPath, limit: Duration) -> String {
    match time::timeout(limit, client.get_text(path)).await {
        Ok(Ok(text)) if !text.is_empty() => text,
        Ok(Ok(_)) => UNKNOWN.to_string(),
        Ok(Err(e)) => {
            warn!("Could not read {} from {}: {}", path, client.endpoint(), e);
            UNKNOWN.to_string()
        }
        Err(_) => {
            warn!(
                "No answer for {} from {} within {:?}",
                path,
                client.endpoint(),
                limit
            );
            UNKNOWN.to_string()
        }
    }
}
