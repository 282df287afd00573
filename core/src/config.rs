//! Client settings that stay fixed for the lifetime of a `PvServer`.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity and timing settings sent with every request.
///
/// Deserializable so hosts can keep these next to their own configuration;
/// missing fields take the defaults below.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Sent as `X-PVClient-Version`.
    pub version: String,
    /// Sent as `X-PVClient-Platform` and as the Login `DeviceName`.
    pub device: String,
    /// Session lifetime requested at Login, in seconds.
    pub timeout_secs: u64,
    /// Server-side configuration path used by hosts that fetch DKC files.
    pub config_path: String,
    /// Socket timeout for a whole exchange. `None` waits indefinitely.
    pub socket_timeout_ms: Option<u64>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: "3.4".to_string(),
            device: "HTML5".to_string(),
            timeout_secs: 30 * 60,
            config_path: "/PE/DKC/".to_string(),
            socket_timeout_ms: None,
        }
    }
}

impl ClientConfig {
    #[must_use]
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    #[must_use]
    pub fn with_device(mut self, device: impl Into<String>) -> Self {
        self.device = device.into();
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_secs = timeout.as_secs();
        self
    }

    #[must_use]
    pub fn with_socket_timeout(mut self, timeout: Duration) -> Self {
        self.socket_timeout_ms = Some(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));
        self
    }

    pub fn socket_timeout(&self) -> Option<Duration> {
        self.socket_timeout_ms.map(Duration::from_millis)
    }
}
