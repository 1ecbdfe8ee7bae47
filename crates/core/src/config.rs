//! Client configuration loaded from a JSON file.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:9090";
pub const DEFAULT_LOGIN_PATH: &str = "/cockpit/login";
pub const DEFAULT_BUS_URL: &str = "ws://localhost:9090/cockpit/socket";
const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Endpoints and limits used by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ClientConfig {
    pub gateway_url: String,
    pub login_path: String,
    pub bus_url: String,
    /// Upper bound for a single bus call; `0` waits forever.
    pub request_timeout_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            login_path: DEFAULT_LOGIN_PATH.to_string(),
            bus_url: DEFAULT_BUS_URL.to_string(),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }
}

impl ClientConfig {
    /// Reads `path`, falling back to defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        (self.request_timeout_ms > 0).then(|| Duration::from_millis(self.request_timeout_ms))
    }
}
