// SPDX-License-Identifier: Apache-2.0
//! Client configuration.

use crate::error::{ClientError, Result};
use crate::store::DEFAULT_FINGERPRINTS_FILE;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Context of the interactive web API; login adds session flags only here.
pub const WEB_API_CONTEXT: &str = "web_api";

/// Connection and behaviour settings of an [`ApiClient`](crate::ApiClient).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Management server address (host name or IP).
    #[serde(default = "default_server")]
    pub server: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// API namespace segment, e.g. "web_api" or "gaia_api".
    #[serde(default = "default_context")]
    pub context: String,

    /// Pins calls to `/v{api_version}/` when set.
    #[serde(default)]
    pub api_version: Option<String>,

    #[serde(default)]
    pub proxy: Option<ProxyConfig>,

    /// Fingerprint known out-of-band. Trusted without consulting the store.
    #[serde(default)]
    pub fingerprint: Option<String>,

    /// Existing session id to reuse instead of logging in.
    #[serde(default)]
    pub sid: Option<String>,

    /// Skip server identity verification entirely.
    #[serde(default, rename = "unsafe")]
    pub unsafe_mode: bool,

    /// Accept and record an unknown fingerprint without asking.
    #[serde(default)]
    pub unsafe_auto_accept: bool,

    #[serde(default = "default_fingerprints_file")]
    pub fingerprints_file: PathBuf,

    /// Delay between task status polls in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Attempts per task status poll before giving up.
    #[serde(default = "default_poll_attempts")]
    pub poll_attempts: u32,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// HTTP(S) proxy for API calls. The fingerprint probe always connects directly.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Proxy URL, e.g. "http://proxy.internal:3128".
    pub url: String,

    #[serde(default)]
    pub username: Option<String>,

    #[serde(default)]
    pub password: Option<String>,
}

impl std::fmt::Debug for ProxyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "****"))
            .finish()
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            server: default_server(),
            port: default_port(),
            context: default_context(),
            api_version: None,
            proxy: None,
            fingerprint: None,
            sid: None,
            unsafe_mode: false,
            unsafe_auto_accept: false,
            fingerprints_file: default_fingerprints_file(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_attempts: default_poll_attempts(),
            user_agent: default_user_agent(),
        }
    }
}

impl ClientConfig {
    /// Defaults pointed at `server`.
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            ..Default::default()
        }
    }

    /// Load a JSON configuration file. Missing keys take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ClientError::config_caused(format!("failed to read config {}", path.display()), e)
        })?;
        serde_json::from_str(&content).map_err(|e| {
            ClientError::config_caused(format!("failed to parse config {}", path.display()), e)
        })
    }

    /// Endpoint for `command`:
    /// `https://{server}:{port}/{context}/[v{api_version}/]{command}`.
    pub fn command_url(&self, command: &str) -> String {
        let version = self
            .api_version
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| format!("v{v}/"))
            .unwrap_or_default();
        format!(
            "https://{}:{}/{}/{}{}",
            self.server, self.port, self.context, version, command
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn is_web_api(&self) -> bool {
        self.context == WEB_API_CONTEXT
    }
}

// Default value functions for serde
fn default_server() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    443
}

fn default_context() -> String {
    WEB_API_CONTEXT.to_string()
}

fn default_fingerprints_file() -> PathBuf {
    PathBuf::from(DEFAULT_FINGERPRINTS_FILE)
}

fn default_poll_interval_ms() -> u64 {
    2000
}

fn default_poll_attempts() -> u32 {
    5
}

fn default_user_agent() -> String {
    concat!("cp-mgmt-api-rust/", env!("CARGO_PKG_VERSION")).to_string()
}
