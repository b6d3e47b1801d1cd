// SPDX-License-Identifier: Apache-2.0
//! Transport capability: fingerprint probing and JSON exchange.

use crate::config::ProxyConfig;
use crate::error::{ClientError, Result};
use crate::fingerprint::Fingerprint;
use crate::tls;
use async_trait::async_trait;
use reqwest::{Client, ClientBuilder};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::debug;

/// One HTTPS POST with a JSON body.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl HttpRequest {
    /// Last path segment of the URL, i.e. the API command.
    pub fn command(&self) -> &str {
        self.url.rsplit('/').next().unwrap_or_default()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Raw HTTP answer, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpReply {
    pub status: u16,
    pub status_text: String,
    pub body: Value,
}

impl HttpReply {
    pub fn ok(body: Value) -> Self {
        Self {
            status: 200,
            status_text: "OK".to_string(),
            body,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network operations the client needs.
///
/// Implementations must tolerate concurrent calls that share one connection pool.
#[async_trait]
pub trait Transport: Send + Sync {
    /// SHA-256 fingerprint of the leaf certificate served at `server:port`.
    async fn probe_fingerprint(&self, server: &str, port: u16) -> Result<Fingerprint>;

    /// Send `request`. Only network failures are errors; any HTTP status is returned as a reply.
    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply>;

    /// Drop pooled connections. Later calls open new ones.
    async fn release(&self);
}

/// `reqwest` backed transport with a keep-alive connection pool.
///
/// Certificate checks are disabled on the pool; callers gate every request on the fingerprint
/// probe instead.
pub struct HttpsTransport {
    proxy: Option<ProxyConfig>,
    client: Mutex<Option<Client>>,
}

impl HttpsTransport {
    pub fn new(proxy: Option<ProxyConfig>) -> Result<Self> {
        let client = build_client(proxy.as_ref())?;
        Ok(Self {
            proxy,
            client: Mutex::new(Some(client)),
        })
    }

    async fn client(&self) -> Result<Client> {
        let mut guard = self.client.lock().await;
        if let Some(client) = guard.as_ref() {
            return Ok(client.clone());
        }
        let client = build_client(self.proxy.as_ref())?;
        *guard = Some(client.clone());
        Ok(client)
    }
}

fn build_client(proxy: Option<&ProxyConfig>) -> Result<Client> {
    let mut builder = ClientBuilder::new()
        .danger_accept_invalid_certs(true)
        .tcp_keepalive(Duration::from_secs(60))
        .pool_max_idle_per_host(8);

    if let Some(proxy) = proxy {
        let mut reqwest_proxy = reqwest::Proxy::all(&proxy.url).map_err(|e| {
            ClientError::config_caused(format!("invalid proxy url {}", proxy.url), e)
        })?;
        if let Some(username) = &proxy.username {
            reqwest_proxy =
                reqwest_proxy.basic_auth(username, proxy.password.as_deref().unwrap_or_default());
        }
        builder = builder.proxy(reqwest_proxy);
    }

    builder
        .build()
        .map_err(|e| ClientError::config_caused("failed to build HTTP client", e))
}

#[async_trait]
impl Transport for HttpsTransport {
    async fn probe_fingerprint(&self, server: &str, port: u16) -> Result<Fingerprint> {
        tls::probe_fingerprint(server, port).await
    }

    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply> {
        let client = self.client().await?;
        let body = serde_json::to_vec(&request.body)
            .map_err(|e| ClientError::config_caused("payload is not serializable", e))?;

        let mut builder = client.post(&request.url).body(body);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().await.map_err(|e| {
            ClientError::transport(format!("request to {} failed", request.command()), e)
        })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| {
            ClientError::transport(format!("failed to read {} response", request.command()), e)
        })?;
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).unwrap_or(Value::String(text))
        };

        Ok(HttpReply {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            body,
        })
    }

    async fn release(&self) {
        if self.client.lock().await.take().is_some() {
            debug!("released pooled connections");
        }
    }
}
