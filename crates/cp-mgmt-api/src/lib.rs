// SPDX-License-Identifier: Apache-2.0
//! Client for the management server REST API.
//!
//! The client pins the server's TLS certificate on first use, keeps the session id returned by
//! `login`, redacts credentials and session ids in its logs and waits for long-running server
//! tasks to finish.
//!
//! ```no_run
//! use cp_mgmt_api::{ApiClient, ClientConfig, LoginArgs};
//! use serde_json::json;
//!
//! # async fn run() -> cp_mgmt_api::Result<()> {
//! let client = ApiClient::new(ClientConfig::new("192.0.2.10"))?;
//! client.login(&LoginArgs::with_password("admin", "secret")).await?;
//! client
//!     .api_call("add-host", json!({"name": "host1", "ip-address": "1.2.3.1"}))
//!     .await?;
//! client.publish().await?;
//! client.logout().await?;
//! # Ok(())
//! # }
//! ```
//!
//! The library only emits `tracing` events. Installing a subscriber is left to the application.

pub mod client;
pub mod config;
pub mod error;
pub mod fingerprint;
mod log;
pub mod prompt;
pub mod redact;
pub mod session;
pub mod store;
mod task;
pub mod tls;
pub mod transport;
pub mod trust;

#[cfg(test)]
mod testing;

pub use client::{ApiClient, ApiClientBuilder, ApiRequest, ApiResponse};
pub use config::{ClientConfig, ProxyConfig};
pub use error::{ClientError, ErrorKind, Result};
pub use fingerprint::{Fingerprint, FingerprintParseError};
pub use prompt::{FingerprintPrompt, StdinPrompt, TrustChallenge};
pub use session::{LoginArgs, SessionState};
pub use store::FingerprintStore;
pub use transport::{HttpReply, HttpRequest, HttpsTransport, Transport};
