// SPDX-License-Identifier: Apache-2.0
//! Session state and login credentials.

use crate::fingerprint::Fingerprint;
use serde_json::{Map, Value};
use std::fmt;

/// Per-client session and trust state.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// Session id sent as `X-chkp-sid`.
    pub sid: Option<String>,
    /// Fingerprint the current server must present.
    pub configured_fingerprint: Option<Fingerprint>,
    /// Server address trust was established for.
    pub approved_server: Option<String>,
}

impl SessionState {
    /// Whether trust was established for `server`.
    pub fn is_approved_for(&self, server: &str) -> bool {
        self.approved_server.as_deref() == Some(server)
    }

    /// Forget approval, e.g. after the server address changed.
    pub fn reset_approval(&mut self) {
        self.approved_server = None;
    }

    /// Record that `server` presented `fingerprint` and was trusted.
    pub fn approve(&mut self, server: &str, fingerprint: Fingerprint) {
        self.configured_fingerprint = Some(fingerprint);
        self.approved_server = Some(server.to_string());
    }
}

/// Credentials and options for `login`.
#[derive(Clone, Default)]
pub struct LoginArgs {
    pub username: Option<String>,
    pub password: Option<String>,
    pub api_key: Option<String>,
    pub domain: Option<String>,
    /// Reattach to the last session of this user (web API only).
    pub continue_last_session: bool,
    /// Open a read-only session (web API only).
    pub read_only: bool,
}

impl LoginArgs {
    pub fn with_password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: Some(username.into()),
            password: Some(password.into()),
            ..Default::default()
        }
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Self {
        Self {
            api_key: Some(api_key.into()),
            ..Default::default()
        }
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    /// Login payload. Empty credential strings are left out.
    pub fn payload(&self, web_api: bool) -> Value {
        let mut payload = Map::new();
        let present = |v: &Option<String>| v.as_deref().filter(|s| !s.is_empty()).map(str::to_string);

        if let Some(user) = present(&self.username) {
            payload.insert("user".to_string(), Value::String(user));
        }
        if let Some(password) = present(&self.password) {
            payload.insert("password".to_string(), Value::String(password));
        }
        if let Some(api_key) = present(&self.api_key) {
            payload.insert("api-key".to_string(), Value::String(api_key));
        }
        if web_api {
            payload.insert(
                "continue-last-session".to_string(),
                Value::Bool(self.continue_last_session),
            );
            payload.insert("read-only".to_string(), Value::Bool(self.read_only));
        }
        if let Some(domain) = &self.domain {
            payload.insert("domain".to_string(), Value::String(domain.clone()));
        }
        Value::Object(payload)
    }
}

impl fmt::Debug for LoginArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mask = |v: &Option<String>| v.as_ref().map(|_| "****");
        f.debug_struct("LoginArgs")
            .field("username", &self.username)
            .field("password", &mask(&self.password))
            .field("api_key", &mask(&self.api_key))
            .field("domain", &self.domain)
            .field("continue_last_session", &self.continue_last_session)
            .field("read_only", &self.read_only)
            .finish()
    }
}
