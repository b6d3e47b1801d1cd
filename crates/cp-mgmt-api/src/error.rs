// SPDX-License-Identifier: Apache-2.0
//! Client error type.
//!
//! [`ClientError`] is the only error that leaves this crate. Network, HTTP, JSON and file
//! failures are wrapped into it before they cross the API boundary, and every error reports a
//! summary through `tracing` when it is constructed.

use serde_json::Value;
use std::error::Error as StdError;
use tracing::error;

/// Result alias used throughout the crate.
pub type Result<T, E = ClientError> = std::result::Result<T, E>;

type BoxError = Box<dyn StdError + Send + Sync + 'static>;

const DEFAULT_MESSAGE: &str = "API Error";

/// Broad failure class of a [`ClientError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Server identity could not be established or was declined.
    Trust,
    /// Network or TLS failure before an HTTP status was received.
    Transport,
    /// The server answered with a non-success HTTP status.
    Status,
    /// The server answered with a body the client could not interpret.
    Protocol,
    /// A retried call used up its attempt budget.
    Retry,
    /// Invalid client configuration or request.
    Config,
    /// Local persistent state could not be written.
    Storage,
}

/// Error returned by every fallible client operation.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct ClientError {
    kind: ErrorKind,
    message: String,
    status_code: Option<u16>,
    status_text: Option<String>,
    data: Option<Value>,
    #[source]
    cause: Option<BoxError>,
}

impl ClientError {
    fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status_code: None,
            status_text: None,
            data: None,
            cause: None,
        }
    }

    fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Trust could not be established for the target server.
    pub fn trust(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Trust, message).reported()
    }

    /// Network level failure.
    pub fn transport(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Transport, message)
            .with_cause(cause)
            .reported()
    }

    /// Non-success HTTP response.
    ///
    /// The message is taken from the `message` field of the response body when present,
    /// otherwise from the body text.
    pub fn status(status_code: u16, status_text: impl Into<String>, data: Value) -> Self {
        let message = match &data {
            Value::Object(map) => map
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| data.to_string()),
            Value::String(s) if !s.is_empty() => s.clone(),
            Value::String(_) | Value::Null => DEFAULT_MESSAGE.to_string(),
            other => other.to_string(),
        };
        let status_text = status_text.into();
        let mut err = Self::new(ErrorKind::Status, message);
        err.status_code = Some(status_code);
        err.status_text = (!status_text.is_empty()).then_some(status_text);
        err.data = Some(data);
        err.reported()
    }

    /// Unexpected response body.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Protocol, message).reported()
    }

    /// Invalid configuration or request input.
    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Config, message).reported()
    }

    /// Invalid configuration caused by an underlying error.
    pub fn config_caused(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Config, message)
            .with_cause(cause)
            .reported()
    }

    /// Local state could not be persisted.
    pub fn storage(message: impl Into<String>, cause: impl Into<BoxError>) -> Self {
        Self::new(ErrorKind::Storage, message)
            .with_cause(cause)
            .reported()
    }

    /// A bounded retry gave up. Status details of the last failure are carried over.
    pub fn retry_exhausted(command: &str, attempts: u32, last: ClientError) -> Self {
        let mut err = Self::new(
            ErrorKind::Retry,
            format!("{command} failed after {attempts} attempt(s): {}", last.message),
        );
        err.status_code = last.status_code;
        err.status_text = last.status_text.clone();
        err.data = last.data.clone();
        err.with_cause(last).reported()
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }

    pub fn status_text(&self) -> Option<&str> {
        self.status_text.as_deref()
    }

    /// Response body of a failed HTTP exchange, if any.
    pub fn data(&self) -> Option<&Value> {
        self.data.as_ref()
    }

    /// Render the cause chain as `outer: inner: root`.
    pub fn cause_chain(&self) -> Option<String> {
        let first = self.cause.as_deref()?;
        let mut parts = vec![first.to_string()];
        let mut current = first.source();
        while let Some(err) = current {
            parts.push(err.to_string());
            current = err.source();
        }
        Some(parts.join(": "))
    }

    fn reported(self) -> Self {
        let chain = self.cause_chain();
        let data = self.data.as_ref().map(Value::to_string);
        error!(
            kind = ?self.kind,
            status = ?self.status_code,
            status_text = self.status_text.as_deref().unwrap_or_default(),
            message = %self.message,
            data = data.as_deref().unwrap_or_default(),
            original_error = chain.as_deref().unwrap_or_default(),
            "API error"
        );
        self
    }
}
