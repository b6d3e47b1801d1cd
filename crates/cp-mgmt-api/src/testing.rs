// SPDX-License-Identifier: Apache-2.0
//! In-memory transport and prompt doubles for unit tests.

use crate::error::{ClientError, Result};
use crate::fingerprint::Fingerprint;
use crate::prompt::{FingerprintPrompt, TrustChallenge};
use crate::transport::{HttpReply, HttpRequest, Transport};
use async_trait::async_trait;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

type Handler = Box<dyn Fn(&HttpRequest, usize) -> Result<HttpReply> + Send + Sync>;

/// Records every request and answers through a handler that also receives how many times the
/// same command was seen before.
pub struct MockTransport {
    default_fingerprint: Fingerprint,
    probes: AtomicUsize,
    requests: Mutex<Vec<HttpRequest>>,
    released: AtomicBool,
    handler: Handler,
}

impl MockTransport {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&HttpRequest, usize) -> Result<HttpReply> + Send + Sync + 'static,
    {
        Self {
            default_fingerprint: Fingerprint::from_bytes([0xAA; 32]),
            probes: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
            released: AtomicBool::new(false),
            handler: Box::new(handler),
        }
    }

    /// Answers every command with an empty object.
    pub fn ok() -> Self {
        Self::new(|_, _| Ok(HttpReply::ok(serde_json::json!({}))))
    }

    pub fn default_fingerprint(&self) -> Fingerprint {
        self.default_fingerprint
    }

    pub fn probes(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn commands(&self) -> Vec<String> {
        self.requests()
            .iter()
            .map(|r| r.command().to_string())
            .collect()
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn probe_fingerprint(&self, _server: &str, _port: u16) -> Result<Fingerprint> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        Ok(self.default_fingerprint)
    }

    async fn post_json(&self, request: HttpRequest) -> Result<HttpReply> {
        let seen = {
            let mut requests = self.requests.lock().unwrap();
            let seen = requests
                .iter()
                .filter(|r| r.command() == request.command())
                .count();
            requests.push(request.clone());
            seen
        };
        (self.handler)(&request, seen)
    }

    async fn release(&self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Network failure stand-in.
pub fn network_error(command: &str) -> ClientError {
    ClientError::transport(
        format!("request to {command} failed"),
        std::io::Error::new(std::io::ErrorKind::ConnectionReset, "connection reset"),
    )
}

/// Prompt with a fixed answer that counts how often it was asked.
pub struct ScriptedPrompt {
    answer: bool,
    asked: AtomicUsize,
    last: Mutex<Option<TrustChallenge>>,
}

impl ScriptedPrompt {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
            last: Mutex::new(None),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }

    pub fn last_challenge(&self) -> Option<TrustChallenge> {
        self.last.lock().unwrap().clone()
    }
}

#[async_trait]
impl FingerprintPrompt for ScriptedPrompt {
    async fn confirm(&self, challenge: &TrustChallenge) -> bool {
        self.asked.fetch_add(1, Ordering::SeqCst);
        *self.last.lock().unwrap() = Some(challenge.clone());
        self.answer
    }
}
