// SPDX-License-Identifier: Apache-2.0
//! Persistent fingerprint store.
//!
//! A JSON object mapping server addresses to the last accepted fingerprint:
//!
//! ```json
//! {
//!   "192.0.2.10": "73:2F:25:6C:..."
//! }
//! ```
//!
//! Reads fail softly. A missing file is an empty store, and an unreadable or malformed file is
//! logged and treated as empty. Writes rewrite the whole file, so two processes saving at the
//! same time can lose an update.

use crate::error::{ClientError, Result};
use crate::fingerprint::Fingerprint;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Default location of the fingerprint file, relative to the working directory.
pub const DEFAULT_FINGERPRINTS_FILE: &str = "fingerprints.json";

/// File-backed `server -> fingerprint` map.
#[derive(Debug, Clone)]
pub struct FingerprintStore {
    path: PathBuf,
}

impl Default for FingerprintStore {
    fn default() -> Self {
        Self::new(DEFAULT_FINGERPRINTS_FILE)
    }
}

impl FingerprintStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load every stored entry. Never fails.
    pub async fn load(&self) -> BTreeMap<String, String> {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no fingerprint file yet");
                return BTreeMap::new();
            }
            Err(e) => {
                error!(path = %self.path.display(), error = %e, "failed to read the fingerprint file");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str(&content) {
            Ok(map) => map,
            Err(e) => {
                error!(
                    path = %self.path.display(),
                    error = %e,
                    "the fingerprint file is not in JSON format"
                );
                BTreeMap::new()
            }
        }
    }

    /// Stored entry for `server` as written in the file.
    pub async fn entry(&self, server: &str) -> Option<String> {
        self.load().await.remove(server)
    }

    /// Stored fingerprint for `server`, if there is a parsable one.
    pub async fn lookup(&self, server: &str) -> Option<Fingerprint> {
        let stored = self.entry(server).await?;
        parse_entry(server, &stored)
    }

    /// Record `fingerprint` for `server`, replacing any previous entry.
    pub async fn save(&self, server: &str, fingerprint: &Fingerprint) -> Result<()> {
        let mut fingerprints = self.load().await;
        fingerprints.insert(server.to_string(), fingerprint.to_string());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                ClientError::storage(format!("failed to create {}", parent.display()), e)
            })?;
        }

        let content = serde_json::to_string_pretty(&fingerprints)
            .map_err(|e| ClientError::storage("failed to serialize fingerprints", e))?;
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            ClientError::storage(format!("failed to write {}", self.path.display()), e)
        })?;

        info!(server, path = %self.path.display(), "stored server fingerprint");
        Ok(())
    }
}

/// Parse a stored entry. Unparsable entries are logged and yield `None`.
pub fn parse_entry(server: &str, stored: &str) -> Option<Fingerprint> {
    match Fingerprint::parse(stored) {
        Ok(fp) => Some(fp),
        Err(e) => {
            warn!(server, error = %e, "ignoring unparsable stored fingerprint");
            None
        }
    }
}
