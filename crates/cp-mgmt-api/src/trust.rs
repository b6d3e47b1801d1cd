// SPDX-License-Identifier: Apache-2.0
//! Trust-on-first-use verification of the management server.
//!
//! Before any request the live certificate fingerprint is compared, in order, with the
//! configured fingerprint and the stored one. An unknown fingerprint is accepted by the user
//! (or automatically with `unsafe_auto_accept`) and then recorded. Approval is cached in the
//! session until the server address changes.

use crate::config::ClientConfig;
use crate::error::Result;
use crate::prompt::{FingerprintPrompt, TrustChallenge};
use crate::session::SessionState;
use crate::store::{FingerprintStore, parse_entry};
use crate::transport::Transport;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

pub struct TrustManager {
    store: FingerprintStore,
    prompt: Arc<dyn FingerprintPrompt>,
    // Serializes first contact so overlapping calls probe and prompt once.
    establishing: Mutex<()>,
}

impl TrustManager {
    pub fn new(store: FingerprintStore, prompt: Arc<dyn FingerprintPrompt>) -> Self {
        Self {
            store,
            prompt,
            establishing: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &FingerprintStore {
        &self.store
    }

    /// Decide whether `config.server` may be talked to.
    ///
    /// Returns `Ok(false)` when the user declines the presented fingerprint. Fails when the
    /// fingerprint cannot be obtained.
    pub async fn ensure_trusted(
        &self,
        config: &ClientConfig,
        session: &RwLock<SessionState>,
        transport: &dyn Transport,
    ) -> Result<bool> {
        let server = config.server.as_str();
        if config.unsafe_mode || session.read().await.is_approved_for(server) {
            return Ok(true);
        }

        let _guard = self.establishing.lock().await;
        if session.read().await.is_approved_for(server) {
            return Ok(true);
        }

        let presented = transport.probe_fingerprint(server, config.port).await?;

        // Approval is recorded for the checked address only.
        let configured = session.read().await.configured_fingerprint;
        if configured == Some(presented) {
            info!(server, "server fingerprint equals the configured fingerprint");
            session.write().await.approve(server, presented);
            return Ok(true);
        }

        let recorded = self.store.entry(server).await;
        if recorded.as_deref().and_then(|entry| parse_entry(server, entry)) == Some(presented) {
            info!(server, "server fingerprint equals the stored fingerprint");
            session.write().await.approve(server, presented);
            return Ok(true);
        }

        if !config.unsafe_auto_accept {
            let challenge = TrustChallenge {
                server: server.to_string(),
                presented,
                recorded,
            };
            if !self.prompt.confirm(&challenge).await {
                warn!(server, fingerprint = %presented, "server fingerprint was not accepted");
                return Ok(false);
            }
        }

        // The fingerprint is accepted for this client even if it cannot be recorded.
        if let Err(e) = self.store.save(server, &presented).await {
            warn!(server, error = %e, "accepted fingerprint was not persisted");
        }
        info!(server, fingerprint = %presented, "server fingerprint accepted");
        session.write().await.approve(server, presented);
        Ok(true)
    }
}
