// SPDX-License-Identifier: Apache-2.0
//! Interactive confirmation of unknown server fingerprints.

use crate::fingerprint::Fingerprint;
use async_trait::async_trait;
use std::io::BufRead;
use tracing::{info, warn};

/// What the user is asked to accept.
#[derive(Debug, Clone)]
pub struct TrustChallenge {
    pub server: String,
    /// Fingerprint the server presented just now.
    pub presented: Fingerprint,
    /// Entry on record for this server, as stored, if any.
    pub recorded: Option<String>,
}

impl TrustChallenge {
    /// Explanation shown before the question.
    pub fn notice(&self) -> String {
        let reason = match &self.recorded {
            None => "You currently do not have a record of this server's fingerprint.".to_string(),
            Some(_) => "The server's fingerprint is different from your local record of this \
                        server's fingerprint.\nYou may be a victim of a Man-in-the-Middle attack, \
                        please beware."
                .to_string(),
        };
        format!(
            "{reason}\nServer {} fingerprint (SHA-256): {}",
            self.server, self.presented
        )
    }
}

/// Yes/no decision on a [`TrustChallenge`].
#[async_trait]
pub trait FingerprintPrompt: Send + Sync {
    /// `true` only on an explicit affirmative answer.
    async fn confirm(&self, challenge: &TrustChallenge) -> bool;
}

/// `y` or `yes`, any case, surrounding whitespace ignored.
pub fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

/// Asks on stderr and reads one line from stdin.
#[derive(Debug, Default, Clone, Copy)]
pub struct StdinPrompt;

#[async_trait]
impl FingerprintPrompt for StdinPrompt {
    async fn confirm(&self, challenge: &TrustChallenge) -> bool {
        let notice = challenge.notice();
        let answer = tokio::task::spawn_blocking(move || {
            eprintln!("{notice}");
            eprintln!("Do you accept this fingerprint? [y/n]");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line).map(|_| line)
        })
        .await;

        let accepted = match answer {
            Ok(Ok(line)) => is_affirmative(&line),
            Ok(Err(e)) => {
                warn!(error = %e, "failed to read fingerprint confirmation");
                false
            }
            Err(e) => {
                warn!(error = %e, "fingerprint confirmation task failed");
                false
            }
        };
        info!(server = %challenge.server, accepted, "user answered fingerprint confirmation");
        accepted
    }
}
