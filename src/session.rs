//! Authenticated browser session.

use crate::error::BridgeError;
use crate::runner::{Script, ScriptRunner, Target};
use serde_json::Value;
use std::time::Duration;

/// Whether the session is known to still show the signed-in reader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Verified,
    /// A navigation was cut short; the reader may no longer be loaded.
    Unverified,
}

/// Exclusive handle to one signed-in browser process.
///
/// Created only by [`crate::auth::SessionAuthenticator`]. Signing in again
/// would discard the reader's client-side state, so the session stays bound
/// to the same runner for its whole life.
pub struct Session<R: ScriptRunner> {
    runner: R,
    state: SessionState,
}

impl<R: ScriptRunner> Session<R> {
    pub(crate) fn new(runner: R) -> Self {
        Self {
            runner,
            state: SessionState::Verified,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_verified(&self) -> bool {
        self.state == SessionState::Verified
    }

    pub(crate) fn mark_verified(&mut self) {
        self.state = SessionState::Verified;
    }

    pub(crate) fn mark_unverified(&mut self) {
        if self.state == SessionState::Verified {
            tracing::warn!("session marked unverified");
        }
        self.state = SessionState::Unverified;
    }

    /// Fails with `NotAuthenticated` unless the session is verified.
    pub(crate) fn require_verified(&self) -> Result<(), BridgeError> {
        match self.state {
            SessionState::Verified => Ok(()),
            SessionState::Unverified => Err(BridgeError::NotAuthenticated(
                "session must be re-verified by a library call".to_string(),
            )),
        }
    }

    /// Runs a script through the owned runner.
    ///
    /// A timeout while a page was loading leaves the reader in an unknown
    /// state, so it also marks the session unverified.
    pub(crate) async fn execute(
        &mut self,
        target: Target<'_>,
        script: &Script,
        timeout: Duration,
    ) -> Result<Value, BridgeError> {
        let result = self.runner.execute(target, script, timeout).await;
        if let Err(err) = &result {
            if err.is_navigation_timeout() {
                self.mark_unverified();
            }
        }
        result
    }

    pub(crate) fn runner_mut(&mut self) -> &mut R {
        &mut self.runner
    }

    /// Shuts the browser down.
    pub async fn close(mut self) -> Result<(), BridgeError> {
        self.runner.shutdown().await
    }
}
