// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-attempt context shared by every handler, and the listener lifecycle.

use std::fmt;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::LoginError;
use crate::oauth::IdentityProvider;
use crate::persist::AuthFile;
use crate::pkce::{build_authorize_url, PkcePair};

/// Listener lifecycle. `ShuttingDown` and `ErrorShuttingDown` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Listening,
    ValidatingCallback,
    ExchangingTokens,
    Persisting,
    BestEffortSideFlow,
    ServingSuccess,
    ShuttingDown,
    ErrorShuttingDown,
}

impl Phase {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::ShuttingDown | Self::ErrorShuttingDown)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Listening => "listening",
            Self::ValidatingCallback => "validating_callback",
            Self::ExchangingTokens => "exchanging_tokens",
            Self::Persisting => "persisting",
            Self::BestEffortSideFlow => "best_effort_side_flow",
            Self::ServingSuccess => "serving_success",
            Self::ShuttingDown => "shutting_down",
            Self::ErrorShuttingDown => "error_shutting_down",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Current phase plus the outcome recorded so far.
#[derive(Debug)]
pub struct Lifecycle {
    phase: Phase,
    recorded: Result<(), LoginError>,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self { phase: Phase::Listening, recorded: Err(LoginError::Incomplete) }
    }
}

impl Lifecycle {
    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn advance(&mut self, next: Phase) {
        tracing::debug!(from = %self.phase, to = %next, "login phase");
        self.phase = next;
    }

    /// Record success. Only reached once credentials are on disk.
    pub fn succeed(&mut self) {
        self.recorded = Ok(());
    }

    /// Record a fatal error and move to `ErrorShuttingDown`.
    pub fn fail(&mut self, err: LoginError) {
        self.advance(Phase::ErrorShuttingDown);
        self.recorded = Err(err);
    }

    pub fn is_success(&self) -> bool {
        self.recorded.is_ok()
    }

    /// Outcome once the listener has stopped. A listener stopped outside a
    /// terminal phase was interrupted, which only fails the attempt if no
    /// credentials were persisted yet.
    pub fn take_outcome(&mut self) -> Result<(), LoginError> {
        let recorded = std::mem::replace(&mut self.recorded, Err(LoginError::Incomplete));
        match recorded {
            Ok(()) => Ok(()),
            Err(e) if self.phase.is_terminal() => Err(e),
            Err(_) => Err(LoginError::Interrupted),
        }
    }
}

/// Everything one login attempt needs, created once and shared by reference.
pub struct Attempt {
    pub provider: IdentityProvider,
    pub pkce: PkcePair,
    pub state: String,
    pub port: u16,
    pub redirect_uri: String,
    pub auth_file: AuthFile,
    pub lifecycle: Mutex<Lifecycle>,
    pub shutdown: CancellationToken,
}

impl Attempt {
    pub fn new(
        provider: IdentityProvider,
        pkce: PkcePair,
        state: String,
        port: u16,
        auth_file: AuthFile,
    ) -> Self {
        Self {
            provider,
            pkce,
            state,
            port,
            redirect_uri: format!("http://localhost:{port}/auth/callback"),
            auth_file,
            lifecycle: Mutex::new(Lifecycle::default()),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn auth_url(&self) -> String {
        build_authorize_url(
            &self.provider.endpoints().issuer,
            self.provider.client_id(),
            &self.redirect_uri,
            &self.pkce,
            &self.state,
        )
    }

    pub fn url_base(&self) -> String {
        format!("http://localhost:{}", self.port)
    }

    pub async fn phase(&self) -> Phase {
        self.lifecycle.lock().await.phase()
    }

    /// Outcome of the attempt; call after the listener has stopped.
    pub async fn finish(&self) -> Result<(), LoginError> {
        self.lifecycle.lock().await.take_outcome()
    }
}

impl fmt::Debug for Attempt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attempt")
            .field("issuer", &self.provider.endpoints().issuer)
            .field("client_id", &self.provider.client_id())
            .field("redirect_uri", &self.redirect_uri)
            .field("pkce", &self.pkce)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "attempt_tests.rs"]
mod tests;
