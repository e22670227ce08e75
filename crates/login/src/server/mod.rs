// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback listener for one login attempt.
//!
//! The listener is bound before any PKCE material is generated, so a port
//! conflict fails the attempt without touching the identity provider. Handlers
//! request shutdown by cancelling the attempt's token; axum's graceful
//! shutdown then finishes the in-flight response before `serve` returns.

pub mod attempt;
pub mod handler;

use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::LoginError;
use crate::oauth::{Endpoints, IdentityProvider, CLIENT_ID, DEFAULT_ISSUER};
use crate::persist::AuthFile;
use crate::pkce::{generate_state, PkcePair};

pub use attempt::{Attempt, Phase};

/// Fixed callback port registered with the identity provider.
pub const DEFAULT_PORT: u16 = 1455;

/// Settings for one login attempt.
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub codex_home: PathBuf,
    pub issuer: String,
    pub client_id: String,
    /// `0` binds an ephemeral port.
    pub port: u16,
    /// Overrides the credit-redemption host derived from the issuer.
    pub api_base: Option<String>,
    pub open_browser: bool,
    /// Log every request to the listener.
    pub trace_requests: bool,
    /// Pin the CSRF state instead of generating one.
    pub force_state: Option<String>,
}

impl ServerOptions {
    pub fn new(codex_home: impl Into<PathBuf>) -> Self {
        Self {
            codex_home: codex_home.into(),
            issuer: DEFAULT_ISSUER.to_owned(),
            client_id: CLIENT_ID.to_owned(),
            port: DEFAULT_PORT,
            api_base: None,
            open_browser: true,
            trace_requests: false,
            force_state: None,
        }
    }

    fn endpoints(&self) -> Endpoints {
        let endpoints = Endpoints::for_issuer(&self.issuer);
        match &self.api_base {
            Some(base) => endpoints.with_api_base(base.as_str()),
            None => endpoints,
        }
    }
}

/// Handle to a running login listener.
pub struct LoginServer {
    auth_url: String,
    actual_port: u16,
    shutdown: CancellationToken,
    task: JoinHandle<Result<(), LoginError>>,
}

impl LoginServer {
    /// URL the user must open to authenticate.
    pub fn auth_url(&self) -> &str {
        &self.auth_url
    }

    pub fn actual_port(&self) -> u16 {
        self.actual_port
    }

    /// Stop listening. Outcome is `Interrupted` unless credentials were
    /// already persisted.
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn cancel_handle(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Wait for the listener to stop and return the attempt's outcome.
    pub async fn block_until_done(self) -> Result<(), LoginError> {
        match self.task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(err = %e, "login server task failed");
                Err(LoginError::Interrupted)
            }
        }
    }
}

/// Bind the callback listener and start serving one login attempt.
pub async fn run_login_server(opts: ServerOptions) -> Result<LoginServer, LoginError> {
    let listener = bind(opts.port).await?;
    let actual_port = listener
        .local_addr()
        .map_err(|source| LoginError::Bind { port: opts.port, source })?
        .port();

    let provider = IdentityProvider::new(opts.endpoints(), opts.client_id.as_str())?;
    let state = opts.force_state.clone().unwrap_or_else(generate_state);
    let attempt = Arc::new(Attempt::new(
        provider,
        PkcePair::generate(),
        state,
        actual_port,
        AuthFile::new(&opts.codex_home),
    ));
    let auth_url = attempt.auth_url();
    debug!(?attempt, "login attempt ready");

    if opts.open_browser {
        crate::browser::open(&auth_url);
    }

    let router = handler::build_router(Arc::clone(&attempt), opts.trace_requests);
    let shutdown = attempt.shutdown.clone();
    let sd = shutdown.clone();
    let task = tokio::spawn(async move {
        let served = axum::serve(listener, router).with_graceful_shutdown(sd.cancelled_owned()).await;
        if let Err(e) = served {
            error!("login server error: {e}");
        }
        attempt.finish().await
    });

    Ok(LoginServer { auth_url, actual_port, shutdown, task })
}

async fn bind(port: u16) -> Result<TcpListener, LoginError> {
    TcpListener::bind(("127.0.0.1", port)).await.map_err(|source| {
        if source.kind() == io::ErrorKind::AddrInUse {
            LoginError::PortInUse { port }
        } else {
            LoginError::Bind { port, source }
        }
    })
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
