// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

pub mod browser;
pub mod claims;
pub mod command;
pub mod config;
pub mod error;
pub mod oauth;
pub mod persist;
pub mod pkce;
pub mod redeem;
pub mod server;
pub mod test_support;

use std::sync::Once;

use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::Config;
use crate::error::{exit_code, EXIT_FAILURE};
use crate::server::run_login_server;

/// Install the process-wide rustls provider used by every HTTP client.
pub fn ensure_crypto() {
    static INSTALL: Once = Once::new();
    INSTALL.call_once(|| {
        // Another component may have installed one already.
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

/// Run the CLI. Returns the process exit code.
pub async fn run(config: Config) -> i32 {
    let auth_file = match config.auth_file() {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    if let Some(ref command) = config.command {
        return command.run(&auth_file);
    }

    let opts = match config.server_options() {
        Ok(opts) => opts,
        Err(e) => {
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    let server = match run_login_server(opts).await {
        Ok(server) => server,
        Err(e) => {
            error!(err = %e, "failed to start login server");
            eprintln!("Error: {e}");
            return e.exit_code();
        }
    };

    info!(port = server.actual_port(), "login server listening");
    eprintln!(
        "Starting local login server on http://localhost:{}.\n\
         If your browser did not open, navigate to this URL to authenticate:\n\n{}",
        server.actual_port(),
        server.auth_url(),
    );

    spawn_signal_handler(server.cancel_handle());

    let outcome = server.block_until_done().await;
    match &outcome {
        Ok(()) => info!("login complete"),
        Err(e) => {
            error!(err = %e, "login failed");
            eprintln!("Error logging in: {e}");
        }
    }
    exit_code(&outcome)
}

/// Cancel the login attempt on SIGTERM or SIGINT. A second signal exits
/// immediately with the failure code.
fn spawn_signal_handler(sd: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        loop {
            tokio::select! {
                _ = recv(&mut sigterm) => info!("received SIGTERM"),
                _ = recv(&mut sigint) => info!("received SIGINT"),
            }
            if sd.is_cancelled() {
                eprintln!("Forced exit");
                std::process::exit(EXIT_FAILURE);
            }
            sd.cancel();
        }
    });
}

async fn recv(signal: &mut Option<tokio::signal::unix::Signal>) {
    match signal {
        Some(s) => {
            s.recv().await;
        }
        None => std::future::pending().await,
    }
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
