// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Failure taxonomy for a login attempt.
//!
//! Every fatal class maps to a process exit code so a calling process can
//! branch on it. Failures inside the credit-redemption side flow use
//! [`crate::redeem::RedeemError`] instead and never reach this type.

use std::io;
use std::path::PathBuf;

use axum::http::StatusCode;

/// Exit code for a successful login.
pub const EXIT_SUCCESS: i32 = 0;

/// Exit code for every failure that is not a port conflict.
pub const EXIT_FAILURE: i32 = 1;

/// Exit code when the fixed callback port is already bound.
pub const EXIT_ADDRESS_IN_USE: i32 = 13;

/// Fatal errors that end a login attempt.
#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error("{0} environment variable is not set")]
    MissingHome(&'static str),

    #[error("port {port} is already in use")]
    PortInUse { port: u16 },

    #[error("failed to bind 127.0.0.1:{port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("token exchange failed: {0}")]
    Exchange(#[from] ExchangeError),

    #[error("unable to persist auth file {}: {source}", path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("login interrupted")]
    Interrupted,

    #[error("login was not completed")]
    Incomplete,
}

/// The callback or the provider's tokens violated the protocol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("State parameter mismatch")]
    StateMismatch,

    #[error("Missing authorization code")]
    MissingCode,

    #[error("missing {0} in token response")]
    MissingToken(&'static str),

    #[error("invalid {0}: expected three dot-separated segments")]
    MalformedToken(&'static str),

    #[error("Missing {0} in id_token claims")]
    MissingClaim(&'static str),
}

/// A call to the token endpoint failed.
#[derive(Debug, thiserror::Error)]
pub enum ExchangeError {
    #[error("request to {url} failed: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("invalid response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
}

impl LoginError {
    pub fn persist(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Persist { path: path.into(), source }
    }

    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::PortInUse { .. } => EXIT_ADDRESS_IN_USE,
            _ => EXIT_FAILURE,
        }
    }

    /// Status sent to the browser when this failure ends a request.
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Token and claim problems surface while exchanging, like network failures.
            Self::Protocol(ProtocolError::StateMismatch | ProtocolError::MissingCode) => {
                StatusCode::BAD_REQUEST
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Collapse an attempt outcome into the process exit code.
pub fn exit_code(outcome: &Result<(), LoginError>) -> i32 {
    match outcome {
        Ok(()) => EXIT_SUCCESS,
        Err(e) => e.exit_code(),
    }
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
