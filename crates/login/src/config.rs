// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::Parser;

use crate::command::Command;
use crate::error::LoginError;
use crate::oauth::{CLIENT_ID, DEFAULT_ISSUER};
use crate::persist::{AuthFile, HOME_ENV_VAR};
use crate::server::{ServerOptions, DEFAULT_PORT};

/// Sign in with ChatGPT and store an API key under `$CODEX_HOME`.
#[derive(Debug, Parser)]
#[command(name = "codex-login", version, about)]
pub struct Config {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Do not open the browser automatically.
    #[arg(long)]
    pub no_browser: bool,

    /// Log every request to the callback listener.
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, env = "CODEX_LOGIN_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log format (json or text).
    #[arg(long, global = true, env = "CODEX_LOGIN_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Directory holding `auth.json`.
    #[arg(long, global = true, env = HOME_ENV_VAR)]
    pub codex_home: Option<PathBuf>,

    #[arg(long, env = "CODEX_LOGIN_ISSUER", default_value = DEFAULT_ISSUER, hide = true)]
    pub issuer: String,

    #[arg(long, env = "CODEX_LOGIN_CLIENT_ID", default_value = CLIENT_ID, hide = true)]
    pub client_id: String,

    #[arg(long, env = "CODEX_LOGIN_PORT", default_value_t = DEFAULT_PORT, hide = true)]
    pub port: u16,

    /// Credit-redemption host; derived from the issuer when unset.
    #[arg(long, env = "CODEX_LOGIN_API_BASE", hide = true)]
    pub api_base: Option<String>,
}

impl Config {
    /// Credential directory. Required before any listener or network work.
    pub fn codex_home(&self) -> Result<PathBuf, LoginError> {
        self.codex_home
            .clone()
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(LoginError::MissingHome(HOME_ENV_VAR))
    }

    pub fn auth_file(&self) -> Result<AuthFile, LoginError> {
        self.codex_home().map(AuthFile::new)
    }

    /// Filter directive for the tracing subscriber.
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }

    pub fn server_options(&self) -> Result<ServerOptions, LoginError> {
        Ok(ServerOptions {
            issuer: self.issuer.clone(),
            client_id: self.client_id.clone(),
            port: self.port,
            api_base: self.api_base.clone(),
            open_browser: !self.no_browser,
            trace_requests: self.verbose,
            force_state: None,
            ..ServerOptions::new(self.codex_home()?)
        })
    }

    /// Build a minimal `Config` for tests (ephemeral port, no browser).
    #[doc(hidden)]
    pub fn test(codex_home: impl Into<PathBuf>) -> Self {
        Self {
            command: None,
            no_browser: true,
            verbose: false,
            log_level: "debug".into(),
            log_format: "text".into(),
            codex_home: Some(codex_home.into()),
            issuer: DEFAULT_ISSUER.into(),
            client_id: CLIENT_ID.into(),
            port: 0,
            api_base: None,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
