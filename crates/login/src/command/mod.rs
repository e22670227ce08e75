// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential-management subcommands: `logout`, `status`, `api-key`.

pub mod api_key;
pub mod logout;
pub mod status;

use crate::persist::AuthFile;

#[derive(Debug, Clone, clap::Subcommand)]
pub enum Command {
    /// Remove stored credentials.
    Logout,
    /// Show which credentials are stored.
    Status,
    /// Store an API key instead of signing in with ChatGPT.
    ApiKey(api_key::ApiKeyArgs),
}

impl Command {
    /// Run against the credential file. Returns a process exit code.
    pub fn run(&self, auth_file: &AuthFile) -> i32 {
        match self {
            Self::Logout => logout::run(auth_file),
            Self::Status => status::run(auth_file),
            Self::ApiKey(args) => api_key::run(args, auth_file),
        }
    }
}
