// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `codex-login api-key`: store an API key without the browser flow.

use crate::error::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::persist::AuthFile;

#[derive(Debug, Clone, clap::Args)]
pub struct ApiKeyArgs {
    /// API key to store.
    #[arg(env = "OPENAI_API_KEY", hide_env_values = true)]
    pub key: String,
}

pub fn run(args: &ApiKeyArgs, auth_file: &AuthFile) -> i32 {
    let key = args.key.trim();
    if key.is_empty() {
        eprintln!("error: API key is empty");
        return EXIT_FAILURE;
    }
    match auth_file.save_api_key(key) {
        Ok(()) => {
            eprintln!("Successfully logged in");
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
#[path = "api_key_tests.rs"]
mod tests;
