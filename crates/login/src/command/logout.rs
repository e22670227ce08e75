// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `codex-login logout`.

use crate::error::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::persist::AuthFile;

pub fn run(auth_file: &AuthFile) -> i32 {
    match auth_file.remove() {
        Ok(true) => {
            eprintln!("Successfully logged out");
            EXIT_SUCCESS
        }
        Ok(false) => {
            eprintln!("Not logged in");
            EXIT_SUCCESS
        }
        Err(e) => {
            eprintln!("error: unable to remove {}: {e}", auth_file.path().display());
            EXIT_FAILURE
        }
    }
}

#[cfg(test)]
#[path = "logout_tests.rs"]
mod tests;
