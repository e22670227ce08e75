// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Open the authorization URL in the user's browser.

use tracing::{debug, warn};

/// Best-effort; the URL is also printed, so failure only warns.
pub fn open(url: &str) {
    match webbrowser::open(url) {
        Ok(()) => debug!("opened browser for authentication"),
        Err(e) => {
            warn!(err = %e, "failed to open browser");
            eprintln!("Failed to open browser: {e}");
        }
    }
}
