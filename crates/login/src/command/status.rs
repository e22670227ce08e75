// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `codex-login status`: report which credentials are stored.

use std::fmt;
use std::io;

use chrono::{DateTime, Utc};

use crate::claims::IdentityClaims;
use crate::error::{EXIT_FAILURE, EXIT_SUCCESS};
use crate::persist::{AuthDotJson, AuthFile, CredentialStore};

/// What `auth.json` holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthStatus {
    NotLoggedIn,
    ApiKey { key: String },
    ChatGpt { key: Option<String>, plan: Option<String>, last_refresh: Option<DateTime<Utc>> },
}

impl AuthStatus {
    pub fn from_doc(doc: &AuthDotJson) -> Self {
        let key = doc.api_key.as_deref().filter(|k| !k.is_empty()).map(mask_key);
        match (&doc.tokens, key) {
            (Some(tokens), key) => Self::ChatGpt {
                key,
                plan: IdentityClaims::decode(&tokens.id_token).plan_type,
                last_refresh: doc.last_refresh,
            },
            (None, Some(key)) => Self::ApiKey { key },
            (None, None) => Self::NotLoggedIn,
        }
    }

    pub fn is_logged_in(&self) -> bool {
        !matches!(self, Self::NotLoggedIn)
    }
}

impl fmt::Display for AuthStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotLoggedIn => f.write_str("Not logged in"),
            Self::ApiKey { key } => write!(f, "Logged in using an API key - {key}"),
            Self::ChatGpt { key, plan, last_refresh } => {
                f.write_str("Logged in using ChatGPT")?;
                if let Some(plan) = plan {
                    write!(f, "\n  plan: {plan}")?;
                }
                if let Some(key) = key {
                    write!(f, "\n  api key: {key}")?;
                }
                if let Some(ts) = last_refresh {
                    write!(f, "\n  last refresh: {}", ts.to_rfc3339())?;
                }
                Ok(())
            }
        }
    }
}

pub fn run(auth_file: &AuthFile) -> i32 {
    let status = match auth_file.load() {
        Ok(doc) => AuthStatus::from_doc(&doc),
        Err(e) if e.kind() == io::ErrorKind::NotFound => AuthStatus::NotLoggedIn,
        Err(e) => {
            eprintln!("error: unable to read {}: {e}", auth_file.path().display());
            return EXIT_FAILURE;
        }
    };
    println!("{status}");
    if status.is_logged_in() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    }
}

/// Keep a recognizable prefix and suffix of an API key.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 13 {
        return "***".to_owned();
    }
    let head: String = chars[..8].iter().collect();
    let tail: String = chars[chars.len() - 5..].iter().collect();
    format!("{head}***{tail}")
}

#[cfg(test)]
#[path = "status_tests.rs"]
mod tests;
