// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Credential persistence: `<home>/auth.json` with owner-only permissions and
//! atomic writes.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::LoginError;
use crate::oauth::TokenTriple;

/// Environment variable naming the credential directory.
pub const HOME_ENV_VAR: &str = "CODEX_HOME";

const AUTH_FILE_NAME: &str = "auth.json";

/// Result of a completed login, ready to be persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialBundle {
    pub api_key: String,
    pub tokens: TokenTriple,
    pub last_refresh: DateTime<Utc>,
}

/// On-disk layout of `auth.json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthDotJson {
    #[serde(rename = "OPENAI_API_KEY")]
    pub api_key: Option<String>,
    #[serde(default)]
    pub tokens: Option<TokenTriple>,
    #[serde(default)]
    pub last_refresh: Option<DateTime<Utc>>,
}

impl From<&CredentialBundle> for AuthDotJson {
    fn from(bundle: &CredentialBundle) -> Self {
        Self {
            api_key: Some(bundle.api_key.clone()),
            tokens: Some(bundle.tokens.clone()),
            last_refresh: Some(bundle.last_refresh),
        }
    }
}

/// Read/update access to persisted credentials, as seen by the refresh step.
pub trait CredentialStore {
    fn load(&self) -> io::Result<AuthDotJson>;

    /// Replace the identity and refresh tokens and stamp `last_refresh`.
    /// The access token and API key are left untouched.
    fn update_tokens(&self, id_token: &str, refresh_token: &str) -> io::Result<()>;
}

/// The `auth.json` file under one credential home.
#[derive(Debug, Clone)]
pub struct AuthFile {
    home: PathBuf,
}

impl AuthFile {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }

    pub fn path(&self) -> PathBuf {
        self.home.join(AUTH_FILE_NAME)
    }

    /// Persist a fresh login result, creating the home directory if needed.
    pub fn save_bundle(&self, bundle: &CredentialBundle) -> Result<(), LoginError> {
        self.write(&AuthDotJson::from(bundle))
    }

    /// Persist an API key without any ChatGPT tokens.
    pub fn save_api_key(&self, api_key: &str) -> Result<(), LoginError> {
        self.write(&AuthDotJson { api_key: Some(api_key.to_owned()), ..Default::default() })
    }

    pub fn write(&self, doc: &AuthDotJson) -> Result<(), LoginError> {
        fs::create_dir_all(&self.home).map_err(|e| LoginError::persist(&self.home, e))?;
        let path = self.path();
        write_private(&path, doc).map_err(|e| LoginError::persist(&path, e))
    }

    /// Delete `auth.json`. Returns whether a file was removed.
    pub fn remove(&self) -> io::Result<bool> {
        match fs::remove_file(self.path()) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

impl CredentialStore for AuthFile {
    fn load(&self) -> io::Result<AuthDotJson> {
        let contents = fs::read_to_string(self.path())?;
        serde_json::from_str(&contents).map_err(io::Error::other)
    }

    fn update_tokens(&self, id_token: &str, refresh_token: &str) -> io::Result<()> {
        let mut doc = self.load()?;
        let tokens = doc.tokens.get_or_insert_with(|| TokenTriple {
            id_token: String::new(),
            access_token: String::new(),
            refresh_token: String::new(),
        });
        tokens.id_token = id_token.to_owned();
        tokens.refresh_token = refresh_token.to_owned();
        doc.last_refresh = Some(Utc::now());
        write_private(&self.path(), &doc)
    }
}

/// Write `doc` to `path` atomically (write tmp + rename).
///
/// The temp file is created with mode `0600` before any bytes land in it, so
/// the credentials are never readable by group or other. The temp name is
/// unique per process and call.
fn write_private(path: &Path, doc: &AuthDotJson) -> io::Result<()> {
    static COUNTER: AtomicU32 = AtomicU32::new(0);

    let json = serde_json::to_string_pretty(doc).map_err(io::Error::other)?;
    let seq = COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_name = format!(
        "{}.{}.{}.tmp",
        path.file_name().unwrap_or_default().to_string_lossy(),
        std::process::id(),
        seq,
    );
    let tmp_path = path.with_file_name(tmp_name);

    let result = (|| {
        let mut file = open_private(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)
    })();
    if result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    result
}

fn open_private(path: &Path) -> io::Result<fs::File> {
    let mut options = OpenOptions::new();
    options.create(true).truncate(true).write(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let file = options.open(path)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        // Best-effort; some filesystems ignore modes.
        if let Err(e) = file.set_permissions(fs::Permissions::from_mode(0o600)) {
            tracing::debug!(path = %path.display(), err = %e, "could not restrict permissions");
        }
    }
    Ok(file)
}

#[cfg(test)]
#[path = "persist_tests.rs"]
mod tests;
