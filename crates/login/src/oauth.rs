// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Token endpoint client: authorization-code exchange, API-key token exchange,
//! and refresh.

use std::time::Duration;

use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::claims::is_three_segment;
use crate::error::{ExchangeError, ProtocolError};
use crate::pkce::PkcePair;

pub const DEFAULT_ISSUER: &str = "https://auth.openai.com";
pub const CLIENT_ID: &str = "app_EMoamEEZ73f0CkXaXp7hrann";

const TOKEN_EXCHANGE_GRANT: &str = "urn:ietf:params:oauth:grant-type:token-exchange";
const ID_TOKEN_TYPE: &str = "urn:ietf:params:oauth:token-type:id_token";
const REQUESTED_TOKEN: &str = "openai-api-key";
const REFRESH_SCOPE: &str = "openid profile email";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Tokens returned by the authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTriple {
    pub id_token: String,
    pub access_token: String,
    pub refresh_token: String,
}

/// Tokens returned by a refresh. The provider may omit any of them.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RefreshedTokens {
    #[serde(default)]
    pub id_token: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct CodeResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
    #[serde(default)]
    refresh_token: Option<String>,
}

#[derive(Deserialize)]
struct ExchangeResponse {
    access_token: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
    scope: &'static str,
}

/// URLs derived from the issuer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoints {
    pub issuer: String,
    /// Host of the credit-redemption API.
    pub api_base: String,
    /// Host of the platform UI the success page routes to for setup.
    pub platform_url: String,
}

impl Endpoints {
    pub fn for_issuer(issuer: &str) -> Self {
        let issuer = issuer.trim_end_matches('/').to_owned();
        let (api_base, platform_url) = if issuer == DEFAULT_ISSUER {
            ("https://api.openai.com", "https://platform.openai.com")
        } else {
            ("https://api.openai.org", "https://platform.api.openai.org")
        };
        Self { issuer, api_base: api_base.to_owned(), platform_url: platform_url.to_owned() }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_owned();
        self
    }

    pub fn token_url(&self) -> String {
        format!("{}/oauth/token", self.issuer)
    }

    pub fn redeem_url(&self) -> String {
        format!("{}/v1/billing/redeem_credits", self.api_base)
    }
}

/// HTTP client bound to one identity provider and client id.
#[derive(Debug, Clone)]
pub struct IdentityProvider {
    http: reqwest::Client,
    endpoints: Endpoints,
    client_id: String,
}

impl IdentityProvider {
    pub fn new(endpoints: Endpoints, client_id: impl Into<String>) -> Result<Self, ExchangeError> {
        crate::ensure_crypto();
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            ExchangeError::InvalidResponse {
                url: endpoints.token_url(),
                reason: format!("building http client: {e}"),
            }
        })?;
        Ok(Self { http, endpoints, client_id: client_id.into() })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub(crate) fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Trade an authorization code (plus the PKCE verifier) for a token triple.
    pub async fn exchange_code(
        &self,
        code: &str,
        redirect_uri: &str,
        pkce: &PkcePair,
    ) -> Result<TokenTriple, CodeExchangeError> {
        let url = self.endpoints.token_url();
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("client_id", self.client_id.as_str()),
                ("code_verifier", pkce.verifier.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ExchangeError::Http { url: url.clone(), source })?;

        let body: CodeResponse = read_json(&url, resp).await?;
        let id_token = body.id_token.ok_or(ProtocolError::MissingToken("id_token"))?;
        let access_token = body.access_token.ok_or(ProtocolError::MissingToken("access_token"))?;
        let refresh_token =
            body.refresh_token.ok_or(ProtocolError::MissingToken("refresh_token"))?;

        if !is_three_segment(&id_token) {
            return Err(ProtocolError::MalformedToken("id_token").into());
        }
        if !is_three_segment(&access_token) {
            return Err(ProtocolError::MalformedToken("access_token").into());
        }

        Ok(TokenTriple { id_token, access_token, refresh_token })
    }

    /// Trade an identity token for an API key.
    pub async fn exchange_for_api_key(&self, id_token: &str) -> Result<String, ExchangeError> {
        let url = self.endpoints.token_url();
        let name = api_key_name();
        tracing::debug!(%name, "requesting api key");
        let resp = self
            .http
            .post(&url)
            .form(&[
                ("grant_type", TOKEN_EXCHANGE_GRANT),
                ("client_id", self.client_id.as_str()),
                ("requested_token", REQUESTED_TOKEN),
                ("subject_token", id_token),
                ("subject_token_type", ID_TOKEN_TYPE),
                ("name", name.as_str()),
            ])
            .send()
            .await
            .map_err(|source| ExchangeError::Http { url: url.clone(), source })?;

        let body: ExchangeResponse = read_json(&url, resp).await?;
        Ok(body.access_token)
    }

    /// Single refresh attempt; no retries.
    pub async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, ExchangeError> {
        let url = self.endpoints.token_url();
        let resp = self
            .http
            .post(&url)
            .json(&RefreshRequest {
                client_id: &self.client_id,
                grant_type: "refresh_token",
                refresh_token,
                scope: REFRESH_SCOPE,
            })
            .send()
            .await
            .map_err(|source| ExchangeError::Http { url: url.clone(), source })?;

        read_json(&url, resp).await
    }
}

/// Failure of the authorization-code step: transport or protocol.
#[derive(Debug, thiserror::Error)]
pub enum CodeExchangeError {
    #[error(transparent)]
    Exchange(#[from] ExchangeError),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

impl From<CodeExchangeError> for crate::error::LoginError {
    fn from(e: CodeExchangeError) -> Self {
        match e {
            CodeExchangeError::Exchange(e) => e.into(),
            CodeExchangeError::Protocol(e) => e.into(),
        }
    }
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    url: &str,
    resp: reqwest::Response,
) -> Result<T, ExchangeError> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(ExchangeError::Status { url: url.to_owned(), status: status.as_u16(), body });
    }
    let text = resp
        .text()
        .await
        .map_err(|source| ExchangeError::Http { url: url.to_owned(), source })?;
    serde_json::from_str(&text)
        .map_err(|e| ExchangeError::InvalidResponse { url: url.to_owned(), reason: e.to_string() })
}

/// Label attached to the generated API key, e.g.
/// `Codex CLI [auto-generated] (2026-10-17) [a1b2c3d4e5f6]`.
pub fn api_key_name() -> String {
    let mut suffix = [0u8; 6];
    rand::rng().fill(&mut suffix);
    format!(
        "Codex CLI [auto-generated] ({}) [{}]",
        Utc::now().format("%Y-%m-%d"),
        hex::encode(suffix)
    )
}

#[cfg(test)]
#[path = "oauth_tests.rs"]
mod tests;
