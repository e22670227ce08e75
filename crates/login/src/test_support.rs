// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared test infrastructure: token builders, a mock identity provider, and
//! assertion helpers.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration as StdDuration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::claims::AUTH_CLAIM_NAMESPACE;

/// Build an unsigned three-segment token carrying `claims`.
pub fn make_jwt(claims: &Value) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(claims.to_string());
    let signature = URL_SAFE_NO_PAD.encode(b"sig");
    format!("{header}.{payload}.{signature}")
}

/// Identity-token claims for an onboarded Pro subscriber of several weeks.
pub fn default_id_claims() -> Value {
    json!({
        "email": "user@example.com",
        "exp": (Utc::now() + Duration::hours(1)).timestamp(),
        AUTH_CLAIM_NAMESPACE: {
            "organization_id": "org-123",
            "project_id": "proj-456",
            "completed_platform_onboarding": true,
            "is_org_owner": false,
            "chatgpt_subscription_active_start": (Utc::now() - Duration::days(30)).to_rfc3339(),
            "chatgpt_plan_type": "pro",
        }
    })
}

/// Access-token claims carrying only the plan type.
pub fn default_access_claims() -> Value {
    json!({ AUTH_CLAIM_NAMESPACE: { "chatgpt_plan_type": "pro" } })
}

/// Overwrite one key inside the namespaced auth claims.
pub fn with_auth_claim(mut claims: Value, key: &str, value: Value) -> Value {
    if let Some(auth) = claims.get_mut(AUTH_CLAIM_NAMESPACE).and_then(Value::as_object_mut) {
        auth.insert(key.to_owned(), value);
    }
    claims
}

/// One request received by [`MockIssuer`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub path: String,
    pub grant_type: Option<String>,
    pub body: String,
}

struct MockState {
    calls: Mutex<Vec<RecordedCall>>,
    id_claims: Value,
    access_claims: Value,
    refreshed_id_claims: Value,
    code_response: Option<(u16, Value)>,
    exchange_status: u16,
    refresh_status: u16,
    redeem_response: Value,
    token_delay: StdDuration,
}

/// Builder for [`MockIssuer`].
pub struct MockIssuerBuilder {
    state: MockState,
}

impl Default for MockIssuerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MockIssuerBuilder {
    pub fn new() -> Self {
        Self {
            state: MockState {
                calls: Mutex::new(Vec::new()),
                id_claims: default_id_claims(),
                access_claims: default_access_claims(),
                refreshed_id_claims: default_id_claims(),
                code_response: None,
                exchange_status: 200,
                refresh_status: 200,
                redeem_response: json!({ "granted_chatgpt_subscriber_api_credits": 50 }),
                token_delay: StdDuration::ZERO,
            },
        }
    }

    pub fn id_claims(mut self, claims: Value) -> Self {
        self.state.id_claims = claims;
        self
    }

    pub fn access_claims(mut self, claims: Value) -> Self {
        self.state.access_claims = claims;
        self
    }

    pub fn refreshed_id_claims(mut self, claims: Value) -> Self {
        self.state.refreshed_id_claims = claims;
        self
    }

    /// Replace the authorization-code response body entirely.
    pub fn code_response(mut self, status: u16, body: Value) -> Self {
        self.state.code_response = Some((status, body));
        self
    }

    pub fn exchange_status(mut self, status: u16) -> Self {
        self.state.exchange_status = status;
        self
    }

    pub fn refresh_status(mut self, status: u16) -> Self {
        self.state.refresh_status = status;
        self
    }

    /// Hold every token-endpoint response for `delay` after recording it.
    pub fn token_delay(mut self, delay: StdDuration) -> Self {
        self.state.token_delay = delay;
        self
    }

    pub fn redeem_response(mut self, body: Value) -> Self {
        self.state.redeem_response = body;
        self
    }

    pub async fn start(self) -> anyhow::Result<MockIssuer> {
        let state = Arc::new(self.state);
        let app = Router::new()
            .route("/oauth/token", post(token_endpoint))
            .route("/v1/billing/redeem_credits", post(redeem_endpoint))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let sd = shutdown.clone();
        tokio::spawn(async move {
            axum::serve(listener, app).with_graceful_shutdown(sd.cancelled_owned()).await.ok();
        });

        Ok(MockIssuer { addr, state, shutdown })
    }
}

/// An in-process identity provider serving the token and redemption endpoints.
pub struct MockIssuer {
    addr: SocketAddr,
    state: Arc<MockState>,
    shutdown: CancellationToken,
}

impl MockIssuer {
    pub fn builder() -> MockIssuerBuilder {
        MockIssuerBuilder::new()
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Grant types seen on the token endpoint, in order.
    pub fn grant_types(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| c.path == "/oauth/token")
            .filter_map(|c| c.grant_type)
            .collect()
    }

    pub fn redeem_calls(&self) -> usize {
        self.calls().iter().filter(|c| c.path == "/v1/billing/redeem_credits").count()
    }

    /// The id_token the mock returns from the authorization-code exchange.
    pub fn id_token(&self) -> String {
        make_jwt(&self.state.id_claims)
    }
}

impl Drop for MockIssuer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

fn record(state: &MockState, path: &str, grant_type: Option<String>, body: &str) {
    if let Ok(mut calls) = state.calls.lock() {
        calls.push(RecordedCall { path: path.to_owned(), grant_type, body: body.to_owned() });
    }
}

/// Token requests arrive form-encoded, except refresh which is JSON.
fn grant_type_of(body: &str) -> Option<String> {
    if let Ok(value) = serde_json::from_str::<Value>(body) {
        return value.get("grant_type").and_then(Value::as_str).map(str::to_owned);
    }
    url::form_urlencoded::parse(body.as_bytes())
        .find(|(k, _)| k == "grant_type")
        .map(|(_, v)| v.into_owned())
}

async fn token_endpoint(
    State(state): State<Arc<MockState>>,
    body: String,
) -> (StatusCode, Json<Value>) {
    let grant_type = grant_type_of(&body);
    record(&state, "/oauth/token", grant_type.clone(), &body);
    if !state.token_delay.is_zero() {
        tokio::time::sleep(state.token_delay).await;
    }

    let status = |code: u16| StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match grant_type.as_deref() {
        Some("authorization_code") => match &state.code_response {
            Some((code, body)) => (status(*code), Json(body.clone())),
            None => (
                StatusCode::OK,
                Json(json!({
                    "id_token": make_jwt(&state.id_claims),
                    "access_token": make_jwt(&state.access_claims),
                    "refresh_token": "refresh-123",
                })),
            ),
        },
        Some("urn:ietf:params:oauth:grant-type:token-exchange") => (
            status(state.exchange_status),
            Json(json!({ "access_token": "sk-test-api-key", "token_type": "bearer" })),
        ),
        Some("refresh_token") => (
            status(state.refresh_status),
            Json(json!({
                "id_token": make_jwt(&state.refreshed_id_claims),
                "access_token": "access-refreshed",
                "refresh_token": "refresh-456",
            })),
        ),
        _ => (StatusCode::BAD_REQUEST, Json(json!({ "error": "unsupported_grant_type" }))),
    }
}

async fn redeem_endpoint(State(state): State<Arc<MockState>>, body: String) -> Json<Value> {
    record(&state, "/v1/billing/redeem_credits", None, &body);
    Json(state.redeem_response.clone())
}

/// HTTP client for driving a login listener. Redirects are not followed.
pub fn browser_client() -> anyhow::Result<reqwest::Client> {
    crate::ensure_crypto();
    Ok(reqwest::Client::builder().redirect(reqwest::redirect::Policy::none()).build()?)
}

/// Convert any `Result` with a displayable error into `anyhow::Result`.
pub trait AnyhowExt<T> {
    fn anyhow(self) -> anyhow::Result<T>;
}

impl<T, E: std::fmt::Display> AnyhowExt<T> for Result<T, E> {
    fn anyhow(self) -> anyhow::Result<T> {
        self.map_err(|e| anyhow::anyhow!("{e}"))
    }
}

/// Assert that an expression evaluates to `Err` whose Display output
/// contains the given substring.
#[macro_export]
macro_rules! assert_err_contains {
    ($expr:expr, $substr:expr) => {{
        let result = $expr;
        let err = result.expect_err(concat!("expected Err for: ", stringify!($expr)));
        let msg = err.to_string();
        assert!(msg.contains($substr), "expected error containing {:?}, got: {msg:?}", $substr);
    }};
}
