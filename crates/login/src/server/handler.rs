// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Loopback routes: `/auth/callback`, `/success`, and a 404 fallback.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use chrono::Utc;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::claims::IdentityClaims;
use crate::error::{LoginError, ProtocolError};
use crate::persist::CredentialBundle;
use crate::redeem;
use crate::server::attempt::{Attempt, Lifecycle, Phase};

const SUCCESS_HTML: &str = include_str!("../../assets/success.html");

/// Build the loopback router. `trace_requests` logs every request.
pub fn build_router(attempt: Arc<Attempt>, trace_requests: bool) -> Router {
    let router = Router::new()
        .route("/auth/callback", get(callback).fallback(not_found))
        .route("/success", get(success).fallback(not_found))
        .fallback(not_found)
        .with_state(attempt);
    if trace_requests {
        router.layer(TraceLayer::new_for_http())
    } else {
        router
    }
}

/// Query parameters of the provider's redirect. Repeated keys keep the first value.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: Option<String>,
    pub state: Option<String>,
}

impl CallbackParams {
    pub fn parse(query: &str) -> Self {
        let mut params = Self::default();
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            let slot = match &*key {
                "code" => &mut params.code,
                "state" => &mut params.state,
                _ => continue,
            };
            if slot.is_none() {
                *slot = Some(value.into_owned());
            }
        }
        params
    }
}

/// Values carried to the success page for its setup redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuccessParams {
    pub id_token: String,
    pub needs_setup: bool,
    pub org_id: String,
    pub project_id: String,
    pub plan_type: Option<String>,
    pub platform_url: String,
}

impl SuccessParams {
    pub fn to_url(&self, url_base: &str) -> String {
        let query = url::form_urlencoded::Serializer::new(String::new())
            .append_pair("id_token", &self.id_token)
            .append_pair("needs_setup", if self.needs_setup { "true" } else { "false" })
            .append_pair("org_id", &self.org_id)
            .append_pair("project_id", &self.project_id)
            .append_pair("plan_type", self.plan_type.as_deref().unwrap_or_default())
            .append_pair("platform_url", &self.platform_url)
            .finish();
        format!("{url_base}/success?{query}")
    }
}

async fn callback(State(attempt): State<Arc<Attempt>>, RawQuery(query): RawQuery) -> Response {
    let mut lifecycle = attempt.lifecycle.lock().await;
    if lifecycle.phase() != Phase::Listening {
        warn!(phase = %lifecycle.phase(), "rejecting repeated callback");
        return (StatusCode::CONFLICT, "Login callback already handled").into_response();
    }

    match complete_login(&attempt, &mut lifecycle, query.as_deref().unwrap_or_default()).await {
        Ok(success_url) => {
            lifecycle.advance(Phase::ServingSuccess);
            (StatusCode::FOUND, [(header::LOCATION, success_url)]).into_response()
        }
        Err(e) => {
            error!(err = %e, "login failed");
            let status = e.http_status();
            let body = e.to_string();
            lifecycle.fail(e);
            attempt.shutdown.cancel();
            (status, body).into_response()
        }
    }
}

/// Validate the callback, exchange tokens, and persist. Returns the success
/// URL. Once persistence succeeds the outcome is fixed; the credit side flow
/// only logs. Cancelling the attempt aborts any phase before persistence with
/// `Interrupted`.
async fn complete_login(
    attempt: &Attempt,
    lifecycle: &mut Lifecycle,
    query: &str,
) -> Result<String, LoginError> {
    lifecycle.advance(Phase::ValidatingCallback);
    let params = CallbackParams::parse(query);
    if params.state.as_deref() != Some(attempt.state.as_str()) {
        return Err(ProtocolError::StateMismatch.into());
    }
    let code = params.code.filter(|c| !c.is_empty()).ok_or(ProtocolError::MissingCode)?;

    lifecycle.advance(Phase::ExchangingTokens);
    let tokens = unless_cancelled(
        attempt,
        attempt.provider.exchange_code(&code, &attempt.redirect_uri, &attempt.pkce),
    )
    .await?;
    let id_claims = IdentityClaims::decode(&tokens.id_token);
    let ids = id_claims.require_ids()?;
    let api_key =
        unless_cancelled(attempt, attempt.provider.exchange_for_api_key(&tokens.id_token)).await?;

    let plan_type =
        IdentityClaims::decode(&tokens.access_token).plan_type.or_else(|| id_claims.plan_type.clone());
    let success_url = SuccessParams {
        id_token: tokens.id_token.clone(),
        needs_setup: id_claims.needs_setup(),
        org_id: ids.org_id,
        project_id: ids.project_id,
        plan_type,
        platform_url: attempt.provider.endpoints().platform_url.clone(),
    }
    .to_url(&attempt.url_base());

    lifecycle.advance(Phase::Persisting);
    if attempt.shutdown.is_cancelled() {
        return Err(LoginError::Interrupted);
    }
    let bundle = CredentialBundle { api_key, tokens, last_refresh: Utc::now() };
    attempt.auth_file.save_bundle(&bundle)?;
    lifecycle.succeed();
    info!(path = %attempt.auth_file.path().display(), "credentials saved");

    lifecycle.advance(Phase::BestEffortSideFlow);
    tokio::select! {
        _ = attempt.shutdown.cancelled() => debug!("credit redemption abandoned on shutdown"),
        _ = redeem::redeem_best_effort(&attempt.provider, &attempt.auth_file, bundle.tokens) => {}
    }

    Ok(success_url)
}

/// Await `fut` unless the attempt is cancelled first.
async fn unless_cancelled<T, E>(
    attempt: &Attempt,
    fut: impl Future<Output = Result<T, E>>,
) -> Result<T, LoginError>
where
    LoginError: From<E>,
{
    tokio::select! {
        biased;
        _ = attempt.shutdown.cancelled() => Err(LoginError::Interrupted),
        out = fut => Ok(out?),
    }
}

async fn success(State(attempt): State<Arc<Attempt>>) -> Html<&'static str> {
    let mut lifecycle = attempt.lifecycle.lock().await;
    if !lifecycle.phase().is_terminal() {
        lifecycle.advance(Phase::ShuttingDown);
    }
    attempt.shutdown.cancel();
    Html(SUCCESS_HTML)
}

async fn not_found() -> (StatusCode, &'static str) {
    (StatusCode::NOT_FOUND, "Endpoint not supported")
}

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;
