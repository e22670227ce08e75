// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Best-effort redemption of complimentary API credits for paid subscribers.
//!
//! Runs after credentials are persisted. It works on a copy of the persisted
//! tokens plus a [`CredentialStore`], and its errors ([`RedeemError`]) have no
//! conversion into [`crate::error::LoginError`], so it cannot change the
//! outcome of the login attempt.

use std::fmt;
use std::io;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::claims::IdentityClaims;
use crate::error::ExchangeError;
use crate::oauth::{read_json, IdentityProvider, TokenTriple};
use crate::persist::CredentialStore;

/// Minimum subscription age, in days, before credits can be redeemed.
const MIN_SUBSCRIPTION_DAYS: i64 = 7;

const GRANTED_FIELD: &str = "granted_chatgpt_subscriber_api_credits";

const CREDITS_URL: &str = "https://platform.openai.com/settings/organization/billing/credit-grants";
const HELP_URL: &str = "https://help.openai.com/en/articles/11381614";

/// Paid tiers eligible for complimentary credits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plan {
    Plus,
    Pro,
}

impl Plan {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "plus" => Some(Self::Plus),
            "pro" => Some(Self::Pro),
            _ => None,
        }
    }

    /// Credit amount advertised for this tier.
    pub fn reward(self) -> &'static str {
        match self {
            Self::Plus => "$5",
            Self::Pro => "$50",
        }
    }
}

impl fmt::Display for Plan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Plus => "Plus",
            Self::Pro => "Pro",
        })
    }
}

/// Why redemption was not attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    SubscriptionTooRecent,
    NeedsSetup,
    IneligiblePlan(Option<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RedeemOutcome {
    Skipped(SkipReason),
    Granted(Plan),
    /// The endpoint answered but granted nothing; carries the raw response.
    NotGranted(Value),
}

#[derive(Debug, thiserror::Error)]
pub enum RedeemError {
    #[error("unable to refresh id token: {0}")]
    Refresh(#[source] ExchangeError),

    #[error("refresh response did not include both an id token and a refresh token")]
    RefreshIncomplete,

    #[error("unable to update refresh token in auth file: {0}")]
    UpdateAuthFile(#[source] io::Error),

    #[error("credit redemption request failed: {0}")]
    Redeem(#[source] ExchangeError),
}

#[derive(Serialize)]
struct RedeemRequest<'a> {
    id_token: &'a str,
}

/// Run the side flow and report the result on stderr. Never fails.
pub async fn redeem_best_effort<S>(provider: &IdentityProvider, store: &S, tokens: TokenTriple)
where
    S: CredentialStore + ?Sized,
{
    match maybe_redeem_credits(provider, store, tokens, Utc::now()).await {
        Ok(outcome) => report(&outcome),
        Err(e) => {
            tracing::warn!(err = %e, "credit redemption skipped");
            eprintln!("Unable to redeem ChatGPT subscriber API credits: {e}");
        }
    }
}

/// Refresh the identity token if it has expired, check eligibility, and call
/// the redemption endpoint.
pub async fn maybe_redeem_credits<S>(
    provider: &IdentityProvider,
    store: &S,
    tokens: TokenTriple,
    now: DateTime<Utc>,
) -> Result<RedeemOutcome, RedeemError>
where
    S: CredentialStore + ?Sized,
{
    let mut id_token = tokens.id_token;
    let mut claims = IdentityClaims::decode(&id_token);

    if claims.is_expired_at(now) {
        eprintln!("Refreshing credentials...");
        id_token = refresh_id_token(provider, store, &tokens.refresh_token).await?;
        claims = IdentityClaims::decode(&id_token);
    }

    if let Err(reason) = check_eligibility(&claims, now) {
        tracing::debug!(?reason, "not eligible for credit redemption");
        return Ok(RedeemOutcome::Skipped(reason));
    }
    let Some(plan) = claims.plan_type.as_deref().and_then(Plan::parse) else {
        return Ok(RedeemOutcome::Skipped(SkipReason::IneligiblePlan(claims.plan_type)));
    };

    let url = provider.endpoints().redeem_url();
    let resp = provider
        .http()
        .post(&url)
        .json(&RedeemRequest { id_token: &id_token })
        .send()
        .await
        .map_err(|source| RedeemError::Redeem(ExchangeError::Http { url: url.clone(), source }))?;
    let body: Value = read_json(&url, resp).await.map_err(RedeemError::Redeem)?;

    let granted = body.get(GRANTED_FIELD).and_then(Value::as_f64).unwrap_or(0.0);
    if granted > 0.0 {
        Ok(RedeemOutcome::Granted(plan))
    } else {
        Ok(RedeemOutcome::NotGranted(body))
    }
}

/// One refresh attempt. Only the identity and refresh tokens are written
/// back; the stored access token stays as it was.
async fn refresh_id_token<S>(
    provider: &IdentityProvider,
    store: &S,
    refresh_token: &str,
) -> Result<String, RedeemError>
where
    S: CredentialStore + ?Sized,
{
    let refreshed = provider.refresh(refresh_token).await.map_err(RedeemError::Refresh)?;
    let (Some(id_token), Some(refresh_token)) = (refreshed.id_token, refreshed.refresh_token)
    else {
        return Err(RedeemError::RefreshIncomplete);
    };
    store.update_tokens(&id_token, &refresh_token).map_err(RedeemError::UpdateAuthFile)?;
    tracing::debug!("stored refreshed id token");
    Ok(id_token)
}

/// Gates other than the plan allow-set.
fn check_eligibility(claims: &IdentityClaims, now: DateTime<Utc>) -> Result<(), SkipReason> {
    if let Some(start) = claims.subscription_started_at() {
        if now - start < Duration::days(MIN_SUBSCRIPTION_DAYS) {
            return Err(SkipReason::SubscriptionTooRecent);
        }
    }
    if claims.needs_setup() {
        return Err(SkipReason::NeedsSetup);
    }
    Ok(())
}

fn report(outcome: &RedeemOutcome) {
    match outcome {
        RedeemOutcome::Skipped(SkipReason::SubscriptionTooRecent) => {
            eprintln!(
                "Sorry, your subscription must be active for more than 7 days to redeem credits."
            );
        }
        RedeemOutcome::Skipped(_) => {
            eprintln!("Only users with Plus or Pro subscriptions can redeem free API credits.");
        }
        RedeemOutcome::Granted(plan) => {
            eprintln!(
                "Thanks for being a ChatGPT {plan} subscriber!\n\
                 If you haven't already redeemed, you should receive {} in API credits.\n\n\
                 Credits: {CREDITS_URL}\nMore info: {HELP_URL}",
                plan.reward()
            );
        }
        RedeemOutcome::NotGranted(body) => {
            let pretty = serde_json::to_string_pretty(body).unwrap_or_else(|_| body.to_string());
            eprintln!(
                "It looks like no credits were granted:\n\n{pretty}\n\n\
                 Credits: {CREDITS_URL}\nMore info: {HELP_URL}"
            );
        }
    }
}

#[cfg(test)]
#[path = "redeem_tests.rs"]
mod tests;
