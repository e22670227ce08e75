// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde_json::json;

use super::*;
use crate::oauth::Endpoints;
use crate::persist::{AuthFile, CredentialBundle};
use crate::test_support::{default_id_claims, make_jwt, with_auth_claim, MockIssuer};

struct Fixture {
    issuer: MockIssuer,
    provider: IdentityProvider,
    store: AuthFile,
    tokens: TokenTriple,
    _dir: tempfile::TempDir,
}

async fn fixture(issuer: MockIssuer, id_claims: Value) -> anyhow::Result<Fixture> {
    let endpoints = Endpoints::for_issuer(&issuer.url()).with_api_base(issuer.url());
    let provider = IdentityProvider::new(endpoints, "test-client")?;
    let dir = tempfile::tempdir()?;
    let store = AuthFile::new(dir.path());
    let tokens = TokenTriple {
        id_token: make_jwt(&id_claims),
        access_token: "h.access.s".into(),
        refresh_token: "refresh-123".into(),
    };
    store.save_bundle(&CredentialBundle {
        api_key: "sk-test".into(),
        tokens: tokens.clone(),
        last_refresh: Utc::now(),
    })?;
    Ok(Fixture { issuer, provider, store, tokens, _dir: dir })
}

impl Fixture {
    async fn redeem(&self) -> Result<RedeemOutcome, RedeemError> {
        maybe_redeem_credits(&self.provider, &self.store, self.tokens.clone(), Utc::now()).await
    }
}

fn expired(claims: Value) -> Value {
    let mut claims = claims;
    claims["exp"] = json!((Utc::now() - Duration::minutes(5)).timestamp());
    claims
}

#[tokio::test]
async fn eligible_pro_subscriber_is_granted() -> anyhow::Result<()> {
    let f = fixture(MockIssuer::builder().start().await?, default_id_claims()).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::Granted(Plan::Pro));
    assert_eq!(f.issuer.redeem_calls(), 1);
    assert!(f.issuer.grant_types().is_empty());

    let calls = f.issuer.calls();
    let body: Value = serde_json::from_str(&calls[0].body)?;
    assert_eq!(body["id_token"], f.tokens.id_token.as_str());
    Ok(())
}

#[tokio::test]
async fn unexpired_token_leaves_file_untouched() -> anyhow::Result<()> {
    let f = fixture(MockIssuer::builder().start().await?, default_id_claims()).await?;
    let before = std::fs::read_to_string(f.store.path())?;

    f.redeem().await?;

    assert_eq!(std::fs::read_to_string(f.store.path())?, before);
    Ok(())
}

#[tokio::test]
async fn recent_subscription_is_skipped() -> anyhow::Result<()> {
    let claims = with_auth_claim(
        default_id_claims(),
        "chatgpt_subscription_active_start",
        json!((Utc::now() - Duration::days(3)).to_rfc3339()),
    );
    let f = fixture(MockIssuer::builder().start().await?, claims).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::Skipped(SkipReason::SubscriptionTooRecent));
    assert_eq!(f.issuer.redeem_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn malformed_subscription_start_is_ignored() -> anyhow::Result<()> {
    let claims =
        with_auth_claim(default_id_claims(), "chatgpt_subscription_active_start", json!("soon"));
    let f = fixture(MockIssuer::builder().start().await?, claims).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::Granted(Plan::Pro));
    Ok(())
}

#[tokio::test]
async fn owner_needing_setup_is_skipped() -> anyhow::Result<()> {
    let claims = with_auth_claim(default_id_claims(), "completed_platform_onboarding", json!(false));
    let claims = with_auth_claim(claims, "is_org_owner", json!(true));
    let f = fixture(MockIssuer::builder().start().await?, claims).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::Skipped(SkipReason::NeedsSetup));
    assert_eq!(f.issuer.redeem_calls(), 0);
    Ok(())
}

async fn assert_ineligible_plan(plan: Option<&str>) -> anyhow::Result<()> {
    let claims = with_auth_claim(default_id_claims(), "chatgpt_plan_type", json!(plan));
    let f = fixture(MockIssuer::builder().start().await?, claims).await?;

    assert_eq!(
        f.redeem().await?,
        RedeemOutcome::Skipped(SkipReason::IneligiblePlan(plan.map(str::to_owned)))
    );
    assert_eq!(f.issuer.redeem_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn free_plan_is_skipped() -> anyhow::Result<()> {
    assert_ineligible_plan(Some("free")).await
}

#[tokio::test]
async fn team_plan_is_skipped() -> anyhow::Result<()> {
    assert_ineligible_plan(Some("team")).await
}

#[tokio::test]
async fn absent_plan_is_skipped() -> anyhow::Result<()> {
    assert_ineligible_plan(None).await
}

#[tokio::test]
async fn zero_grant_returns_raw_response() -> anyhow::Result<()> {
    let response = json!({ "granted_chatgpt_subscriber_api_credits": 0, "reason": "already" });
    let issuer = MockIssuer::builder().redeem_response(response.clone()).start().await?;
    let f = fixture(issuer, default_id_claims()).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::NotGranted(response));
    Ok(())
}

#[tokio::test]
async fn expired_token_is_refreshed_before_redeeming() -> anyhow::Result<()> {
    let refreshed = with_auth_claim(default_id_claims(), "chatgpt_plan_type", json!("plus"));
    let issuer = MockIssuer::builder().refreshed_id_claims(refreshed.clone()).start().await?;
    let f = fixture(issuer, expired(default_id_claims())).await?;

    assert_eq!(f.redeem().await?, RedeemOutcome::Granted(Plan::Plus));
    assert_eq!(f.issuer.grant_types(), vec!["refresh_token".to_owned()]);

    let doc = f.store.load()?;
    let tokens = doc.tokens.ok_or_else(|| anyhow::anyhow!("tokens missing"))?;
    let refreshed_id = make_jwt(&refreshed);
    assert_eq!(tokens.id_token, refreshed_id);
    assert_eq!(tokens.refresh_token, "refresh-456");
    assert_eq!(tokens.access_token, "h.access.s");

    let redeem = f
        .issuer
        .calls()
        .into_iter()
        .find(|c| c.path == "/v1/billing/redeem_credits")
        .ok_or_else(|| anyhow::anyhow!("no redeem call"))?;
    let body: Value = serde_json::from_str(&redeem.body)?;
    assert_eq!(body["id_token"], refreshed_id.as_str());
    Ok(())
}

#[tokio::test]
async fn failed_refresh_aborts_without_touching_file() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().refresh_status(500).start().await?;
    let f = fixture(issuer, expired(default_id_claims())).await?;
    let before = std::fs::read_to_string(f.store.path())?;

    crate::assert_err_contains!(f.redeem().await, "unable to refresh id token");
    assert_eq!(f.issuer.redeem_calls(), 0);
    assert_eq!(std::fs::read_to_string(f.store.path())?, before);
    Ok(())
}

#[tokio::test]
async fn missing_auth_file_aborts_refresh() -> anyhow::Result<()> {
    let f = fixture(MockIssuer::builder().start().await?, expired(default_id_claims())).await?;
    f.store.remove()?;

    let result = f.redeem().await;
    assert!(matches!(result, Err(RedeemError::UpdateAuthFile(_))));
    assert_eq!(f.issuer.redeem_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn best_effort_wrapper_swallows_errors() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().refresh_status(500).start().await?;
    let f = fixture(issuer, expired(default_id_claims())).await?;

    redeem_best_effort(&f.provider, &f.store, f.tokens.clone()).await;
    assert_eq!(f.issuer.redeem_calls(), 0);
    Ok(())
}

#[yare::parameterized(
    plus = { "plus", Some(Plan::Plus), "$5" },
    pro = { "pro", Some(Plan::Pro), "$50" },
)]
fn plan_rewards(raw: &str, plan: Option<Plan>, reward: &str) {
    assert_eq!(Plan::parse(raw), plan);
    assert_eq!(plan.map(Plan::reward), Some(reward));
}

#[test]
fn unknown_plan_does_not_parse() {
    assert_eq!(Plan::parse("enterprise"), None);
}
