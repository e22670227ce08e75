// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;
use crate::error::{exit_code, EXIT_ADDRESS_IN_USE, EXIT_FAILURE, EXIT_SUCCESS};
use crate::test_support::{browser_client, MockIssuer};

fn options(issuer: &MockIssuer, home: &std::path::Path) -> ServerOptions {
    ServerOptions {
        issuer: issuer.url(),
        api_base: Some(issuer.url()),
        port: 0,
        open_browser: false,
        force_state: Some("pinned".into()),
        ..ServerOptions::new(home)
    }
}

#[tokio::test]
async fn full_flow_exits_zero() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().start().await?;
    let dir = tempfile::tempdir()?;
    let server = run_login_server(options(&issuer, dir.path())).await?;
    let base = format!("http://127.0.0.1:{}", server.actual_port());
    let client = browser_client()?;

    assert!(server.auth_url().starts_with(&format!("{}/oauth/authorize?", issuer.url())));
    assert!(server.auth_url().ends_with("state=pinned"));

    let resp = client.get(format!("{base}/auth/callback?code=abc&state=pinned")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::FOUND);

    let resp = client.get(format!("{base}/success")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::OK);

    let outcome = tokio::time::timeout(Duration::from_secs(5), server.block_until_done()).await?;
    assert_eq!(exit_code(&outcome), EXIT_SUCCESS);
    assert!(dir.path().join("auth.json").exists());
    Ok(())
}

#[tokio::test]
async fn error_response_is_sent_before_shutdown() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().start().await?;
    let dir = tempfile::tempdir()?;
    let server = run_login_server(options(&issuer, dir.path())).await?;
    let base = format!("http://127.0.0.1:{}", server.actual_port());

    let resp =
        browser_client()?.get(format!("{base}/auth/callback?code=abc&state=evil")).send().await?;
    assert_eq!(resp.status(), reqwest::StatusCode::BAD_REQUEST);
    assert!(resp.text().await?.contains("State parameter mismatch"));

    let outcome = tokio::time::timeout(Duration::from_secs(5), server.block_until_done()).await?;
    assert_eq!(exit_code(&outcome), EXIT_FAILURE);
    assert!(issuer.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn occupied_port_is_reported_distinctly() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().start().await?;
    let dir = tempfile::tempdir()?;
    let blocker = std::net::TcpListener::bind("127.0.0.1:0")?;
    let port = blocker.local_addr()?.port();

    let result = run_login_server(ServerOptions { port, ..options(&issuer, dir.path()) }).await;
    match result {
        Err(e) => {
            assert!(matches!(e, LoginError::PortInUse { port: p } if p == port));
            assert_eq!(e.exit_code(), EXIT_ADDRESS_IN_USE);
        }
        Ok(_) => anyhow::bail!("expected port conflict"),
    }
    assert!(issuer.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn cancel_before_callback_is_interrupted() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().start().await?;
    let dir = tempfile::tempdir()?;
    let server = run_login_server(options(&issuer, dir.path())).await?;

    server.cancel();
    let outcome = tokio::time::timeout(Duration::from_secs(5), server.block_until_done()).await?;
    assert!(matches!(outcome, Err(LoginError::Interrupted)));
    assert_eq!(exit_code(&outcome), EXIT_FAILURE);
    Ok(())
}

#[tokio::test]
async fn cancel_after_persist_keeps_success() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().start().await?;
    let dir = tempfile::tempdir()?;
    let server = run_login_server(options(&issuer, dir.path())).await?;
    let base = format!("http://127.0.0.1:{}", server.actual_port());

    browser_client()?.get(format!("{base}/auth/callback?code=abc&state=pinned")).send().await?;
    server.cancel_handle().cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(5), server.block_until_done()).await?;
    assert!(outcome.is_ok());
    Ok(())
}

#[tokio::test]
async fn cancel_during_token_exchange_fails_promptly() -> anyhow::Result<()> {
    let issuer = MockIssuer::builder().token_delay(Duration::from_secs(10)).start().await?;
    let dir = tempfile::tempdir()?;
    let server = run_login_server(options(&issuer, dir.path())).await?;
    let url = format!("http://127.0.0.1:{}/auth/callback?code=abc&state=pinned", server.actual_port());
    let client = browser_client()?;
    let request = tokio::spawn(async move { client.get(url).send().await });

    tokio::time::timeout(Duration::from_secs(5), async {
        while issuer.calls().is_empty() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    server.cancel();

    let outcome = tokio::time::timeout(Duration::from_secs(2), server.block_until_done()).await?;
    assert!(matches!(outcome, Err(LoginError::Interrupted)), "got: {outcome:?}");
    assert_eq!(exit_code(&outcome), EXIT_FAILURE);
    assert!(!dir.path().join("auth.json").exists());
    assert_eq!(issuer.grant_types(), vec!["authorization_code".to_owned()]);

    let resp = tokio::time::timeout(Duration::from_secs(2), request).await???;
    assert_eq!(resp.status(), reqwest::StatusCode::INTERNAL_SERVER_ERROR);
    Ok(())
}

#[test]
fn default_options_target_production() {
    let opts = ServerOptions::new("/tmp/home");
    assert_eq!(opts.port, DEFAULT_PORT);
    assert_eq!(opts.issuer, "https://auth.openai.com");
    assert_eq!(opts.client_id, "app_EMoamEEZ73f0CkXaXp7hrann");
    assert_eq!(opts.endpoints().api_base, "https://api.openai.com");
    assert!(opts.open_browser);
    assert!(opts.force_state.is_none());
}
