// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

#[test]
fn code_verifier_is_valid_length() -> anyhow::Result<()> {
    let v = generate_code_verifier();
    assert!(v.len() >= 43 && v.len() <= 128, "verifier length {} out of range", v.len());
    Ok(())
}

#[test]
fn code_challenge_is_deterministic() -> anyhow::Result<()> {
    let verifier = "test-verifier-string";
    let c1 = compute_code_challenge(verifier);
    let c2 = compute_code_challenge(verifier);
    assert_eq!(c1, c2);
    assert_eq!(c1.len(), 43);
    Ok(())
}

#[test]
fn code_challenge_matches_rfc7636_vector() {
    // Appendix B of RFC 7636.
    let challenge = compute_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
    assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
}

#[test]
fn state_is_unique_hex() -> anyhow::Result<()> {
    let s1 = generate_state();
    let s2 = generate_state();
    assert_ne!(s1, s2);
    assert_eq!(s1.len(), 64);
    assert!(s1.chars().all(|c| c.is_ascii_hexdigit()));
    Ok(())
}

#[test]
fn debug_redacts_verifier() {
    let pkce = PkcePair::generate();
    let printed = format!("{pkce:?}");
    assert!(!printed.contains(&pkce.verifier));
    assert!(printed.contains(&pkce.challenge));
}

proptest! {
    #[test]
    fn generated_pairs_are_consistent(_seed in 0u8..32) {
        let pkce = PkcePair::generate();
        prop_assert_eq!(&pkce.challenge, &compute_code_challenge(&pkce.verifier));
        prop_assert_ne!(&pkce.challenge, &pkce.verifier);
    }
}

#[test]
fn authorize_url_param_order() -> anyhow::Result<()> {
    let pkce = PkcePair { verifier: "v".into(), challenge: "challenge-abc".into() };
    let url = build_authorize_url(
        "https://auth.example.com/",
        "client-123",
        "http://localhost:1455/auth/callback",
        &pkce,
        "state-xyz",
    );
    assert!(url.starts_with("https://auth.example.com/oauth/authorize?response_type=code&"));

    let q = url.split('?').nth(1).unwrap_or_default();
    let keys: Vec<&str> = q.split('&').filter_map(|p| p.split('=').next()).collect();
    assert_eq!(
        keys,
        [
            "response_type",
            "client_id",
            "redirect_uri",
            "scope",
            "code_challenge",
            "code_challenge_method",
            "id_token_add_organizations",
            "state"
        ],
    );
    assert!(url.contains("redirect_uri=http%3A%2F%2Flocalhost%3A1455%2Fauth%2Fcallback"));
    assert!(url.contains("scope=openid+profile+email+offline_access"));
    assert!(url.contains("code_challenge=challenge-abc"));
    assert!(url.contains("state=state-xyz"));
    Ok(())
}

#[test]
fn authorize_url_never_carries_verifier() {
    let pkce = PkcePair::generate();
    let url = build_authorize_url("https://auth.example.com", "c", "http://localhost/cb", &pkce, "s");
    assert!(!url.contains(&pkce.verifier));
}
