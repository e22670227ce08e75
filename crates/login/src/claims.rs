// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Unverified claim extraction from JWT-shaped tokens.
//!
//! Signatures are never checked. Claims only steer flow-control decisions
//! (setup routing, refresh, credit eligibility), so an undecodable payload
//! yields empty claims rather than an error. Only the organization and
//! project ids are required, via [`IdentityClaims::require_ids`].

use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde_json::{Map, Value};

use crate::error::ProtocolError;

/// Claim namespace carrying account and organization details.
pub const AUTH_CLAIM_NAMESPACE: &str = "https://api.openai.com/auth";

/// Typed view over the claims this tool cares about. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityClaims {
    /// `exp`, unix seconds.
    pub expiry: Option<i64>,
    pub organization_id: Option<String>,
    pub project_id: Option<String>,
    pub onboarding_complete: Option<bool>,
    pub is_org_owner: Option<bool>,
    /// Raw `chatgpt_subscription_active_start` value.
    pub subscription_active_start: Option<String>,
    pub plan_type: Option<String>,
}

/// Organization and project ids required to finish a login.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequiredIds {
    pub org_id: String,
    pub project_id: String,
}

impl IdentityClaims {
    /// Decode the payload segment of `token`. Never fails.
    pub fn decode(token: &str) -> Self {
        decode_payload(token).map(|payload| Self::from_payload(&payload)).unwrap_or_default()
    }

    /// Pull typed fields out of a decoded payload, ignoring mistyped ones.
    pub fn from_payload(payload: &Map<String, Value>) -> Self {
        let auth = payload.get(AUTH_CLAIM_NAMESPACE).and_then(Value::as_object);
        let string = |key: &str| {
            auth.and_then(|a| a.get(key))
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        let flag = |key: &str| auth.and_then(|a| a.get(key)).and_then(Value::as_bool);

        Self {
            expiry: payload.get("exp").and_then(Value::as_i64),
            organization_id: string("organization_id"),
            project_id: string("project_id"),
            onboarding_complete: flag("completed_platform_onboarding"),
            is_org_owner: flag("is_org_owner"),
            subscription_active_start: string("chatgpt_subscription_active_start"),
            plan_type: string("chatgpt_plan_type"),
        }
    }

    /// Organization and project ids, or the protocol error naming the gap.
    pub fn require_ids(&self) -> Result<RequiredIds, ProtocolError> {
        let org_id =
            self.organization_id.clone().ok_or(ProtocolError::MissingClaim("organization"))?;
        let project_id = self.project_id.clone().ok_or(ProtocolError::MissingClaim("project"))?;
        Ok(RequiredIds { org_id, project_id })
    }

    /// An org owner who has not finished platform onboarding must be routed
    /// to account setup.
    pub fn needs_setup(&self) -> bool {
        !self.onboarding_complete.unwrap_or(false) && self.is_org_owner.unwrap_or(false)
    }

    /// True only when `exp` is present and not in the future of `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiry.is_some_and(|exp| now.timestamp() >= exp)
    }

    /// Parsed subscription start. Malformed values count as absent.
    pub fn subscription_started_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.subscription_active_start.as_deref()?;
        if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
            return Some(ts.with_timezone(&Utc));
        }
        NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), "%Y-%m-%dT%H:%M:%S%.f")
            .ok()
            .map(|naive| naive.and_utc())
    }
}

/// True when `token` has exactly three dot-separated segments.
pub fn is_three_segment(token: &str) -> bool {
    token.split('.').count() == 3
}

/// Decode the middle segment of a JWT as a JSON object.
pub fn decode_payload(token: &str) -> Option<Map<String, Value>> {
    let mut parts = token.split('.');
    let (Some(_), Some(payload), Some(_), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return None;
    };
    decode_segment(payload)
}

/// base64url-decode a segment (restoring padding) and parse it as an object.
pub fn decode_segment(segment: &str) -> Option<Map<String, Value>> {
    let mut padded = segment.to_owned();
    while padded.len() % 4 != 0 {
        padded.push('=');
    }
    let bytes = URL_SAFE.decode(padded.as_bytes()).ok()?;
    match serde_json::from_slice::<Value>(&bytes).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

#[cfg(test)]
#[path = "claims_tests.rs"]
mod tests;
