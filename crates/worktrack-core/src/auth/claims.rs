//! Read-side inspection of session credentials.
//!
//! Credentials are JWT-shaped (`header.payload.signature`, base64url). The
//! payload is decoded here purely for expiry bookkeeping and display.
//!
//! # Trust boundary
//!
//! Nothing in this module verifies a signature. Claims decoded on the client
//! are a convenience projection and must never be used to make an
//! authorization decision; the backend verifies every credential it
//! receives. Adding client-side verification would require shipping key
//! material to the client and would not make the client any more trustworthy.

use base64::engine::general_purpose::{URL_SAFE, URL_SAFE_NO_PAD};
use base64::Engine;
use chrono::Utc;
use serde::{Deserialize, Serialize};

/// Seconds before real expiry at which a credential is already treated as
/// expired, so it is not attached to a request that outlives it.
pub const DEFAULT_EXPIRY_SKEW_SECS: i64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialKind {
    Access,
    Refresh,
}

/// Decoded credential payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
    #[serde(alias = "sub")]
    pub subject_id: String,
    pub email: String,
    #[serde(default, alias = "name")]
    pub display_name: Option<String>,
    /// Unix seconds
    #[serde(alias = "iat")]
    pub issued_at: i64,
    /// Unix seconds
    #[serde(alias = "exp")]
    pub expires_at: i64,
    #[serde(default)]
    pub kind: Option<CredentialKind>,
}

impl Claims {
    /// Name for display, falling back to the email address
    pub fn display_name_or_email(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(&self.email)
    }

    /// Whether these claims expire within `skew_seconds` of `now` (Unix seconds)
    pub fn is_expired_at(&self, now: i64, skew_seconds: i64) -> bool {
        self.expires_at <= now.saturating_add(skew_seconds)
    }
}

/// Decode the payload of a credential without verifying it.
///
/// Returns `None` for anything structurally invalid: wrong segment count,
/// bad base64, non-JSON payload, missing or empty `subjectId`/`email`, or
/// non-integer timestamps.
pub fn decode(credential: &str) -> Option<Claims> {
    let mut segments = credential.trim().split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        return None;
    };

    let bytes = URL_SAFE_NO_PAD
        .decode(payload)
        .or_else(|_| URL_SAFE.decode(payload))
        .ok()?;
    let claims: Claims = serde_json::from_slice(&bytes).ok()?;

    if claims.subject_id.trim().is_empty() || claims.email.trim().is_empty() {
        return None;
    }
    Some(claims)
}

/// `true` if the credential cannot be decoded or expires within `skew_seconds`.
pub fn is_expired(credential: &str, skew_seconds: i64) -> bool {
    is_expired_at(credential, skew_seconds, Utc::now().timestamp())
}

/// [`is_expired`] against an explicit clock (Unix seconds).
pub fn is_expired_at(credential: &str, skew_seconds: i64, now: i64) -> bool {
    match decode(credential) {
        Some(claims) => claims.is_expired_at(now, skew_seconds),
        None => true,
    }
}

/// Seconds until the credential expires, never negative.
/// Undecodable credentials report zero.
pub fn time_until_expiry(credential: &str) -> i64 {
    time_until_expiry_at(credential, Utc::now().timestamp())
}

/// [`time_until_expiry`] against an explicit clock (Unix seconds).
pub fn time_until_expiry_at(credential: &str, now: i64) -> i64 {
    decode(credential)
        .map(|claims| claims.expires_at.saturating_sub(now).max(0))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token(payload: serde_json::Value) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let body = URL_SAFE_NO_PAD.encode(payload.to_string());
        format!("{}.{}.sig", header, body)
    }

    fn access_expiring_at(expires_at: i64) -> String {
        token(json!({
            "subjectId": "u-1",
            "email": "ada@example.com",
            "displayName": "Ada",
            "issuedAt": expires_at.saturating_sub(900),
            "expiresAt": expires_at,
            "kind": "access"
        }))
    }

    #[test]
    fn test_decode_valid_credential() {
        let claims = decode(&access_expiring_at(2_000_000_000)).expect("should decode");
        assert_eq!(claims.subject_id, "u-1");
        assert_eq!(claims.email, "ada@example.com");
        assert_eq!(claims.display_name.as_deref(), Some("Ada"));
        assert_eq!(claims.expires_at, 2_000_000_000);
        assert_eq!(claims.kind, Some(CredentialKind::Access));
    }

    #[test]
    fn test_decode_accepts_registered_claim_names() {
        let credential = token(json!({
            "sub": "u-2",
            "email": "bob@example.com",
            "iat": 100,
            "exp": 200
        }));
        let claims = decode(&credential).expect("should decode");
        assert_eq!(claims.subject_id, "u-2");
        assert_eq!(claims.issued_at, 100);
        assert_eq!(claims.kind, None);
        assert_eq!(claims.display_name_or_email(), "bob@example.com");
    }

    #[test]
    fn test_decode_rejects_structural_failures() {
        assert!(decode("").is_none());
        assert!(decode("not-a-token").is_none());
        assert!(decode("a.b").is_none());
        assert!(decode("a.b.c.d").is_none());
        assert!(decode("hdr.%%%.sig").is_none());
        assert!(decode(&format!("hdr.{}.sig", URL_SAFE_NO_PAD.encode("not json"))).is_none());

        // Empty subject
        assert!(decode(&token(json!({
            "subjectId": "", "email": "a@b.c", "issuedAt": 1, "expiresAt": 2
        })))
        .is_none());
        // Missing email
        assert!(decode(&token(json!({
            "subjectId": "u", "issuedAt": 1, "expiresAt": 2
        })))
        .is_none());
        // Non-integer timestamps
        assert!(decode(&token(json!({
            "subjectId": "u", "email": "a@b.c", "issuedAt": 1.5, "expiresAt": 2
        })))
        .is_none());
        assert!(decode(&token(json!({
            "subjectId": "u", "email": "a@b.c", "issuedAt": 1, "expiresAt": "soon"
        })))
        .is_none());
    }

    #[test]
    fn test_expiry_skew() {
        let now = 1_700_000_000;
        assert!(is_expired_at(&access_expiring_at(now + 10), 30, now));
        assert!(!is_expired_at(&access_expiring_at(now + 60), 30, now));
        // Boundary is inclusive
        assert!(is_expired_at(&access_expiring_at(now + 30), 30, now));
        assert!(!is_expired_at(&access_expiring_at(now + 10), 0, now));
    }

    #[test]
    fn test_malformed_credential_is_expired() {
        assert!(is_expired("garbage", DEFAULT_EXPIRY_SKEW_SECS));
        assert_eq!(time_until_expiry("garbage"), 0);
    }

    #[test]
    fn test_time_until_expiry_never_negative() {
        let now = 1_700_000_000;
        assert_eq!(time_until_expiry_at(&access_expiring_at(now + 90), now), 90);
        assert_eq!(time_until_expiry_at(&access_expiring_at(now - 90), now), 0);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let now = 1_700_000_000;
        let long_gone = access_expiring_at(i64::MIN);
        assert!(decode(&long_gone).is_some());
        assert_eq!(time_until_expiry_at(&long_gone, now), 0);
        assert!(is_expired_at(&long_gone, DEFAULT_EXPIRY_SKEW_SECS, now));

        let far_future = access_expiring_at(i64::MAX);
        assert!(!is_expired_at(&far_future, 0, now));
        assert!(is_expired_at(&far_future, i64::MAX, now));
        assert_eq!(time_until_expiry_at(&far_future, now), i64::MAX - now);
    }
}
