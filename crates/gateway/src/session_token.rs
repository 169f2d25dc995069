//! Signed session tokens carrying the caller's tenant + project.
//!
//! A token is `mbxs1.<claims>.<signature>`, both parts base64url without padding. The
//! HMAC-SHA256 signature covers `mbxs1.<claims>`. Claims are `{tenantId, projectId, iat, exp}`
//! with unix-second timestamps; a session always expires.

use crate::store::Scope;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac as _};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

const TOKEN_PREFIX: &str = "mbxs1";
/// Allowed drift between the issuing clock and ours for `iat`.
const CLOCK_SKEW_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session secret must not be empty")]
    EmptySecret,
    #[error("malformed session token")]
    Malformed,
    #[error("unsupported session token version: {0}")]
    UnsupportedVersion(String),
    #[error("session token signature mismatch")]
    BadSignature,
    #[error("session token expired")]
    Expired,
    #[error("session token is not valid yet")]
    NotYetValid,
    #[error("session names no tenant/project")]
    MissingScope,
    #[error("session lifetime must be positive")]
    EmptyLifetime,
    #[error("system clock is before UNIX_EPOCH")]
    Clock,
    #[error("session claims: {0}")]
    Claims(#[from] serde_json::Error),
}

/// What a session asserts: the caller acts inside `scope` until `expires_at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionClaims {
    #[serde(flatten)]
    pub scope: Scope,
    #[serde(rename = "iat")]
    pub issued_at: u64,
    #[serde(rename = "exp")]
    pub expires_at: u64,
}

impl SessionClaims {
    /// # Errors
    ///
    /// Returns an error if the scope is blank or `ttl` is zero.
    pub fn new(scope: Scope, issued_at: u64, ttl: Duration) -> Result<Self, SessionError> {
        if ttl.is_zero() {
            return Err(SessionError::EmptyLifetime);
        }
        let claims = Self {
            scope,
            issued_at,
            expires_at: issued_at.saturating_add(ttl.as_secs().max(1)),
        };
        claims.check_scope()?;
        Ok(claims)
    }

    fn check_scope(&self) -> Result<(), SessionError> {
        if self.scope.tenant_id.trim().is_empty() || self.scope.project_id.trim().is_empty() {
            return Err(SessionError::MissingScope);
        }
        Ok(())
    }
}

fn unix_now() -> Result<u64, SessionError> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| SessionError::Clock)
}

/// Issues and checks session tokens with one shared secret.
#[derive(Clone)]
pub struct SessionSigner {
    mac: HmacSha256,
}

impl SessionSigner {
    /// # Errors
    ///
    /// Returns [`SessionError::EmptySecret`] for an empty secret.
    pub fn new(secret: &[u8]) -> Result<Self, SessionError> {
        if secret.is_empty() {
            return Err(SessionError::EmptySecret);
        }
        let mac = HmacSha256::new_from_slice(secret).map_err(|_| SessionError::EmptySecret)?;
        Ok(Self { mac })
    }

    /// Token for a session in `scope` starting now and lasting `ttl`.
    ///
    /// # Errors
    ///
    /// Returns an error if the claims are invalid or the clock is unusable.
    pub fn issue(&self, scope: Scope, ttl: Duration) -> Result<String, SessionError> {
        self.sign(&SessionClaims::new(scope, unix_now()?, ttl)?)
    }

    /// # Errors
    ///
    /// Returns an error if the claims name no scope or cannot be serialized.
    pub fn sign(&self, claims: &SessionClaims) -> Result<String, SessionError> {
        claims.check_scope()?;
        let signed = format!("{TOKEN_PREFIX}.{}", URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?));
        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        let sig_b64 = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
        Ok(format!("{signed}.{sig_b64}"))
    }

    /// Check signature, scope and validity window against the current time.
    ///
    /// # Errors
    ///
    /// Returns the first [`SessionError`] the token fails.
    pub fn verify(&self, token: &str) -> Result<SessionClaims, SessionError> {
        self.verify_at(token, unix_now()?)
    }

    fn verify_at(&self, token: &str, now_unix_secs: u64) -> Result<SessionClaims, SessionError> {
        let (signed, sig_b64) = token.rsplit_once('.').ok_or(SessionError::Malformed)?;
        let (prefix, claims_b64) = signed.split_once('.').ok_or(SessionError::Malformed)?;
        if prefix != TOKEN_PREFIX {
            return Err(SessionError::UnsupportedVersion(prefix.to_string()));
        }
        if claims_b64.contains('.') {
            return Err(SessionError::Malformed);
        }

        let sig = URL_SAFE_NO_PAD
            .decode(sig_b64)
            .map_err(|_| SessionError::Malformed)?;
        let mut mac = self.mac.clone();
        mac.update(signed.as_bytes());
        mac.verify_slice(&sig).map_err(|_| SessionError::BadSignature)?;

        let claims_json = URL_SAFE_NO_PAD
            .decode(claims_b64)
            .map_err(|_| SessionError::Malformed)?;
        let claims: SessionClaims = serde_json::from_slice(&claims_json)?;
        claims.check_scope()?;
        if claims.issued_at > now_unix_secs.saturating_add(CLOCK_SKEW_SECS) {
            return Err(SessionError::NotYetValid);
        }
        if claims.expires_at <= now_unix_secs {
            return Err(SessionError::Expired);
        }
        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn signer(secret: &[u8]) -> SessionSigner {
        SessionSigner::new(secret).expect("signer")
    }

    fn claims(issued_at: u64, ttl_secs: u64) -> SessionClaims {
        SessionClaims::new(Scope::new("t1", "p1"), issued_at, Duration::from_secs(ttl_secs))
            .expect("claims")
    }

    #[test]
    fn session_is_valid_inside_its_window_only() {
        let s = signer(b"secret");
        let token = s.sign(&claims(1_000, 200)).expect("sign");
        assert!(token.starts_with("mbxs1."));

        let decoded = s.verify_at(&token, 1_199).expect("verify");
        assert_eq!(decoded.scope, Scope::new("t1", "p1"));
        assert_eq!(decoded.expires_at, 1_200);

        assert!(matches!(s.verify_at(&token, 1_200), Err(SessionError::Expired)));
        assert!(matches!(s.verify_at(&token, 900), Err(SessionError::NotYetValid)));
        assert!(s.verify_at(&token, 1_000 - CLOCK_SKEW_SECS).is_ok());
    }

    #[test]
    fn issued_tokens_verify_now() {
        let s = signer(b"secret");
        let token = s
            .issue(Scope::new("acme", "web"), Duration::from_secs(60))
            .expect("issue");
        assert_eq!(s.verify(&token).expect("verify").scope, Scope::new("acme", "web"));
    }

    #[test]
    fn foreign_or_tampered_tokens_are_rejected() {
        let s = signer(b"secret");
        let token = signer(b"other").sign(&claims(0, u64::MAX)).expect("sign");
        assert!(matches!(s.verify_at(&token, 10), Err(SessionError::BadSignature)));

        let token = s.sign(&claims(0, u64::MAX)).expect("sign");
        let swapped = token.replacen("mbxs1.", "mbxs2.", 1);
        assert!(matches!(
            s.verify_at(&swapped, 10),
            Err(SessionError::UnsupportedVersion(v)) if v == "mbxs2"
        ));
        assert!(matches!(s.verify_at("mbxs1.only-one-part", 10), Err(SessionError::Malformed)));
        assert!(matches!(s.verify_at("mbxs1.a.b.c", 10), Err(SessionError::Malformed)));
    }

    #[test]
    fn claims_need_a_scope_and_a_lifetime() {
        assert!(matches!(
            SessionClaims::new(Scope::new("t1", " "), 0, Duration::from_secs(5)),
            Err(SessionError::MissingScope)
        ));
        assert!(matches!(
            SessionClaims::new(Scope::new("t1", "p1"), 0, Duration::ZERO),
            Err(SessionError::EmptyLifetime)
        ));
        assert!(matches!(SessionSigner::new(b""), Err(SessionError::EmptySecret)));
    }
}
