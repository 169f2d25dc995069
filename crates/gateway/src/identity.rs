//! Caller identity from request headers.

use crate::precedence::CallerIdentity;
use crate::session_token::SessionSigner;
use axum::http::HeaderMap;
use axum::http::header::{AUTHORIZATION, COOKIE};

pub const API_KEY_HEADER: &str = "x-api-key";
pub const SESSION_COOKIE: &str = "mbx_session";

/// The `x-api-key` header, trimmed; blank counts as absent.
#[must_use]
pub fn read_api_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?.trim();
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

fn session_cookie(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim())
        .filter(|v| !v.is_empty())
}

/// Session scope (when a valid session token is presented) plus the supplied API key.
///
/// Without a signer every caller is unauthenticated. An invalid token is the same as no token.
#[must_use]
pub fn caller_identity(headers: &HeaderMap, sessions: Option<&SessionSigner>) -> CallerIdentity {
    let scope = sessions.and_then(|signer| {
        let token = bearer_token(headers).or_else(|| session_cookie(headers))?;
        match signer.verify(token) {
            Ok(claims) => Some(claims.scope),
            Err(e) => {
                tracing::debug!(error = %e, "ignoring invalid session token");
                None
            }
        }
    });
    CallerIdentity {
        scope,
        api_key: read_api_key(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Scope;
    use std::time::Duration;

    fn signer() -> SessionSigner {
        SessionSigner::new(b"s3cret").expect("signer")
    }

    fn token() -> String {
        signer()
            .issue(Scope::new("t1", "p1"), Duration::from_secs(3600))
            .expect("issue")
    }

    #[test]
    fn api_key_is_trimmed_and_blank_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, " k1 ".parse().expect("header"));
        assert_eq!(read_api_key(&headers).as_deref(), Some("k1"));

        headers.insert(API_KEY_HEADER, "   ".parse().expect("header"));
        assert_eq!(read_api_key(&headers), None);
    }

    #[test]
    fn session_from_bearer_or_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", token()).parse().expect("header"));
        let id = caller_identity(&headers, Some(&signer()));
        assert_eq!(id.scope, Some(Scope::new("t1", "p1")));

        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            format!("theme=dark; {SESSION_COOKIE}={}", token()).parse().expect("header"),
        );
        let id = caller_identity(&headers, Some(&signer()));
        assert_eq!(id.scope, Some(Scope::new("t1", "p1")));

        assert_eq!(caller_identity(&headers, None).scope, None);
    }

    #[test]
    fn invalid_session_means_anonymous() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, "Bearer mbxs1.bogus.sig".parse().expect("header"));
        headers.insert(API_KEY_HEADER, "k1".parse().expect("header"));
        let id = caller_identity(&headers, Some(&signer()));
        assert_eq!(id.scope, None);
        assert_eq!(id.api_key.as_deref(), Some("k1"));
    }
}
