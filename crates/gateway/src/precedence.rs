//! Three-tier target resolution shared by mock routes and tool servers.
//!
//! 1. A target in the caller's own scope.
//! 2. An authenticated caller that supplied no key stops here.
//! 3. The target bound to the caller-supplied API key, which must also fit the request.
//! 4. A public target (no key required).
//!
//! The first tier that yields a target wins.

use crate::store::{Scope, StoreError, StoreResult};
use async_trait::async_trait;
use thiserror::Error;

/// Who is calling: the session scope (if any) and the supplied API key (if any).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerIdentity {
    pub scope: Option<Scope>,
    pub api_key: Option<String>,
}

impl CallerIdentity {
    #[must_use]
    pub fn anonymous() -> Self {
        Self::default()
    }
}

#[derive(Debug, Error)]
pub enum ResolveError {
    /// Anonymous caller, no key, and no public target.
    #[error("Missing API key")]
    MissingCredential,
    /// The supplied key does not belong to any enabled target.
    #[error("Invalid API key")]
    InvalidCredential,
    /// Authenticated caller without a key and nothing in scope.
    #[error("not found")]
    NotFound,
    /// The key's target exists but does not fit this request.
    #[error("key target does not match")]
    KeyMismatch,
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Per-kind lookups plugged into [`resolve_with_precedence`].
#[async_trait]
pub trait TieredLookup: Send + Sync {
    type Target: Send;
    /// What the key lookup returns before it is checked against the request.
    type Keyed: Send;

    async fn in_scope(&self, scope: &Scope) -> StoreResult<Option<Self::Target>>;
    async fn by_key(&self, api_key: &str) -> StoreResult<Option<Self::Keyed>>;
    /// Accept the key's target if it fits this request.
    fn accept_keyed(&self, keyed: Self::Keyed) -> Option<Self::Target>;
    async fn public(&self) -> StoreResult<Option<Self::Target>>;
}

/// Resolve a target for `identity`.
///
/// # Errors
///
/// Returns the [`ResolveError`] of the tier where resolution stopped, or a store error.
pub async fn resolve_with_precedence<L>(
    lookup: &L,
    identity: &CallerIdentity,
) -> Result<L::Target, ResolveError>
where
    L: TieredLookup + ?Sized,
{
    let api_key = identity
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty());

    if let Some(scope) = &identity.scope {
        if let Some(target) = lookup.in_scope(scope).await? {
            return Ok(target);
        }
        if api_key.is_none() {
            return Err(ResolveError::NotFound);
        }
    }

    if let Some(key) = api_key {
        let keyed = lookup
            .by_key(key)
            .await?
            .ok_or(ResolveError::InvalidCredential)?;
        return lookup.accept_keyed(keyed).ok_or(ResolveError::KeyMismatch);
    }

    lookup
        .public()
        .await?
        .ok_or(ResolveError::MissingCredential)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct FakeLookup {
        scoped: Option<&'static str>,
        keyed: Option<(&'static str, bool)>,
        public: Option<&'static str>,
    }

    #[async_trait]
    impl TieredLookup for FakeLookup {
        type Target = &'static str;
        type Keyed = (&'static str, bool);

        async fn in_scope(&self, _scope: &Scope) -> StoreResult<Option<Self::Target>> {
            Ok(self.scoped)
        }

        async fn by_key(&self, api_key: &str) -> StoreResult<Option<Self::Keyed>> {
            Ok(self.keyed.filter(|_| api_key == "k1"))
        }

        fn accept_keyed(&self, keyed: Self::Keyed) -> Option<Self::Target> {
            let (target, fits) = keyed;
            fits.then_some(target)
        }

        async fn public(&self) -> StoreResult<Option<Self::Target>> {
            Ok(self.public)
        }
    }

    fn session() -> Option<Scope> {
        Some(Scope::new("t1", "p1"))
    }

    fn key(k: &str) -> Option<String> {
        Some(k.to_string())
    }

    #[tokio::test]
    async fn scope_match_wins_over_key_and_public() {
        let lookup = FakeLookup {
            scoped: Some("scoped"),
            keyed: Some(("keyed", true)),
            public: Some("public"),
        };
        let identity = CallerIdentity {
            scope: session(),
            api_key: key("k1"),
        };
        assert_eq!(
            resolve_with_precedence(&lookup, &identity).await.ok(),
            Some("scoped")
        );
    }

    #[tokio::test]
    async fn authenticated_caller_without_key_never_reaches_public() {
        let lookup = FakeLookup {
            public: Some("public"),
            ..FakeLookup::default()
        };
        let identity = CallerIdentity {
            scope: session(),
            api_key: None,
        };
        assert!(matches!(
            resolve_with_precedence(&lookup, &identity).await,
            Err(ResolveError::NotFound)
        ));
    }

    #[tokio::test]
    async fn authenticated_caller_falls_through_to_key() {
        let lookup = FakeLookup {
            keyed: Some(("keyed", true)),
            ..FakeLookup::default()
        };
        let identity = CallerIdentity {
            scope: session(),
            api_key: key("k1"),
        };
        assert_eq!(
            resolve_with_precedence(&lookup, &identity).await.ok(),
            Some("keyed")
        );
    }

    #[tokio::test]
    async fn key_errors_distinguish_unknown_and_mismatch() {
        let lookup = FakeLookup {
            keyed: Some(("keyed", false)),
            public: Some("public"),
            ..FakeLookup::default()
        };

        let unknown = CallerIdentity {
            scope: None,
            api_key: key("nope"),
        };
        assert!(matches!(
            resolve_with_precedence(&lookup, &unknown).await,
            Err(ResolveError::InvalidCredential)
        ));

        let mismatched = CallerIdentity {
            scope: None,
            api_key: key("k1"),
        };
        assert!(matches!(
            resolve_with_precedence(&lookup, &mismatched).await,
            Err(ResolveError::KeyMismatch)
        ));
    }

    #[tokio::test]
    async fn anonymous_caller_uses_public_or_needs_a_key() {
        let open = FakeLookup {
            public: Some("public"),
            ..FakeLookup::default()
        };
        assert_eq!(
            resolve_with_precedence(&open, &CallerIdentity::anonymous())
                .await
                .ok(),
            Some("public")
        );

        let closed = FakeLookup::default();
        assert!(matches!(
            resolve_with_precedence(&closed, &CallerIdentity::anonymous()).await,
            Err(ResolveError::MissingCredential)
        ));
    }

    #[tokio::test]
    async fn blank_key_counts_as_absent() {
        let lookup = FakeLookup {
            public: Some("public"),
            ..FakeLookup::default()
        };
        let identity = CallerIdentity {
            scope: None,
            api_key: key("   "),
        };
        assert_eq!(
            resolve_with_precedence(&lookup, &identity).await.ok(),
            Some("public")
        );
    }
}
