//! Tool-server addressing: slug normalization and slug-keyed resolution.

use crate::precedence::{CallerIdentity, ResolveError, TieredLookup, resolve_with_precedence};
use crate::store::{Scope, Store, StoreResult, ToolServerConfig};
use async_trait::async_trait;

const MAX_SLUG_LEN: usize = 60;

/// Lowercase, runs of anything but `[a-z0-9]` collapsed to `-`, no leading/trailing `-`,
/// at most 60 characters. May return an empty string.
#[must_use]
pub fn normalize_slug(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;
    for ch in raw.trim().chars() {
        let ch = ch.to_ascii_lowercase();
        if ch.is_ascii_lowercase() || ch.is_ascii_digit() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch);
        } else {
            pending_dash = true;
        }
    }
    out.truncate(MAX_SLUG_LEN);
    while out.ends_with('-') {
        out.pop();
    }
    out
}

struct ServerLookup<'a> {
    store: &'a dyn Store,
    slug: &'a str,
}

#[async_trait]
impl TieredLookup for ServerLookup<'_> {
    type Target = ToolServerConfig;
    type Keyed = ToolServerConfig;

    async fn in_scope(&self, scope: &Scope) -> StoreResult<Option<ToolServerConfig>> {
        self.store.server_in_scope(scope, self.slug).await
    }

    async fn by_key(&self, api_key: &str) -> StoreResult<Option<ToolServerConfig>> {
        self.store.server_by_api_key(api_key).await
    }

    fn accept_keyed(&self, keyed: ToolServerConfig) -> Option<ToolServerConfig> {
        (keyed.spec.slug == self.slug).then_some(keyed)
    }

    async fn public(&self) -> StoreResult<Option<ToolServerConfig>> {
        self.store.public_server(self.slug).await
    }
}

/// Pick the tool server answering `slug` (already normalized) for `identity`.
///
/// # Errors
///
/// Returns the [`ResolveError`] of the tier where resolution stopped.
pub async fn resolve_server(
    store: &dyn Store,
    slug: &str,
    identity: &CallerIdentity,
) -> Result<ToolServerConfig, ResolveError> {
    let lookup = ServerLookup { store, slug };
    resolve_with_precedence(&lookup, identity).await
}
