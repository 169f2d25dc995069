use crate::error::MockError;
use crate::matcher::{PathParams, PathPattern};
use crate::precedence::{CallerIdentity, ResolveError, TieredLookup, resolve_with_precedence};
use crate::store::{RouteDefinition, Scope, Store, StoreResult};
use async_trait::async_trait;
use tracing::warn;

/// Methods a mock route can be registered and called with.
pub const SUPPORTED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRoute {
    pub route: RouteDefinition,
    pub params: PathParams,
}

#[must_use]
pub fn is_supported_method(method: &str) -> bool {
    SUPPORTED_METHODS.contains(&method.to_ascii_uppercase().as_str())
}

/// First route (in the given order) whose method and pattern match.
#[must_use]
pub fn find_matching_route(
    routes: Vec<RouteDefinition>,
    method: &str,
    path: &str,
) -> Option<MatchedRoute> {
    let method = method.to_ascii_uppercase();
    routes.into_iter().find_map(|route| {
        if !route.spec.method.eq_ignore_ascii_case(&method) {
            return None;
        }
        let pattern = match PathPattern::compile(&route.spec.path) {
            Ok(p) => p,
            Err(e) => {
                warn!(route_id = route.id, path = %route.spec.path, error = %e, "skipping route with invalid pattern");
                return None;
            }
        };
        let params = pattern.matches(path)?;
        Some(MatchedRoute { route, params })
    })
}

struct RouteLookup<'a> {
    store: &'a dyn Store,
    method: &'a str,
    path: &'a str,
}

#[async_trait]
impl TieredLookup for RouteLookup<'_> {
    type Target = MatchedRoute;
    type Keyed = RouteDefinition;

    async fn in_scope(&self, scope: &Scope) -> StoreResult<Option<MatchedRoute>> {
        let routes = self.store.list_scoped_routes(scope, self.method).await?;
        Ok(find_matching_route(routes, self.method, self.path))
    }

    async fn by_key(&self, api_key: &str) -> StoreResult<Option<RouteDefinition>> {
        self.store.route_by_api_key(api_key).await
    }

    fn accept_keyed(&self, keyed: RouteDefinition) -> Option<MatchedRoute> {
        find_matching_route(vec![keyed], self.method, self.path)
    }

    async fn public(&self) -> StoreResult<Option<MatchedRoute>> {
        let routes = self.store.list_public_routes(self.method).await?;
        Ok(find_matching_route(routes, self.method, self.path))
    }
}

/// Pick the route that serves `method path` for `identity`.
///
/// # Errors
///
/// - [`MockError::MethodNotAllowed`] for methods outside [`SUPPORTED_METHODS`]
/// - [`MockError::NotFound`] when a session caller has nothing in scope, or the key's route does
///   not match the request
/// - [`MockError::InvalidCredential`] / [`MockError::MissingCredential`] per the key tiers
pub async fn resolve_route(
    store: &dyn Store,
    method: &str,
    path: &str,
    identity: &CallerIdentity,
) -> Result<MatchedRoute, MockError> {
    if !is_supported_method(method) {
        return Err(MockError::MethodNotAllowed);
    }
    let method = method.to_ascii_uppercase();
    let lookup = RouteLookup {
        store,
        method: &method,
        path,
    };

    resolve_with_precedence(&lookup, identity)
        .await
        .map_err(|e| match e {
            ResolveError::MissingCredential => MockError::MissingCredential,
            ResolveError::InvalidCredential => MockError::InvalidCredential,
            ResolveError::NotFound => MockError::NotFound("Route not found".to_string()),
            ResolveError::KeyMismatch => {
                MockError::NotFound("API key does not match this route".to_string())
            }
            ResolveError::Store(e) => e.into(),
        })
}
