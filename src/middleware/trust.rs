// Service trust kernel
// Every backend re-validates the credential independently of the gateway:
// a compromised ingress or a direct hit on a service must still fail. The
// principal is always derived from verified token claims, never from the
// advisory X-* headers.

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{request::Parts, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::edge::validate;
use crate::models::{AccessTokenClaims, Role};
use crate::utils::auth_errors::AuthError;

/// The authenticated identity extracted from verified claims
#[derive(Debug, Clone, Serialize)]
pub struct Principal {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<Role>,
}

impl Principal {
    pub fn from_claims(claims: &AccessTokenClaims) -> Option<Self> {
        let user_id = Uuid::parse_str(&claims.sub).ok()?;
        let tenant_id = Uuid::parse_str(&claims.tenant_id).ok()?;
        let roles = claims
            .roles
            .iter()
            .filter_map(|r| r.parse::<Role>().ok())
            .collect::<Vec<_>>();
        if roles.is_empty() {
            return None;
        }
        Some(Self {
            user_id,
            tenant_id,
            roles,
        })
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(&role)
    }

    fn is_tenant_operator(&self) -> bool {
        self.roles.iter().any(|r| r.is_tenant_operator())
    }
}

/// Wall-clock budget a handler gets before downstream calls should give up
const REQUEST_BUDGET: Duration = Duration::from_secs(30);

/// Explicit per-request context threaded to handlers instead of ambient
/// storage. The trace id is taken from X-Request-Id when present.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub principal: Principal,
    pub deadline: Option<Instant>,
    pub trace_id: String,
}

/// Authorization decision for a resource access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Allow,
    Forbidden,
    /// Cross-tenant access is indistinguishable from a missing resource
    NotFound,
}

/// Identity of the resource being operated on
#[derive(Debug, Clone, Copy)]
pub struct ResourceRef {
    pub owner_id: Uuid,
    pub tenant_id: Uuid,
}

/// Layered authorization, invoked at handler entry. Tenant isolation is
/// absolute and checked before any role logic; within the tenant,
/// ADMIN/STAFF operate on anything, everyone else only on what they own.
pub fn authorize(principal: &Principal, resource: &ResourceRef) -> Access {
    if principal.tenant_id != resource.tenant_id {
        return Access::NotFound;
    }
    if principal.is_tenant_operator() {
        return Access::Allow;
    }
    if principal.user_id == resource.owner_id {
        Access::Allow
    } else {
        Access::Forbidden
    }
}

impl Access {
    /// Map the decision to the request-facing error kinds
    pub fn check(self) -> Result<(), AuthError> {
        match self {
            Access::Allow => Ok(()),
            Access::Forbidden => Err(AuthError::Forbidden),
            Access::NotFound => Err(AuthError::NotFound),
        }
    }
}

/// The per-service filter. Replicates the edge pipeline against the same
/// published key set and revocation index, then yields the principal into
/// request extensions for handlers to extract.
pub async fn trust_kernel(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    // Re-derive everything from the verified token, never the X-* headers
    let (_decoration, claims) = match validate(&state, request.headers()).await {
        Ok(validated) => validated,
        Err(rejection) => return rejection.into_response(),
    };

    let principal = match Principal::from_claims(&claims) {
        Some(p) => p,
        None => return AuthError::Unauthorized.into_response(),
    };

    let trace_id = request
        .headers()
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(String::from)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    let context = RequestContext {
        principal: principal.clone(),
        deadline: Some(Instant::now() + REQUEST_BUDGET),
        trace_id,
    };

    request.extensions_mut().insert(principal);
    request.extensions_mut().insert(context);

    next.run(request).await
}

/// Extractor for the authenticated principal from request extensions
impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}

impl<S> FromRequestParts<S> for RequestContext
where
    S: Send + Sync,
{
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestContext>()
            .cloned()
            .ok_or(AuthError::Unauthorized)
    }
}
