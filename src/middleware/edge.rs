// Edge validator: the single authenticated ingress
// Explicit pipeline per request: Extract -> VerifySig -> CheckRevocation ->
// Decorate -> Forward, each step with a typed rejection. Public paths are
// matched with ant-style globs before any credential work happens.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderValue, Request},
    middleware::Next,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::extract::extract_access_token;
use crate::models::AccessTokenClaims;
use crate::services::jwks_cache::VerifyError;
use crate::services::token::TokenError;
use crate::utils::auth_errors::AuthError;

/// Advisory headers stamped onto the forwarded request. Trust kernels must
/// never use them for authorization; they exist for logging and tenant
/// context stamping downstream.
pub const USER_ID_HEADER: &str = "x-user-id";
pub const TENANT_ID_HEADER: &str = "x-tenant-id";
pub const ROLES_HEADER: &str = "x-roles";

/// Typed rejection for each pipeline stage
#[derive(Debug)]
pub enum EdgeRejection {
    /// Extract: no credential in header or cookie
    MissingCredential,
    /// VerifySig: malformed, bad signature, unknown kid or expired
    Invalid(TokenError),
    /// CheckRevocation: token blacklisted or issued before the user epoch
    Revoked,
    /// Trust infrastructure unreachable under fail-closed policy
    Upstream,
}

impl IntoResponse for EdgeRejection {
    fn into_response(self) -> Response {
        match self {
            EdgeRejection::MissingCredential
            | EdgeRejection::Invalid(_)
            | EdgeRejection::Revoked => AuthError::Unauthorized.into_response(),
            EdgeRejection::Upstream => AuthError::UpstreamUnavailable.into_response(),
        }
    }
}

/// Decoration computed from the verified claims
pub struct Decoration {
    pub token: String,
    pub user_id: String,
    pub tenant_id: String,
    pub roles: String,
}

impl Decoration {
    pub fn from_claims(token: String, claims: &AccessTokenClaims) -> Self {
        Self {
            token,
            user_id: claims.sub.clone(),
            tenant_id: claims.tenant_id.clone(),
            roles: claims.roles.join(","),
        }
    }

    /// Mutate the outbound request: the original token is forwarded
    /// verbatim as the Authorization header (it may have arrived in a
    /// cookie) plus the advisory identity headers.
    pub fn apply(&self, request: &mut Request<Body>) {
        let headers = request.headers_mut();

        if let Ok(value) = HeaderValue::from_str(&format!("Bearer {}", self.token)) {
            headers.insert(header::AUTHORIZATION, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.user_id) {
            headers.insert(USER_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.tenant_id) {
            headers.insert(TENANT_ID_HEADER, value);
        }
        if let Ok(value) = HeaderValue::from_str(&self.roles) {
            headers.insert(ROLES_HEADER, value);
        }
    }
}

/// The inbound gateway filter. Runs with highest precedence after CORS;
/// preflight never reaches it with a credential requirement.
pub async fn edge_validator(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    if state.public_paths.matches(&path) {
        debug!(path = %path, "Public path, skipping edge validation");
        return next.run(request).await;
    }

    match validate(&state, request.headers()).await {
        Ok((decoration, _claims)) => {
            decoration.apply(&mut request);
            next.run(request).await
        },
        Err(rejection) => {
            debug!(path = %path, rejection = ?rejection, "Edge validation rejected request");
            rejection.into_response()
        },
    }
}

/// Extract -> VerifySig -> CheckRevocation -> Decorate. Returns the
/// decoration together with the verified claims so the trust kernel can
/// derive the principal without a second verification pass.
pub async fn validate(
    state: &AppState,
    headers: &axum::http::HeaderMap,
) -> Result<(Decoration, AccessTokenClaims), EdgeRejection> {
    // Extract
    let token = extract_access_token(headers).ok_or(EdgeRejection::MissingCredential)?;

    // VerifySig - against the cached key set, with the UnknownKid
    // refresh-and-retry handled inside the cache
    let now = Utc::now().timestamp() as u64;
    let claims = state.jwks_cache.verify(&token, now).await.map_err(|e| match e {
        VerifyError::Token(t) => EdgeRejection::Invalid(t),
        VerifyError::Upstream(_) => EdgeRejection::Upstream,
    })?;

    // CheckRevocation - jti blacklist plus per-user revocation epoch.
    // Fail-open policy is applied inside the index; an error here means
    // the policy is closed.
    let user_id = Uuid::parse_str(&claims.sub)
        .map_err(|_| EdgeRejection::Invalid(TokenError::Malformed))?;
    match state
        .revocation
        .is_token_revoked(&claims.jti, user_id, claims.iat)
        .await
    {
        Ok(false) => {},
        Ok(true) => return Err(EdgeRejection::Revoked),
        Err(_) => return Err(EdgeRejection::Upstream),
    }

    // Decorate
    let decoration = Decoration::from_claims(token, &claims);
    Ok((decoration, claims))
}
