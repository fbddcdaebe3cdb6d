// Sample resource handler behind the trust kernel
// Demonstrates the consumer contract: handlers receive the validated
// principal from verified claims and enforce ownership explicitly at
// entry, never via the advisory gateway headers.

use axum::response::Json;
use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    middleware::trust::{authorize, Principal, RequestContext, ResourceRef},
    utils::auth_errors::AuthError,
};

#[derive(Debug, Serialize, ToSchema)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub tenant_id: Uuid,
    pub roles: Vec<String>,
    pub trace_id: String,
}

/// GET /api/v1/profile/me - the authenticated principal's own profile
#[utoipa::path(
    get,
    path = "/api/v1/profile/me",
    responses(
        (status = 200, description = "The caller's identity", body = ProfileResponse),
        (status = 401, description = "Credential missing, invalid or revoked"),
    ),
    tag = "profile"
)]
pub async fn me(
    principal: Principal,
    context: RequestContext,
) -> Result<Json<ProfileResponse>, AuthError> {
    // own profile: owner and tenant are the principal's
    let resource = ResourceRef {
        owner_id: principal.user_id,
        tenant_id: principal.tenant_id,
    };
    authorize(&principal, &resource).check()?;

    Ok(Json(ProfileResponse {
        user_id: principal.user_id,
        tenant_id: principal.tenant_id,
        roles: principal.roles.iter().map(|r| r.as_str().to_string()).collect(),
        trace_id: context.trace_id,
    }))
}
