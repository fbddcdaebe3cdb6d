// Public key set endpoint
// Unauthenticated: every validator in the mesh bootstraps its trust from
// this document.

use axum::{extract::State, response::Json};
use chrono::Utc;

use crate::{app::AppState, models::JwksDocument, utils::auth_errors::AuthError};

/// GET /.well-known/jwks.json - the current active verification keys
#[utoipa::path(
    get,
    path = "/.well-known/jwks.json",
    responses(
        (status = 200, description = "Active public key set: {keys:[{kty,kid,use,alg,n,e}]}"),
    ),
    tag = "keys"
)]
pub async fn jwks(State(state): State<AppState>) -> Result<Json<JwksDocument>, AuthError> {
    let document = state
        .keystore
        .jwks_document(Utc::now())
        .await
        .map_err(|e| AuthError::Internal(e.to_string()))?;

    Ok(Json(document))
}
