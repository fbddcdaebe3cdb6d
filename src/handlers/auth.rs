// Authentication handlers for the identity authority
// Register, login, refresh, logout and logout-all. Token cookies are set
// alongside the JSON body so both cookie-based web clients and
// header-based API clients work against the same endpoints.

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::{Deserialize, Serialize};
use time::Duration;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    app::AppState,
    app_config::AppConfig,
    middleware::extract::{
        extract_access_token, extract_refresh_token, ACCESS_TOKEN_COOKIE, REFRESH_TOKEN_COOKIE,
    },
    models::Role,
    services::{IssuedTokens, LoginInput, RegisterInput},
    utils::auth_errors::{AuthError, FieldError},
};

// =============================================================================
// REQUEST/RESPONSE TYPES
// =============================================================================

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(email(message = "Invalid email format"))]
    #[validate(length(max = 320, message = "Email must be less than 320 characters"))]
    pub email: Option<String>,

    pub phone: Option<String>,

    #[validate(length(min = 8, message = "Password must be at least 8 characters"))]
    pub password: String,

    pub tenant_id: Option<Uuid>,

    /// CUSTOMER | SELLER | ADMIN | STAFF | DRIVER
    pub role: String,
}

#[derive(Debug, Deserialize, Serialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,

    pub phone: Option<String>,

    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct RefreshRequest {
    // Optional so cookie-only web clients can omit the body value
    pub refresh_token: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, ToSchema)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub token: String,
    pub refresh_token: String,
    pub id: Uuid,
    pub role: Vec<String>,
    pub tenant_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: u64,
    pub id: Uuid,
    pub role: Vec<String>,
    pub tenant_id: Uuid,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub expires_in: u64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LogoutResponse {
    pub success: bool,
}

// =============================================================================
// COOKIE HELPERS
// =============================================================================

fn same_site(config: &AppConfig) -> SameSite {
    // SameSite=None is only honored with Secure; Lax everywhere else
    if config.cookie.same_site_none {
        SameSite::None
    } else {
        SameSite::Lax
    }
}

fn build_token_cookie(
    name: &'static str,
    value: String,
    max_age_secs: u64,
    config: &AppConfig,
) -> Cookie<'static> {
    let mut builder = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(config.is_production() || config.cookie.same_site_none)
        .same_site(same_site(config))
        .max_age(Duration::seconds(max_age_secs as i64));

    if let Some(domain) = &config.cookie.domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

fn clear_token_cookie(name: &'static str, config: &AppConfig) -> Cookie<'static> {
    let mut builder = Cookie::build((name, ""))
        .path("/")
        .http_only(true)
        .secure(config.is_production() || config.cookie.same_site_none)
        .same_site(same_site(config))
        .max_age(Duration::seconds(0));

    if let Some(domain) = &config.cookie.domain {
        builder = builder.domain(domain.clone());
    }

    builder.build()
}

fn token_pair_cookies(jar: CookieJar, issued: &IssuedTokens, state: &AppState) -> CookieJar {
    jar.add(build_token_cookie(
        ACCESS_TOKEN_COOKIE,
        issued.access_token.clone(),
        state.auth.access_ttl(),
        &state.config,
    ))
    .add(build_token_cookie(
        REFRESH_TOKEN_COOKIE,
        issued.refresh_token.clone(),
        state.auth.refresh_ttl(),
        &state.config,
    ))
}

fn cleared_cookies(jar: CookieJar, state: &AppState) -> CookieJar {
    jar.add(clear_token_cookie(ACCESS_TOKEN_COOKIE, &state.config))
        .add(clear_token_cookie(REFRESH_TOKEN_COOKIE, &state.config))
}

fn validation_errors(errors: validator::ValidationErrors) -> AuthError {
    let fields = errors
        .field_errors()
        .into_iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| FieldError {
                field: field.to_string(),
                message: e
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string()),
            })
        })
        .collect();
    AuthError::Validation(fields)
}

fn parse_role(raw: &str) -> Result<Role, AuthError> {
    raw.parse::<Role>()
        .map_err(|_| AuthError::invalid_field("role", "unknown role"))
}

fn parse_body_refresh_token(body: &Bytes) -> Option<String> {
    if body.is_empty() {
        return None;
    }
    serde_json::from_slice::<LogoutRequest>(body)
        .ok()
        .and_then(|req| req.refresh_token)
}

// =============================================================================
// AUTHENTICATION HANDLERS
// =============================================================================

/// POST /auth/register - Create an account and auto-login
#[utoipa::path(
    post,
    path = "/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created, token pair issued", body = RegisterResponse),
        (status = 400, description = "Validation failure or invalid tenant"),
        (status = 409, description = "Email or phone already registered in tenant"),
    ),
    tag = "auth"
)]
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> Result<(CookieJar, Json<RegisterResponse>), AuthError> {
    request.validate().map_err(validation_errors)?;
    let role = parse_role(&request.role)?;

    let issued = state
        .auth
        .register(RegisterInput {
            email: request.email,
            phone: request.phone,
            password: request.password,
            tenant_id: request.tenant_id,
            role,
        })
        .await?;

    let jar = token_pair_cookies(jar, &issued, &state);
    let response = RegisterResponse {
        token: issued.access_token,
        refresh_token: issued.refresh_token,
        id: issued.user_id,
        role: issued.roles.iter().map(|r| r.as_str().to_string()).collect(),
        tenant_id: issued.tenant_id,
    };

    Ok((jar, Json(response)))
}

/// POST /auth/login - Authenticate and issue a token pair
#[utoipa::path(
    post,
    path = "/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Token pair issued", body = LoginResponse),
        (status = 401, description = "Bad credentials"),
    ),
    tag = "auth"
)]
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> Result<(CookieJar, Json<LoginResponse>), AuthError> {
    request.validate().map_err(validation_errors)?;

    let issued = state
        .auth
        .login(LoginInput {
            email: request.email,
            phone: request.phone,
            password: request.password,
        })
        .await?;

    let jar = token_pair_cookies(jar, &issued, &state);
    let response = LoginResponse {
        access_token: issued.access_token.clone(),
        refresh_token: issued.refresh_token.clone(),
        expires_in: issued.expires_in,
        id: issued.user_id,
        role: issued.roles.iter().map(|r| r.as_str().to_string()).collect(),
        tenant_id: issued.tenant_id,
    };

    Ok((jar, Json(response)))
}

/// POST /auth/refresh - Exchange a refresh token for a new access token.
/// The refresh token may arrive in the body or the refreshToken cookie;
/// an optional Authorization header is cross-checked against the token's
/// subject when parseable.
#[utoipa::path(
    post,
    path = "/auth/refresh",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Fresh access token", body = RefreshResponse),
        (status = 401, description = "Refresh token unknown, expired or revoked"),
    ),
    tag = "auth"
)]
pub async fn refresh(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<RefreshResponse>), AuthError> {
    let body_token = parse_body_refresh_token(&body);
    let refresh_token = extract_refresh_token(body_token.as_deref(), &headers)
        .ok_or(AuthError::BadCredentials)?;

    let access_token = extract_access_token(&headers);

    let (access, expires_in) = state
        .auth
        .refresh(&refresh_token, access_token.as_deref())
        .await?;

    // the access-token cookie is refreshed; the refresh cookie stays as-is
    let jar = jar.add(build_token_cookie(
        ACCESS_TOKEN_COOKIE,
        access.clone(),
        state.auth.access_ttl(),
        &state.config,
    ));

    Ok((
        jar,
        Json(RefreshResponse {
            access_token: access,
            expires_in,
        }),
    ))
}

/// POST /auth/logout - Terminate the calling session. Requires the access
/// token (header or cookie) and the refresh token (body or cookie); both
/// cookies are cleared in the response.
#[utoipa::path(
    post,
    path = "/auth/logout",
    request_body = LogoutRequest,
    responses(
        (status = 200, description = "Session terminated", body = LogoutResponse),
        (status = 401, description = "Credentials missing or mismatched"),
        (status = 503, description = "Revocation store unreachable"),
    ),
    tag = "auth"
)]
pub async fn logout(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<LogoutResponse>), AuthError> {
    let access_token = extract_access_token(&headers).ok_or(AuthError::Unauthorized)?;

    let body_token = parse_body_refresh_token(&body);
    let refresh_token = extract_refresh_token(body_token.as_deref(), &headers)
        .ok_or(AuthError::BadCredentials)?;

    state.auth.logout(&refresh_token, &access_token).await?;

    Ok((
        cleared_cookies(jar, &state),
        Json(LogoutResponse { success: true }),
    ))
}

/// POST /auth/logout-all - Revoke every session of the calling user
#[utoipa::path(
    post,
    path = "/auth/logout-all",
    responses(
        (status = 200, description = "All sessions revoked", body = LogoutResponse),
        (status = 401, description = "Access token missing or invalid"),
        (status = 503, description = "Revocation store unreachable"),
    ),
    tag = "auth"
)]
pub async fn logout_all(
    State(state): State<AppState>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<(CookieJar, Json<LogoutResponse>), AuthError> {
    let access_token = extract_access_token(&headers).ok_or(AuthError::Unauthorized)?;

    state.auth.logout_all(&access_token).await?;

    Ok((
        cleared_cookies(jar, &state),
        Json(LogoutResponse { success: true }),
    ))
}
