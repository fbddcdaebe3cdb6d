// Request-facing error kinds for the identity and trust planes
// Every auth precondition failure collapses into BadCredentials to avoid
// user enumeration; cross-tenant access is indistinguishable from NotFound.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Json},
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{RefreshTokenError, RoleGrantError, SigningKeyError, TenantError, UserError};
use crate::services::password::PasswordError;
use crate::services::revocation::RevocationError;
use crate::services::token::TokenError;

/// Errors surfaced to clients
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid credentials")]
    BadCredentials,

    #[error("Email already registered")]
    EmailTaken,

    #[error("Phone already registered")]
    PhoneTaken,

    #[error("Invalid tenant: {0}")]
    InvalidTenant(String),

    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("Not found")]
    NotFound,

    #[error("Upstream dependency unavailable")]
    UpstreamUnavailable,

    #[error("Internal error")]
    Internal(String),
}

/// One failed request field
#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Standard error response body
#[derive(Debug, Serialize)]
pub struct AuthErrorResponse {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

impl AuthError {
    /// Convert to HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthError::BadCredentials => StatusCode::UNAUTHORIZED,
            AuthError::EmailTaken => StatusCode::CONFLICT,
            AuthError::PhoneTaken => StatusCode::CONFLICT,
            AuthError::InvalidTenant(_) => StatusCode::BAD_REQUEST,
            AuthError::Validation(_) => StatusCode::BAD_REQUEST,
            AuthError::Unauthorized => StatusCode::UNAUTHORIZED,
            AuthError::Forbidden => StatusCode::FORBIDDEN,
            AuthError::NotFound => StatusCode::NOT_FOUND,
            AuthError::UpstreamUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            AuthError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Convert to error code string
    pub fn error_code(&self) -> &'static str {
        match self {
            AuthError::BadCredentials => "BAD_CREDENTIALS",
            AuthError::EmailTaken => "EMAIL_TAKEN",
            AuthError::PhoneTaken => "PHONE_TAKEN",
            AuthError::InvalidTenant(_) => "INVALID_TENANT",
            AuthError::Validation(_) => "VALIDATION_ERROR",
            AuthError::Unauthorized => "UNAUTHORIZED",
            AuthError::Forbidden => "FORBIDDEN",
            AuthError::NotFound => "NOT_FOUND",
            AuthError::UpstreamUnavailable => "UPSTREAM_UNAVAILABLE",
            AuthError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Build a validation error from a single offending field
    pub fn invalid_field(field: &str, message: &str) -> Self {
        AuthError::Validation(vec![FieldError {
            field: field.to_string(),
            message: message.to_string(),
        }])
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();

        // Internal faults get logged with a correlation id; the client only
        // sees the opaque id.
        let (message, fields, correlation_id) = match &self {
            AuthError::Internal(detail) => {
                let correlation_id = Uuid::new_v4().to_string();
                tracing::error!(
                    correlation_id = %correlation_id,
                    detail = %detail,
                    "Internal error"
                );
                ("Internal error".to_string(), None, Some(correlation_id))
            },
            AuthError::Validation(field_errors) => (
                self.to_string(),
                Some(field_errors.clone()),
                None,
            ),
            other => (other.to_string(), None, None),
        };

        let body = AuthErrorResponse {
            code: self.error_code().to_string(),
            message,
            fields,
            correlation_id,
        };

        (status, Json(body)).into_response()
    }
}

// Storage and crypto faults collapse into the client-facing kinds. Token
// lookups that miss become BadCredentials; everything unexpected is an
// internal fault with a correlation id.

impl From<UserError> for AuthError {
    fn from(err: UserError) -> Self {
        match err {
            UserError::NotFound => AuthError::BadCredentials,
            UserError::EmailTaken => AuthError::EmailTaken,
            UserError::PhoneTaken => AuthError::PhoneTaken,
            UserError::Database(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<TenantError> for AuthError {
    fn from(err: TenantError) -> Self {
        match err {
            TenantError::NotFound => AuthError::InvalidTenant("unknown tenant".to_string()),
            TenantError::Database(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<RefreshTokenError> for AuthError {
    fn from(err: RefreshTokenError) -> Self {
        match err {
            RefreshTokenError::NotFound
            | RefreshTokenError::Expired
            | RefreshTokenError::Revoked => AuthError::BadCredentials,
            RefreshTokenError::Database(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<RoleGrantError> for AuthError {
    fn from(err: RoleGrantError) -> Self {
        match err {
            RoleGrantError::Database(e) => AuthError::Internal(e.to_string()),
        }
    }
}

impl From<SigningKeyError> for AuthError {
    fn from(err: SigningKeyError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<crate::services::keystore::KeyStoreError> for AuthError {
    fn from(err: crate::services::keystore::KeyStoreError) -> Self {
        AuthError::Internal(err.to_string())
    }
}

impl From<PasswordError> for AuthError {
    fn from(err: PasswordError) -> Self {
        match err {
            PasswordError::InvalidInput(msg) => AuthError::invalid_field("password", &msg),
            other => AuthError::Internal(other.to_string()),
        }
    }
}

impl From<TokenError> for AuthError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Malformed
            | TokenError::Expired
            | TokenError::UnknownKid(_)
            | TokenError::BadSignature => AuthError::Unauthorized,
            TokenError::Signing(e) => AuthError::Internal(e),
            TokenError::KeyMaterial(e) => AuthError::Internal(e),
        }
    }
}

impl From<RevocationError> for AuthError {
    fn from(err: RevocationError) -> Self {
        match err {
            RevocationError::Unavailable(_) | RevocationError::Timeout => {
                AuthError::UpstreamUnavailable
            },
        }
    }
}

impl From<diesel::result::Error> for AuthError {
    fn from(err: diesel::result::Error) -> Self {
        AuthError::Internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(AuthError::BadCredentials.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::EmailTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(AuthError::PhoneTaken.status_code(), StatusCode::CONFLICT);
        assert_eq!(
            AuthError::InvalidTenant("x".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AuthError::Validation(vec![]).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(AuthError::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(AuthError::Forbidden.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(AuthError::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            AuthError::UpstreamUnavailable.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthError::Internal("boom".into()).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_refresh_token_failures_collapse_to_bad_credentials() {
        for err in [
            RefreshTokenError::NotFound,
            RefreshTokenError::Expired,
            RefreshTokenError::Revoked,
        ] {
            assert!(matches!(AuthError::from(err), AuthError::BadCredentials));
        }
    }

    #[test]
    fn test_token_failures_collapse_to_unauthorized() {
        use crate::services::token::TokenError;

        for err in [
            TokenError::Malformed,
            TokenError::Expired,
            TokenError::UnknownKid("k1".into()),
            TokenError::BadSignature,
        ] {
            assert!(matches!(AuthError::from(err), AuthError::Unauthorized));
        }
    }
}
