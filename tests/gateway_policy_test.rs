// Gateway policy surface: public path matching, credential extraction
// precedence, and the layered authorization decision table.

use axum::http::{header, HeaderMap, HeaderValue};
use bazaar_identity_core::middleware::{
    extract_access_token, extract_refresh_token,
};
use bazaar_identity_core::{authorize, Access, PathMatcher, Principal, ResourceRef, Role};
use uuid::Uuid;

#[test]
fn test_default_public_surface_covers_issuance_but_not_revocation() {
    let matcher = PathMatcher::new([
        "/auth/register",
        "/auth/login",
        "/auth/refresh",
        "/.well-known/**",
        "/health",
        "/docs/**",
    ]);

    // credential issuance must be reachable without a credential
    assert!(matcher.matches("/auth/register"));
    assert!(matcher.matches("/auth/login"));
    assert!(matcher.matches("/auth/refresh"));
    assert!(matcher.matches("/.well-known/jwks.json"));

    // revocation endpoints and resources require one
    assert!(!matcher.matches("/auth/logout"));
    assert!(!matcher.matches("/auth/logout-all"));
    assert!(!matcher.matches("/api/v1/profile/me"));

    // query strings do not change the decision
    assert!(matcher.matches("/auth/login?redirect=%2Fhome"));
    assert!(!matcher.matches("/api/v1/profile/me?fields=id"));
}

fn headers_with(auth: Option<&str>, cookie: Option<&str>) -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(auth) = auth {
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
    }
    if let Some(cookie) = cookie {
        headers.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
    }
    headers
}

#[test]
fn test_header_vs_cookie_precedence() {
    // given both, validation uses the header
    let both = headers_with(Some("Bearer from-header"), Some("accessToken=from-cookie"));
    assert_eq!(
        extract_access_token(&both),
        Some("from-header".to_string())
    );

    // given only the cookie, validation uses the cookie
    let cookie_only = headers_with(None, Some("accessToken=from-cookie"));
    assert_eq!(
        extract_access_token(&cookie_only),
        Some("from-cookie".to_string())
    );

    // given neither, there is no credential
    assert_eq!(extract_access_token(&headers_with(None, None)), None);
}

#[test]
fn test_logout_refresh_token_body_precedence() {
    let cookie = headers_with(None, Some("refreshToken=cookie-value"));

    assert_eq!(
        extract_refresh_token(Some("body-value"), &cookie),
        Some("body-value".to_string())
    );
    assert_eq!(
        extract_refresh_token(None, &cookie),
        Some("cookie-value".to_string())
    );
}

fn principal(roles: &[Role], tenant: Uuid, user: Uuid) -> Principal {
    Principal {
        user_id: user,
        tenant_id: tenant,
        roles: roles.to_vec(),
    }
}

#[test]
fn test_authorization_decision_table() {
    let tenant_a = Uuid::new_v4();
    let tenant_b = Uuid::new_v4();
    let owner = Uuid::new_v4();
    let other = Uuid::new_v4();

    let own_resource = ResourceRef {
        owner_id: owner,
        tenant_id: tenant_a,
    };
    let foreign_resource = ResourceRef {
        owner_id: other,
        tenant_id: tenant_a,
    };
    let cross_tenant = ResourceRef {
        owner_id: owner,
        tenant_id: tenant_b,
    };

    // customers and sellers operate only on what they own
    for role in [Role::Customer, Role::Seller, Role::Driver] {
        assert_eq!(
            authorize(&principal(&[role], tenant_a, owner), &own_resource),
            Access::Allow
        );
        assert_eq!(
            authorize(&principal(&[role], tenant_a, owner), &foreign_resource),
            Access::Forbidden
        );
    }

    // admin and staff operate on anything within their tenant
    for role in [Role::Admin, Role::Staff] {
        assert_eq!(
            authorize(&principal(&[role], tenant_a, owner), &foreign_resource),
            Access::Allow
        );
    }

    // tenant isolation is absolute and reads as NotFound for every role
    for role in [Role::Customer, Role::Seller, Role::Admin, Role::Staff, Role::Driver] {
        assert_eq!(
            authorize(&principal(&[role], tenant_a, owner), &cross_tenant),
            Access::NotFound
        );
    }
}

#[test]
fn test_multi_role_principal_uses_strongest_grant() {
    let tenant = Uuid::new_v4();
    let user = Uuid::new_v4();
    let foreign = ResourceRef {
        owner_id: Uuid::new_v4(),
        tenant_id: tenant,
    };

    // a CUSTOMER who is also STAFF gets tenant-wide access
    assert_eq!(
        authorize(
            &principal(&[Role::Customer, Role::Staff], tenant, user),
            &foreign
        ),
        Access::Allow
    );
}
