// Hybrid credential extraction
// Access tokens arrive as `Authorization: Bearer` or in the accessToken
// cookie; the header always wins. Refresh tokens for logout/refresh come
// from the request body first, then the refreshToken cookie.

use axum::http::{header, HeaderMap};
use axum_extra::extract::cookie::CookieJar;

pub const ACCESS_TOKEN_COOKIE: &str = "accessToken";
pub const REFRESH_TOKEN_COOKIE: &str = "refreshToken";

/// Extract the access credential from a request. Precedence:
/// 1. `Authorization: Bearer <token>`
/// 2. `accessToken` cookie
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    let jar = CookieJar::from_headers(headers);
    jar.get(ACCESS_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|v| !v.is_empty())
}

/// Extract the refresh credential: an explicit body value wins over the
/// refreshToken cookie.
pub fn extract_refresh_token(body_token: Option<&str>, headers: &HeaderMap) -> Option<String> {
    if let Some(token) = body_token {
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    let jar = CookieJar::from_headers(headers);
    jar.get(REFRESH_TOKEN_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(auth: Option<&str>, cookie: Option<&str>) -> HeaderMap {
        let mut map = HeaderMap::new();
        if let Some(auth) = auth {
            map.insert(header::AUTHORIZATION, HeaderValue::from_str(auth).unwrap());
        }
        if let Some(cookie) = cookie {
            map.insert(header::COOKIE, HeaderValue::from_str(cookie).unwrap());
        }
        map
    }

    #[test]
    fn test_header_wins_over_cookie() {
        let map = headers(
            Some("Bearer header-token"),
            Some("accessToken=cookie-token"),
        );
        assert_eq!(
            extract_access_token(&map),
            Some("header-token".to_string())
        );
    }

    #[test]
    fn test_cookie_used_when_header_absent() {
        let map = headers(None, Some("accessToken=cookie-token; other=x"));
        assert_eq!(
            extract_access_token(&map),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn test_non_bearer_header_falls_through_to_cookie() {
        let map = headers(Some("Basic dXNlcjpwYXNz"), Some("accessToken=cookie-token"));
        assert_eq!(
            extract_access_token(&map),
            Some("cookie-token".to_string())
        );
    }

    #[test]
    fn test_no_credential() {
        let map = headers(None, None);
        assert_eq!(extract_access_token(&map), None);

        let map = headers(Some("Bearer "), None);
        assert_eq!(extract_access_token(&map), None);
    }

    #[test]
    fn test_refresh_body_wins_over_cookie() {
        let map = headers(None, Some("refreshToken=cookie-refresh"));
        assert_eq!(
            extract_refresh_token(Some("body-refresh"), &map),
            Some("body-refresh".to_string())
        );
    }

    #[test]
    fn test_refresh_cookie_fallback() {
        let map = headers(None, Some("refreshToken=cookie-refresh"));
        assert_eq!(
            extract_refresh_token(None, &map),
            Some("cookie-refresh".to_string())
        );
        assert_eq!(
            extract_refresh_token(Some(""), &map),
            Some("cookie-refresh".to_string())
        );
    }

    #[test]
    fn test_refresh_absent() {
        let map = headers(None, None);
        assert_eq!(extract_refresh_token(None, &map), None);
    }
}
