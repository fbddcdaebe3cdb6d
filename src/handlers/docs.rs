// API documentation handlers
// OpenAPI spec derived from the handler annotations plus an embedded
// Swagger UI page, both behind the ENABLE_SWAGGER_UI flag.

use axum::{
    extract::OriginalUri,
    http::{header, StatusCode},
    response::{Html, IntoResponse, Json, Response},
};
use utoipa::OpenApi;

use crate::handlers;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Bazaar Identity Authority",
        description = "Identity and access infrastructure for the marketplace: credential issuance, key distribution and session revocation",
        version = "1.0.0"
    ),
    paths(
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh,
        handlers::auth::logout,
        handlers::auth::logout_all,
        handlers::jwks::jwks,
        handlers::profile::me,
    ),
    components(schemas(
        handlers::auth::RegisterRequest,
        handlers::auth::LoginRequest,
        handlers::auth::RefreshRequest,
        handlers::auth::LogoutRequest,
        handlers::auth::RegisterResponse,
        handlers::auth::LoginResponse,
        handlers::auth::RefreshResponse,
        handlers::auth::LogoutResponse,
        handlers::profile::ProfileResponse,
    )),
    tags(
        (name = "auth", description = "Credential issuance and revocation"),
        (name = "keys", description = "Public key distribution"),
        (name = "profile", description = "Sample trust-kernel protected resource"),
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI JSON specification at /docs/openapi.json
pub async fn serve_openapi_spec() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

/// Redirect /docs to /docs/ for proper relative path resolution
pub async fn redirect_to_docs(original_uri: OriginalUri) -> impl IntoResponse {
    let mut path = original_uri.0.path().to_string();
    if !path.ends_with('/') {
        path.push('/');
    }
    (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, path)]).into_response()
}

/// Serve the Swagger UI page at /docs/
pub async fn serve_swagger_ui() -> Response {
    Html(SWAGGER_UI_HTML).into_response()
}

// Embedded Swagger UI HTML
const SWAGGER_UI_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Bazaar Identity API</title>
    <link rel="stylesheet" href="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui.css" />
    <style>
        body { margin: 0; padding: 0; }
        #swagger-ui { max-width: 1460px; margin: 0 auto; padding: 20px; }
        .topbar { display: none; }
    </style>
</head>
<body>
    <div id="swagger-ui"></div>
    <script src="https://unpkg.com/swagger-ui-dist@5.9.0/swagger-ui-bundle.js"></script>
    <script>
        window.onload = function() {
            window.ui = SwaggerUIBundle({
                url: '/docs/openapi.json',
                dom_id: '#swagger-ui',
                deepLinking: true,
                docExpansion: "list",
                tryItOutEnabled: true,
                validatorUrl: null
            });
        }
    </script>
</body>
</html>"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_document_lists_all_auth_paths() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&String> = doc.paths.paths.keys().collect();

        for expected in [
            "/auth/register",
            "/auth/login",
            "/auth/refresh",
            "/auth/logout",
            "/auth/logout-all",
            "/.well-known/jwks.json",
            "/api/v1/profile/me",
        ] {
            assert!(
                paths.iter().any(|p| p.as_str() == expected),
                "missing path {} in {:?}",
                expected,
                paths
            );
        }
    }
}
