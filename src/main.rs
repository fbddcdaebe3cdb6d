// Identity authority process
// Startup is all-or-nothing: missing pepper, no database connectivity or a
// failed signing-key bootstrap exits non-zero before the listener binds.

use axum::{
    extract::State,
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use chrono::Utc;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bazaar_identity_core::{
    app::AppState,
    app_config::AppConfig,
    db::{
        check_diesel_health, mask_store_url, DieselDatabaseConfig, RedisConfig,
        RevocationStoreClient,
    },
    handlers::{self, api_routes, auth_routes, well_known_routes},
    middleware::{dynamic_cors, edge_validator, trust_kernel},
    migrations,
    models::Tenant,
    services::{
        AuthService, FailMode, JwksCache, KeyStore, PasswordConfig, PasswordService,
        RevocationIndex, TokenService,
    },
    utils::PathMatcher,
};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Handle version flag for container health checks - must be FIRST
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "--version" {
        println!("bazaar-identity-core v{}", env!("CARGO_PKG_VERSION"));
        std::process::exit(0);
    }

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "bazaar_identity_core=debug,axum=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment variables
    dotenv::dotenv().ok();

    // Load all configuration once; a missing pepper fails here
    let config = match AppConfig::from_env() {
        Ok(config) => Arc::new(config),
        Err(e) => {
            error!("✗ Configuration error: {}", e);
            return Err(format!("Configuration error: {}", e).into());
        },
    };

    info!("=== STARTING BAZAAR IDENTITY AUTHORITY ===");
    info!("Environment: {}", config.environment);
    info!("Binding on {}", config.bind_address);

    // Initialize the identity store pool
    info!("Initializing database pool...");
    let db_config = DieselDatabaseConfig::from_app_config(&config.database);
    info!("Database URL: {}", mask_store_url(&db_config.url));

    let diesel_pool = match db_config.connect().await {
        Ok(pool) => {
            info!("✓ Database connection pool initialized successfully");
            pool
        },
        Err(e) => {
            error!("✗ Failed to initialize database pool: {}", e);
            return Err(format!("Database initialization failed: {}", e).into());
        },
    };

    // Run embedded migrations
    info!("Running embedded migrations...");
    match migrations::run_migrations(&config.database.url).await {
        Ok(count) => info!("✓ Migrations complete ({} applied)", count),
        Err(e) => {
            error!("✗ Migration failed: {}", e);
            return Err(format!("Migration failed: {}", e).into());
        },
    }

    // The default marketplace tenant must exist before any registration
    {
        let mut conn = diesel_pool.get().await?;
        match Tenant::ensure_default(&mut conn).await {
            Ok(tenant) => info!("✓ Default marketplace tenant present ({})", tenant.id),
            Err(e) => {
                error!("✗ Default tenant bootstrap failed: {}", e);
                return Err(format!("Default tenant bootstrap failed: {}", e).into());
            },
        }
    }

    // Connect to the revocation store
    info!("Connecting to revocation store...");
    let redis_config = RedisConfig::from_app_config(&config.revocation);
    let revocation_store = match RevocationStoreClient::connect(redis_config).await {
        Ok(store) => {
            info!("✓ Revocation store connected");
            store
        },
        Err(e) => {
            error!("✗ Failed to connect to revocation store: {}", e);
            return Err(format!("Revocation store initialization failed: {}", e).into());
        },
    };

    let fail_mode: FailMode = config
        .revocation
        .fail_mode
        .parse()
        .map_err(|e: String| -> Box<dyn std::error::Error> { e.into() })?;
    let revocation = Arc::new(RevocationIndex::new(
        revocation_store.clone(),
        fail_mode,
        config.auth.refresh_ttl,
    ));
    info!("✓ Revocation index ready (fail mode: {:?})", fail_mode);

    // Signing key lifecycle: bootstrap a key if none is active
    info!("Initializing key store...");
    let keystore = Arc::new(KeyStore::new(
        diesel_pool.clone(),
        config.auth.key_expiry_days,
    ));
    match keystore.ensure_bootstrap(Utc::now()).await {
        Ok(key) => info!("✓ Active signing key: kid={}", key.kid),
        Err(e) => {
            error!("✗ Signing key bootstrap failed: {}", e);
            return Err(format!("Signing key bootstrap failed: {}", e).into());
        },
    }

    // Password service from KDF config
    let password = match PasswordService::new(
        config.kdf.pepper.clone(),
        PasswordConfig {
            memory_cost: config.kdf.memory_kib,
            time_cost: config.kdf.iterations,
            parallelism: config.kdf.parallelism,
            hash_length: config.kdf.hash_length,
            salt_length: config.kdf.salt_length,
        },
    ) {
        Ok(svc) => Arc::new(svc),
        Err(e) => {
            error!("✗ Password service initialization failed: {}", e);
            return Err(format!("Password service initialization failed: {}", e).into());
        },
    };
    info!("✓ Password service initialized");

    // Orchestrator
    let tokens = TokenService::new(config.auth.issuer.clone(), config.auth.access_ttl);
    let auth = Arc::new(AuthService::new(
        diesel_pool.clone(),
        Arc::clone(&password),
        tokens,
        Arc::clone(&keystore),
        Arc::clone(&revocation),
        config.auth.refresh_ttl,
    ));
    info!("✓ Auth orchestrator initialized");

    // The in-process validators read the key store directly; remote
    // validators would point a JwksCache at /.well-known/jwks.json instead.
    let jwks_cache = Arc::new(JwksCache::new_local(
        Arc::clone(&keystore),
        Duration::from_secs(config.jwks.refresh_interval),
        Duration::from_secs(config.jwks.max_stale),
    ));
    if let Err(e) = jwks_cache.refresh_now().await {
        error!("✗ Initial key set load failed: {}", e);
        return Err(format!("Initial key set load failed: {}", e).into());
    }
    let _jwks_refresh_task = Arc::clone(&jwks_cache).spawn_refresh();
    info!(
        "✓ Key set cache primed (refresh every {}s, max stale {}s)",
        config.jwks.refresh_interval, config.jwks.max_stale
    );

    // Overlap-based key rotation: publish a successor while the outgoing
    // primary still verifies, so no validator ever sees a gap.
    {
        let keystore = Arc::clone(&keystore);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(6 * 3600));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match keystore.rotate_if_due(Utc::now()).await {
                    Ok(Some(key)) => info!("Rotated signing key, new primary kid={}", key.kid),
                    Ok(None) => {},
                    Err(e) => error!("Signing key rotation check failed: {}", e),
                }
            }
        });
    }

    let public_paths = Arc::new(PathMatcher::new(config.gateway.public_paths.iter()));
    info!("Gateway public paths: {:?}", config.gateway.public_paths);

    // Create shared application state
    let app_state = AppState {
        config: config.clone(),
        diesel_pool: diesel_pool.clone(),
        revocation_store: revocation_store.clone(),
        auth,
        keystore,
        revocation,
        jwks_cache,
        public_paths,
    };

    // Build the application router - conditionally include Swagger UI
    let mut app = Router::new().route("/health", get(comprehensive_health_check));

    if config.enable_swagger_ui {
        info!("Swagger UI: ENABLED at /docs");
        app = app
            .route("/docs", get(handlers::docs::redirect_to_docs))
            .route("/docs/", get(handlers::docs::serve_swagger_ui))
            .route("/docs/openapi.json", get(handlers::docs::serve_openapi_spec));
    } else {
        info!("Swagger UI: DISABLED (set ENABLE_SWAGGER_UI=true to enable)");
    }

    // Complete router setup. The edge validator guards every route that is
    // not on the public path list; the sample backend routes additionally
    // run the trust kernel for defense in depth.
    let app = app
        .nest("/auth", auth_routes())
        .nest("/.well-known", well_known_routes())
        .nest(
            "/api/v1",
            api_routes().route_layer(axum_middleware::from_fn_with_state(
                app_state.clone(),
                trust_kernel,
            )),
        )
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            edge_validator,
        ))
        // CORS runs ahead of the edge validator so preflight never needs a
        // credential; tracing wraps everything
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(axum_middleware::from_fn_with_state(
                    app_state.clone(),
                    dynamic_cors,
                )),
        )
        .with_state(app_state);

    // Parse and bind to address
    let addr: SocketAddr = config.bind_address.parse()?;
    info!("Starting HTTP server on {}...", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .await?;

    Ok(())
}

// Health check handler: identity store + revocation store component health
async fn comprehensive_health_check(State(state): State<AppState>) -> impl IntoResponse {
    use serde_json::json;

    let mut overall_healthy = true;
    let timestamp = Utc::now().to_rfc3339();

    let postgres_health = match check_diesel_health(&state.diesel_pool).await {
        Ok(_) => {
            json!({
                "status": "healthy",
                "error": null
            })
        },
        Err(e) => {
            overall_healthy = false;
            json!({
                "status": "unhealthy",
                "error": format!("Database connection failed: {}", e)
            })
        },
    };

    let redis_health_result = state.revocation_store.health_check().await;
    if !redis_health_result.is_healthy {
        overall_healthy = false;
    }
    let redis_health = json!({
        "status": if redis_health_result.is_healthy { "healthy" } else { "unhealthy" },
        "latency_ms": redis_health_result.latency_ms,
        "error": redis_health_result.error
    });

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "degraded" },
        "service": "bazaar-identity-core",
        "timestamp": timestamp,
        "components": {
            "postgresql": postgres_health,
            "revocation_store": redis_health
        }
    });

    if overall_healthy {
        (StatusCode::OK, Json(response))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(response))
    }
}
