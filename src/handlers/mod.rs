// HTTP handlers for the identity authority

pub mod auth;
pub mod docs;
pub mod jwks;
pub mod profile;

use crate::app::AppState;
use axum::{
    routing::{get, post},
    Router,
};

// Authentication routes: register/login/refresh are public, logout paths
// sit behind the edge validator.
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/refresh", post(auth::refresh))
        .route("/logout", post(auth::logout))
        .route("/logout-all", post(auth::logout_all))
}

// Well-known public key distribution
pub fn well_known_routes() -> Router<AppState> {
    Router::new().route("/jwks.json", get(jwks::jwks))
}

// Sample backend resource routes, protected by the trust kernel
pub fn api_routes() -> Router<AppState> {
    Router::new().route("/profile/me", get(profile::me))
}
