//! Marketplace authentication service
//!
//! Role-aware login, session and redirect handling for the marketplace,
//! backed by Auth0.
//!
//! # Architecture
//!
//! - **Auth**: role claim reader, session augmenter, role router and access guard
//! - **Server**: Axum HTTP server hosting the `/auth` endpoints and the guarded pages
//! - **Security**: rate limiting for the auth routes
//!
//! # Modules
//!
//! - [`auth`]: authentication and authorisation core
//! - [`config`]: layered configuration (defaults, file, env, CLI)
//! - [`pages`]: HTML pages behind the guard
//! - [`server`]: router construction and startup
//! - [`telemetry`]: logging setup

// Allow pedantic clippy warnings that don't add value for this codebase
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::cargo_common_metadata)]
#![allow(clippy::multiple_crate_versions)]
#![allow(clippy::unused_async)]

pub mod auth;
pub mod config;
pub mod pages;
pub mod security;
pub mod server;
pub mod telemetry;

use crate::auth::cookie::CookieCodec;
use crate::auth::{AccessGuard, AccessPolicy, IdentityProvider, RoleClaimReader, SessionAugmenter};
use crate::config::AppConfig;
use crate::security::rate_limit::SimpleRateLimiter;

use std::sync::Arc;

/// Application state shared across all handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Identity provider client.
    pub identity: Arc<dyn IdentityProvider>,
    /// Builds sessions from verified claims.
    pub augmenter: Arc<SessionAugmenter>,
    /// Signed cookie codec.
    pub cookies: Arc<CookieCodec>,
    /// Guarded boundaries.
    pub policy: Arc<AccessPolicy>,
    /// Access guard
    pub guard: AccessGuard,
    /// Per-client rate limiter for the auth routes
    pub rate_limiter: Arc<SimpleRateLimiter>,
    /// Global Configuration
    pub config: Arc<AppConfig>,
}

impl AppState {
    /// Wire the auth components from configuration.
    pub fn new(config: Arc<AppConfig>, identity: Arc<dyn IdentityProvider>) -> Self {
        let auth = &config.auth;
        let augmenter = SessionAugmenter::new(RoleClaimReader::new(&auth.claim_namespace))
            .with_default_role(auth.default_role);
        let cookies = CookieCodec::new(
            &auth.session_secret,
            auth.session_ttl(),
            auth.secure_cookies,
        );

        Self {
            identity,
            augmenter: Arc::new(augmenter),
            cookies: Arc::new(cookies),
            policy: Arc::new(AccessPolicy::marketplace()),
            guard: AccessGuard::new(config.guard.mismatch_redirect),
            rate_limiter: Arc::new(SimpleRateLimiter::new(
                config.resilience.requests_per_second,
                config.resilience.burst_size,
                config.resilience.max_clients,
            )),
            config,
        }
    }
}
