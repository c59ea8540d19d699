use axum::{
    Router,
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::IntoResponse,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::AppState;
use crate::auth::{Auth0Client, guard, handlers};
use crate::config::AppConfig;
use crate::pages;
use crate::security::rate_limit::rate_limit_middleware;

/// Build the application router around `state`.
pub fn build_router(state: AppState) -> Router {
    // Large timeout when disabled keeps the layer stack's type fixed.
    let timeout_duration = if state.config.resilience.timeout_disabled {
        Duration::from_secs(365 * 24 * 60 * 60)
    } else {
        Duration::from_secs(30)
    };

    let auth_routes = Router::new()
        .route("/login", get(handlers::login))
        .route("/callback", get(handlers::callback))
        .route("/logout", get(handlers::logout))
        .route("/me", get(handlers::me))
        .route("/role", post(handlers::select_role))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ));

    Router::new()
        .route("/", get(pages::home))
        .route("/signup", get(pages::signup))
        .route("/unauthorized", get(pages::unauthorized))
        .route("/{role}/onboarding", get(pages::onboarding))
        .route("/dashboard/{role}", get(pages::dashboard))
        .nest("/auth", auth_routes)
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            guard::access_guard_middleware,
        ))
        .layer(axum::middleware::from_fn(
            move |req: Request, next: Next| async move {
                match tokio::time::timeout(timeout_duration, next.run(req)).await {
                    Ok(res) => res,
                    Err(_) => (StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response(),
                }
            },
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Start the Axum server with the provided configuration.
pub async fn start_server(config: Arc<AppConfig>) -> anyhow::Result<()> {
    config.validate()?;

    info!(
        name: "auth.config.loaded",
        domain = %config.auth.domain,
        mismatch_redirect = ?config.guard.mismatch_redirect,
        default_role = ?config.auth.default_role,
        "Auth configuration loaded"
    );

    let identity = Arc::new(Auth0Client::new(&config.auth, &config.server.base_url)?);
    let state = AppState::new(Arc::clone(&config), identity);
    let app = build_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!(
        name: "server.started",
        address = %addr,
        "Server started"
    );

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
