//! Marketplace authentication server
//!
//! Entry point: loads configuration, sets up logging and serves the app.

use mimalloc::MiMalloc;
use std::sync::Arc;

use marketplace_auth::{config::AppConfig, server, telemetry};

/// Global allocator for improved performance (M-MIMALLOC-APPS).
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env (if present)
    let _ = dotenvy::dotenv();

    let config = AppConfig::load()?;
    telemetry::init(config.telemetry.json);

    server::start_server(Arc::new(config)).await
}
