use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize application logging.
///
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`).
/// - Compact human-readable output, or JSON lines when `json` is set.
pub fn init(json: bool) {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,marketplace_auth=debug"));

    let compact_layer = (!json).then(|| {
        fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .compact()
    });
    let json_layer = json.then(|| fmt::layer().with_target(true).json());

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(compact_layer)
        .with(json_layer)
        .init();
}
