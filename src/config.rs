use crate::auth::guard::MismatchRedirect;
use crate::auth::roles::Role;
use clap::Parser;
use config::{Config, Environment, File, FileFormat};
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

/// Prefix of environment variables read by the `config` layer,
/// e.g. `MARKETPLACE_AUTH__CLIENT_ID`.
pub const ENV_PREFIX: &str = "MARKETPLACE";

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Config file path
    #[arg(short, long, env = "CONFIG_FILE")]
    pub config: Option<String>,

    /// Port to listen on
    #[arg(long, env = "PORT")]
    pub port: Option<u16>,

    /// Enable rate limiting on the auth routes
    #[arg(long, env = "RATE_LIMIT_ENABLED")]
    pub rate_limit_enabled: Option<bool>,

    /// Disable timeout middleware
    #[arg(long, env = "TIMEOUT_DISABLED")]
    pub timeout_disabled: Option<bool>,

    /// Emit JSON logs
    #[arg(long, env = "LOG_JSON")]
    pub log_json: Option<bool>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub guard: GuardConfig,
    pub resilience: ResilienceConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub host: String,
    /// Public URL of the app; the provider redirects back here.
    pub base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Tenant domain, e.g. `example.eu.auth0.com`.
    pub domain: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub audience: Option<String>,
    /// Custom claim namespace; roles are read from `<namespace>/roles`.
    pub claim_namespace: String,
    /// Key for signing session cookies.
    pub session_secret: String,
    pub session_ttl_secs: u64,
    pub secure_cookies: bool,
    /// How ID tokens are signed: `rs256` (tenant JWKS) or `hs256` (client secret).
    pub id_token_alg: IdTokenAlgorithm,
    /// Role given on first login when the token has none. Unset sends the
    /// user to role selection.
    #[serde(default)]
    pub default_role: Option<Role>,
    /// Provider role ids keyed by role (`client`, `service_provider`, `homeowner`).
    #[serde(default)]
    pub role_ids: HashMap<String, String>,
}

impl AuthConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }
}

/// ID token signing scheme configured for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IdTokenAlgorithm {
    /// Asymmetric, keys from `https://<domain>/.well-known/jwks.json`.
    #[default]
    Rs256,
    /// Symmetric, signed with the client secret.
    Hs256,
}

#[derive(Debug, Deserialize, Clone)]
pub struct GuardConfig {
    pub mismatch_redirect: MismatchRedirect,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResilienceConfig {
    pub rate_limit_enabled: bool,
    pub timeout_disabled: bool,
    pub requests_per_second: f32,
    pub burst_size: f32,
    /// Key rate-limit buckets by the first `X-Forwarded-For` hop. Only
    /// enable behind a proxy that overwrites the header.
    pub trust_forwarded_for: bool,
    /// Upper bound on tracked clients.
    pub max_clients: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub json: bool,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        Self::load_from_args(std::env::args())
    }

    /// Priority: CLI flag > CLI env var > `MARKETPLACE_` env > config file > defaults.
    pub fn load_from_args<I, T>(args: I) -> Result<Self, config::ConfigError>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let cli =
            Cli::try_parse_from(args).map_err(|e| config::ConfigError::Message(e.to_string()))?;

        let mut builder = Config::builder()
            .set_default("server.port", 3000)?
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.base_url", "http://localhost:3000")?
            .set_default("auth.domain", "")?
            .set_default("auth.client_id", "")?
            .set_default("auth.client_secret", "")?
            .set_default("auth.claim_namespace", "")?
            .set_default("auth.session_secret", "")?
            .set_default("auth.session_ttl_secs", 7 * 24 * 60 * 60)?
            .set_default("auth.secure_cookies", true)?
            .set_default("auth.id_token_alg", "rs256")?
            .set_default("guard.mismatch_redirect", "unauthorized")?
            .set_default("resilience.rate_limit_enabled", true)?
            .set_default("resilience.timeout_disabled", false)?
            .set_default("resilience.requests_per_second", 5.0)?
            .set_default("resilience.burst_size", 10.0)?
            .set_default("resilience.trust_forwarded_for", false)?
            .set_default("resilience.max_clients", 10_000)?
            .set_default("telemetry.json", false)?;

        // Explicit file must exist; ./config.yaml is optional.
        builder = match &cli.config {
            Some(path) => builder.add_source(File::with_name(path).required(true)),
            None => builder.add_source(File::new("config.yaml", FileFormat::Yaml).required(false)),
        };

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Some(port) = cli.port {
            builder = builder.set_override("server.port", port)?;
        }
        if let Some(rl) = cli.rate_limit_enabled {
            builder = builder.set_override("resilience.rate_limit_enabled", rl)?;
        }
        if let Some(td) = cli.timeout_disabled {
            builder = builder.set_override("resilience.timeout_disabled", td)?;
        }
        if let Some(json) = cli.log_json {
            builder = builder.set_override("telemetry.json", json)?;
        }

        builder.build()?.try_deserialize()
    }

    /// Settings the server cannot start without.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let required = [
            ("auth.domain", &self.auth.domain),
            ("auth.client_id", &self.auth.client_id),
            ("auth.client_secret", &self.auth.client_secret),
            ("auth.claim_namespace", &self.auth.claim_namespace),
            ("auth.session_secret", &self.auth.session_secret),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(key, _)| *key)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(config::ConfigError::Message(format!(
                "missing required settings: {}",
                missing.join(", ")
            )))
        }
    }
}
