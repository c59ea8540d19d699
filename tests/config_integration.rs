use marketplace_auth::auth::{MismatchRedirect, Role};
use marketplace_auth::config::{AppConfig, IdTokenAlgorithm};
use serial_test::serial;
use std::env;
use std::fs;

const ARGS: [&str; 1] = ["marketplace-auth"];

// Helper to clear environment variables that might interfere with tests
fn clear_env_vars() {
    unsafe {
        env::remove_var("MARKETPLACE_SERVER__PORT");
        env::remove_var("MARKETPLACE_AUTH__DEFAULT_ROLE");
        env::remove_var("MARKETPLACE_GUARD__MISMATCH_REDIRECT");
        env::remove_var("MARKETPLACE_AUTH__CLIENT_ID");
        env::remove_var("MARKETPLACE_AUTH__ID_TOKEN_ALG");
        env::remove_var("MARKETPLACE_RESILIENCE__TRUST_FORWARDED_FOR");
        env::remove_var("CONFIG_FILE");
        env::remove_var("PORT");
    }
}

#[test]
#[serial]
fn test_default_config() {
    clear_env_vars();

    let config = AppConfig::load_from_args(ARGS).expect("defaults should load");
    assert_eq!(config.server.port, 3000);
    assert_eq!(config.guard.mismatch_redirect, MismatchRedirect::Unauthorized);
    assert_eq!(config.auth.default_role, None);
    assert!(config.auth.secure_cookies);
    assert!(config.resilience.rate_limit_enabled);
    assert!(!config.resilience.trust_forwarded_for);
    assert_eq!(config.auth.id_token_alg, IdTokenAlgorithm::Rs256);

    // Credentials have no defaults.
    assert!(config.validate().is_err());
}

#[test]
#[serial]
fn test_env_override() {
    clear_env_vars();
    unsafe {
        env::set_var("MARKETPLACE_SERVER__PORT", "9090");
        env::set_var("MARKETPLACE_AUTH__DEFAULT_ROLE", "client");
        env::set_var("MARKETPLACE_GUARD__MISMATCH_REDIRECT", "dashboard");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.server.port, 9090);
    assert_eq!(config.auth.default_role, Some(Role::Client));
    assert_eq!(config.guard.mismatch_redirect, MismatchRedirect::Dashboard);

    clear_env_vars();
}

#[test]
#[serial]
fn test_env_supplies_credentials() {
    clear_env_vars();
    unsafe {
        env::set_var("MARKETPLACE_AUTH__CLIENT_ID", "from-env");
        env::set_var("MARKETPLACE_AUTH__ID_TOKEN_ALG", "hs256");
        env::set_var("MARKETPLACE_RESILIENCE__TRUST_FORWARDED_FOR", "true");
    }

    let config = AppConfig::load_from_args(ARGS).expect("Failed to load config");
    assert_eq!(config.auth.client_id, "from-env");
    assert_eq!(config.auth.id_token_alg, IdTokenAlgorithm::Hs256);
    assert!(config.resilience.trust_forwarded_for);

    clear_env_vars();
}

#[test]
#[serial]
fn test_cli_overrides_env() {
    clear_env_vars();
    unsafe {
        env::set_var("MARKETPLACE_SERVER__PORT", "9090");
    }

    let config = AppConfig::load_from_args(["marketplace-auth", "--port", "8081"])
        .expect("Failed to load config");
    assert_eq!(config.server.port, 8081);

    clear_env_vars();
}

#[test]
#[serial]
fn test_file_load() {
    clear_env_vars();

    let dir = tempfile::tempdir().expect("tempdir");
    let file_path = dir.path().join("marketplace.yaml");
    fs::write(
        &file_path,
        r#"
server:
  port: 7070
auth:
  domain: tenant.auth0.com
  client_id: abc
  client_secret: def
  claim_namespace: https://whatever.com
  session_secret: s3cret
  role_ids:
    client: rol_1
    homeowner: rol_2
"#,
    )
    .expect("Failed to write temp config");

    let path = file_path.to_str().expect("utf-8 path");
    let config = AppConfig::load_from_args(["marketplace-auth", "--config", path])
        .expect("Failed to load config from file");
    assert_eq!(config.server.port, 7070);
    assert_eq!(config.auth.role_ids.get("homeowner").map(String::as_str), Some("rol_2"));
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn test_missing_explicit_file_is_an_error() {
    clear_env_vars();
    let result = AppConfig::load_from_args(["marketplace-auth", "--config", "/nonexistent/marketplace.yaml"]);
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_unknown_mismatch_policy_is_rejected() {
    clear_env_vars();
    unsafe {
        env::set_var("MARKETPLACE_GUARD__MISMATCH_REDIRECT", "teleport");
    }
    assert!(AppConfig::load_from_args(ARGS).is_err());
    clear_env_vars();
}
