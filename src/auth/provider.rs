//! Identity provider client (Auth0).
//!
//! The provider is reached only through [`IdentityProvider`], so handlers can
//! be exercised with a fake in tests. [`Auth0Client`] is built once per
//! process from configuration and shared behind an `Arc`.

use async_trait::async_trait;
use jsonwebtoken::errors::{Error as JwtError, ErrorKind};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Header, Validation, decode, decode_header};
use serde::Deserialize;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use url::Url;

use super::claims::IdentityClaims;
use super::errors::AuthError;
use super::roles::Role;
use crate::config::{AuthConfig, IdTokenAlgorithm};

/// Scopes requested at login.
const LOGIN_SCOPE: &str = "openid profile email";

/// Management tokens are refreshed this long before they expire.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// Signing keys are refetched after this long.
const JWKS_TTL: Duration = Duration::from_secs(10 * 60);

/// Minimum gap between refetches triggered by an unknown `kid`.
const JWKS_MIN_REFRESH: Duration = Duration::from_secs(30);

#[async_trait]
pub trait IdentityProvider: Send + Sync + std::fmt::Debug {
    /// Hosted login URL carrying the CSRF `state`.
    fn authorize_url(&self, state: &str) -> String;

    /// Exchange an authorization code for verified ID token claims.
    async fn exchange_code(&self, code: &str) -> Result<IdentityClaims, AuthError>;

    /// URL that ends the provider session and comes back to the app.
    fn logout_url(&self) -> String;

    /// Persist `role` on the provider side for user `sub`.
    async fn assign_role(&self, sub: &str, role: Role) -> Result<(), AuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug)]
struct CachedJwks {
    keys: JwkSet,
    fetched_at: Instant,
}

#[derive(Debug)]
struct ManagementToken {
    value: String,
    refresh_at: Instant,
}

/// Auth0 tenant client.
#[derive(Debug)]
pub struct Auth0Client {
    domain: String,
    client_id: String,
    client_secret: String,
    audience: Option<String>,
    callback_url: String,
    base_url: String,
    role_ids: HashMap<Role, String>,
    id_token_alg: IdTokenAlgorithm,
    http: reqwest::Client,
    /// Tenant signing keys, fetched on first RS256 verification.
    jwks: Mutex<Option<CachedJwks>>,
    /// Management API token, fetched on first role assignment.
    management: Mutex<Option<ManagementToken>>,
}

impl Auth0Client {
    pub fn new(config: &AuthConfig, base_url: &str) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let role_ids = config
            .role_ids
            .iter()
            .filter_map(|(name, id)| match Role::parse(name) {
                Some(role) => Some((role, id.clone())),
                None => {
                    tracing::warn!(role = %name, "Ignoring role id for unknown role");
                    None
                }
            })
            .collect();

        let base_url = base_url.trim_end_matches('/').to_string();
        Ok(Self {
            domain: config.domain.trim_end_matches('/').to_string(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            audience: config.audience.clone().filter(|a| !a.is_empty()),
            callback_url: format!("{base_url}/auth/callback"),
            base_url,
            role_ids,
            id_token_alg: config.id_token_alg,
            http,
            jwks: Mutex::new(None),
            management: Mutex::new(None),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, AuthError> {
        Url::parse(&format!("https://{}{path}", self.domain))
            .map_err(|e| AuthError::TokenExchange(format!("invalid tenant domain: {e}")))
    }

    fn issuer(&self) -> String {
        format!("https://{}/", self.domain)
    }

    fn validation(&self, alg: Algorithm) -> Validation {
        let mut validation = Validation::new(alg);
        validation.set_audience(&[&self.client_id]);
        validation.set_issuer(&[self.issuer()]);
        validation
    }

    /// Verify an ID token with the configured scheme.
    pub async fn verify_id_token(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        match self.id_token_alg {
            IdTokenAlgorithm::Hs256 => self.verify_with_secret(token),
            IdTokenAlgorithm::Rs256 => {
                let header = decode_header(token)?;
                let kid = header.kid.as_deref().ok_or_else(|| {
                    JwtError::from(ErrorKind::MissingRequiredClaim("kid".to_string()))
                })?;
                let keys = self.signing_keys(kid).await?;
                self.verify_with_jwks(token, &header, &keys)
            }
        }
    }

    /// HS256 token signed with the client secret.
    fn verify_with_secret(&self, token: &str) -> Result<IdentityClaims, AuthError> {
        let key = DecodingKey::from_secret(self.client_secret.as_bytes());
        let data = decode::<IdentityClaims>(token, &key, &self.validation(Algorithm::HS256))?;
        Ok(data.claims)
    }

    /// Asymmetric token checked against the tenant's published keys.
    /// Symmetric algorithms are refused so a public key is never used as an
    /// HMAC secret.
    fn verify_with_jwks(
        &self,
        token: &str,
        header: &Header,
        keys: &JwkSet,
    ) -> Result<IdentityClaims, AuthError> {
        if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
            return Err(JwtError::from(ErrorKind::InvalidAlgorithm).into());
        }
        let jwk = header
            .kid
            .as_deref()
            .and_then(|kid| keys.find(kid))
            .ok_or_else(|| JwtError::from(ErrorKind::InvalidKeyFormat))?;
        let key = DecodingKey::from_jwk(jwk)?;
        let data = decode::<IdentityClaims>(token, &key, &self.validation(header.alg))?;
        Ok(data.claims)
    }

    /// Cached tenant JWKS. Refetched when stale, or when `kid` is unknown
    /// (key rotation) and the last fetch is not too recent.
    async fn signing_keys(&self, kid: &str) -> Result<JwkSet, AuthError> {
        let mut guard = self.jwks.lock().await;
        let now = Instant::now();
        if let Some(cached) = guard.as_ref() {
            let age = now.duration_since(cached.fetched_at);
            let known = cached.keys.find(kid).is_some();
            if age < JWKS_TTL && (known || age < JWKS_MIN_REFRESH) {
                return Ok(cached.keys.clone());
            }
        }

        let keys = self
            .http
            .get(self.endpoint("/.well-known/jwks.json")?)
            .send()
            .await?
            .error_for_status()?
            .json::<JwkSet>()
            .await?;
        tracing::debug!(name: "auth.jwks.fetched", keys = keys.keys.len(), "Fetched signing keys");

        *guard = Some(CachedJwks {
            keys: keys.clone(),
            fetched_at: now,
        });
        Ok(keys)
    }

    async fn post_token(&self, body: serde_json::Value) -> Result<TokenResponse, AuthError> {
        let response = self
            .http
            .post(self.endpoint("/oauth/token")?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::TokenExchange(format!("{status}: {text}")));
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    /// Cached Management API token; concurrent callers wait on the same fetch.
    async fn management_token(&self) -> Result<String, AuthError> {
        let mut guard = self.management.lock().await;
        if let Some(token) = guard.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let audience = self.endpoint("/api/v2/")?.to_string();
        let response = self
            .post_token(json!({
                "grant_type": "client_credentials",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "audience": audience,
            }))
            .await
            .map_err(|e| AuthError::RoleAssignment(e.to_string()))?;

        let lifetime = Duration::from_secs(response.expires_in.unwrap_or(3600));
        let refresh_at = Instant::now() + lifetime.saturating_sub(TOKEN_REFRESH_MARGIN);
        tracing::debug!(name: "auth.management.token", expires_in = ?lifetime, "Fetched management token");

        let value = response.access_token;
        *guard = Some(ManagementToken {
            value: value.clone(),
            refresh_at,
        });
        Ok(value)
    }
}

#[async_trait]
impl IdentityProvider for Auth0Client {
    fn authorize_url(&self, state: &str) -> String {
        let mut url = match self.endpoint("/authorize") {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Cannot build authorize URL");
                return "/".to_string();
            }
        };
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", &self.callback_url)
                .append_pair("scope", LOGIN_SCOPE)
                .append_pair("state", state);
            if let Some(audience) = &self.audience {
                query.append_pair("audience", audience);
            }
        }
        url.to_string()
    }

    async fn exchange_code(&self, code: &str) -> Result<IdentityClaims, AuthError> {
        let response = self
            .post_token(json!({
                "grant_type": "authorization_code",
                "client_id": self.client_id,
                "client_secret": self.client_secret,
                "code": code,
                "redirect_uri": self.callback_url,
            }))
            .await?;

        let id_token = response
            .id_token
            .ok_or_else(|| AuthError::TokenExchange("response has no id_token".to_string()))?;
        self.verify_id_token(&id_token).await
    }

    fn logout_url(&self) -> String {
        match self.endpoint("/v2/logout") {
            Ok(mut url) => {
                url.query_pairs_mut()
                    .append_pair("client_id", &self.client_id)
                    .append_pair("returnTo", &self.base_url);
                url.to_string()
            }
            Err(e) => {
                tracing::error!(error = %e, "Cannot build logout URL");
                "/".to_string()
            }
        }
    }

    async fn assign_role(&self, sub: &str, role: Role) -> Result<(), AuthError> {
        let role_id = self.role_ids.get(&role).ok_or_else(|| {
            AuthError::RoleAssignment(format!("no provider role id configured for {role}"))
        })?;

        let mut url = self.endpoint("/")?;
        url.path_segments_mut()
            .map_err(|()| AuthError::RoleAssignment("tenant URL cannot take a path".to_string()))?
            .clear()
            .extend(["api", "v2", "users", sub, "roles"]);

        let token = self.management_token().await?;
        let response = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "roles": [role_id] }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AuthError::RoleAssignment(format!("{status}: {text}")));
        }

        tracing::info!(name: "auth.role.assigned", sub = %sub, role = %role, "Role assigned");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{EncodingKey, encode, get_current_timestamp};

    const RSA_KEY: &str = include_str!("../../tests/fixtures/id_token_rsa.pem");
    const JWKS: &str = include_str!("../../tests/fixtures/id_token_jwks.json");

    fn config() -> AuthConfig {
        AuthConfig {
            domain: "tenant.eu.auth0.com".into(),
            client_id: "client-123".into(),
            client_secret: "shh".into(),
            audience: None,
            claim_namespace: "https://whatever.com".into(),
            session_secret: "session".into(),
            session_ttl_secs: 3600,
            secure_cookies: false,
            id_token_alg: IdTokenAlgorithm::Hs256,
            default_role: None,
            role_ids: HashMap::from([
                ("client".to_string(), "rol_client".to_string()),
                ("wizard".to_string(), "rol_wizard".to_string()),
            ]),
        }
    }

    fn client() -> Auth0Client {
        Auth0Client::new(&config(), "http://localhost:3000/").unwrap()
    }

    fn sign(claims: serde_json::Value, secret: &str) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_authorize_url() {
        let url = Url::parse(&client().authorize_url("xyz")).unwrap();
        assert_eq!(url.host_str(), Some("tenant.eu.auth0.com"));
        assert_eq!(url.path(), "/authorize");
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["state"], "xyz");
        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["redirect_uri"], "http://localhost:3000/auth/callback");
        assert_eq!(pairs["scope"], "openid profile email");
        assert!(!pairs.contains_key("audience"));
    }

    #[test]
    fn test_logout_url_returns_to_base() {
        let url = Url::parse(&client().logout_url()).unwrap();
        assert_eq!(url.path(), "/v2/logout");
        let pairs: HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["returnTo"], "http://localhost:3000");
    }

    #[test]
    fn test_unknown_role_ids_are_dropped() {
        let c = client();
        assert_eq!(c.role_ids.len(), 1);
        assert_eq!(c.role_ids[&Role::Client], "rol_client");
    }

    fn id_claims(aud: &str) -> serde_json::Value {
        json!({
            "sub": "auth0|1",
            "aud": aud,
            "iss": "https://tenant.eu.auth0.com/",
            "exp": get_current_timestamp() + 600,
            "https://whatever.com/roles": ["client"]
        })
    }

    fn sign_rs256(claims: &serde_json::Value, kid: &str) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(kid.to_string());
        encode(&header, claims, &EncodingKey::from_rsa_pem(RSA_KEY.as_bytes()).unwrap()).unwrap()
    }

    fn jwks() -> JwkSet {
        serde_json::from_str(JWKS).unwrap()
    }

    #[test]
    fn test_verify_rs256_against_tenant_keys() {
        let token = sign_rs256(&id_claims("client-123"), "test-key-1");
        let header = decode_header(&token).unwrap();
        let claims = client().verify_with_jwks(&token, &header, &jwks()).unwrap();
        assert_eq!(claims.sub.as_deref(), Some("auth0|1"));
    }

    #[test]
    fn test_rs256_rejects_unknown_kid_and_wrong_audience() {
        let c = client();

        let token = sign_rs256(&id_claims("client-123"), "rotated-away");
        let header = decode_header(&token).unwrap();
        assert!(matches!(
            c.verify_with_jwks(&token, &header, &jwks()),
            Err(AuthError::TokenVerification(_))
        ));

        let token = sign_rs256(&id_claims("someone-else"), "test-key-1");
        let header = decode_header(&token).unwrap();
        assert!(c.verify_with_jwks(&token, &header, &jwks()).is_err());
    }

    #[test]
    fn test_jwks_path_refuses_symmetric_tokens() {
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some("test-key-1".to_string());
        let token = encode(
            &header,
            &id_claims("client-123"),
            &EncodingKey::from_secret(b"shh"),
        )
        .unwrap();
        let err = client()
            .verify_with_jwks(&token, &decode_header(&token).unwrap(), &jwks())
            .unwrap_err();
        assert!(matches!(
            err,
            AuthError::TokenVerification(e) if matches!(e.kind(), ErrorKind::InvalidAlgorithm)
        ));
    }

    #[tokio::test]
    async fn test_verify_id_token() {
        let token = sign(
            json!({
                "sub": "auth0|1",
                "email": "a@example.com",
                "aud": "client-123",
                "iss": "https://tenant.eu.auth0.com/",
                "exp": get_current_timestamp() + 600,
                "https://whatever.com/roles": ["homeowner"]
            }),
            "shh",
        );
        let claims = client().verify_id_token(&token).await.unwrap();
        assert_eq!(claims.sub.as_deref(), Some("auth0|1"));
        assert!(claims.get("https://whatever.com/roles").is_some());
    }

    #[test]
    fn test_verify_rejects_wrong_audience_or_secret() {
        let base = json!({
            "sub": "auth0|1",
            "aud": "someone-else",
            "iss": "https://tenant.eu.auth0.com/",
            "exp": get_current_timestamp() + 600,
        });
        assert!(matches!(
            client().verify_with_secret(&sign(base, "shh")),
            Err(AuthError::TokenVerification(_))
        ));

        let good_aud = json!({
            "sub": "auth0|1",
            "aud": "client-123",
            "iss": "https://tenant.eu.auth0.com/",
            "exp": get_current_timestamp() + 600,
        });
        assert!(client().verify_with_secret(&sign(good_aud, "wrong")).is_err());
    }

    #[tokio::test]
    async fn test_assign_role_without_role_id_fails_before_network() {
        let err = client()
            .assign_role("auth0|1", Role::Homeowner)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RoleAssignment(_)));
    }
}
