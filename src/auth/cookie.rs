//! Signed cookie storage for sessions and in-flight logins.
//!
//! Cookie values are HS256 JWTs signed with the configured session secret,
//! so the browser can hold them but not alter them.

use axum::http::HeaderMap;
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use jsonwebtoken::{
    Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode,
    get_current_timestamp,
};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use std::time::Duration;

use super::errors::AuthError;
use super::session::Session;

pub const SESSION_COOKIE: &str = "mp_session";
pub const LOGIN_COOKIE: &str = "mp_login";

/// Lifetime of the login state cookie.
const LOGIN_TTL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    data: T,
    iat: u64,
    exp: u64,
}

/// Data carried from `/auth/login` to `/auth/callback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginState {
    /// CSRF token echoed back by the provider.
    pub state: String,
    /// Validated deep link requested at login.
    pub return_to: Option<String>,
}

/// Encodes and decodes signed cookies.
#[derive(Clone)]
pub struct CookieCodec {
    encoding: EncodingKey,
    decoding: DecodingKey,
    session_ttl: Duration,
    secure: bool,
}

impl std::fmt::Debug for CookieCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CookieCodec")
            .field("session_ttl", &self.session_ttl)
            .field("secure", &self.secure)
            .finish_non_exhaustive()
    }
}

impl CookieCodec {
    pub fn new(secret: &str, session_ttl: Duration, secure: bool) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            session_ttl,
            secure,
        }
    }

    fn sign<T: Serialize>(&self, data: T, ttl: Duration) -> Result<String, AuthError> {
        let now = get_current_timestamp();
        let envelope = Envelope {
            data,
            iat: now,
            exp: now + ttl.as_secs(),
        };
        encode(&Header::new(Algorithm::HS256), &envelope, &self.encoding)
            .map_err(|e| AuthError::SessionEncoding(e.to_string()))
    }

    fn verify<T: DeserializeOwned>(&self, token: &str) -> Option<T> {
        let validation = Validation::new(Algorithm::HS256);
        match decode::<Envelope<T>>(token, &self.decoding, &validation) {
            Ok(data) => Some(data.claims.data),
            Err(e) => {
                tracing::debug!(name: "auth.cookie.rejected", error = %e, "Ignoring invalid cookie");
                None
            }
        }
    }

    // No Max-Age: the cookie lives for the browser session, the token's exp bounds it.
    fn cookie(&self, name: &'static str, value: String) -> Cookie<'static> {
        Cookie::build((name, value))
            .path("/")
            .http_only(true)
            .secure(self.secure)
            .same_site(SameSite::Lax)
            .build()
    }

    /// Session cookie for `session`.
    pub fn session_cookie(&self, session: &Session) -> Result<Cookie<'static>, AuthError> {
        let value = self.sign(session, self.session_ttl)?;
        Ok(self.cookie(SESSION_COOKIE, value))
    }

    /// Session from the request cookies. Missing, tampered or expired cookies are `None`.
    pub fn read_session(&self, jar: &CookieJar) -> Option<Session> {
        jar.get(SESSION_COOKIE)
            .and_then(|c| self.verify::<Session>(c.value()))
    }

    /// Convenience for middleware that only has the headers.
    pub fn session_from_headers(&self, headers: &HeaderMap) -> Option<Session> {
        self.read_session(&CookieJar::from_headers(headers))
    }

    pub fn login_cookie(&self, login: &LoginState) -> Result<Cookie<'static>, AuthError> {
        let value = self.sign(login, LOGIN_TTL)?;
        Ok(self.cookie(LOGIN_COOKIE, value))
    }

    pub fn read_login(&self, jar: &CookieJar) -> Option<LoginState> {
        jar.get(LOGIN_COOKIE)
            .and_then(|c| self.verify::<LoginState>(c.value()))
    }
}

/// Removal cookie for `name`, matching the path it was set with.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build(name).path("/").build()
}
