//! Identity token claims and the namespaced role claim reader.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::errors::AuthError;
use super::roles::Role;

/// Claims of a verified ID token.
///
/// Standard fields are typed; everything else (including the namespaced
/// custom claims) lands in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityClaims {
    #[serde(default)]
    pub sub: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl IdentityClaims {
    /// Build claims from an arbitrary JSON value. Anything that is not a
    /// well-formed claims object gives empty claims.
    pub fn from_value(value: Value) -> Self {
        serde_json::from_value(value).unwrap_or_default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }
}

/// Reads the role from `<namespace>/roles`.
#[derive(Debug, Clone)]
pub struct RoleClaimReader {
    key: String,
}

impl RoleClaimReader {
    /// `namespace` is the tenant claim namespace, e.g. `https://example.com`.
    pub fn new(namespace: &str) -> Self {
        Self {
            key: format!("{}/roles", namespace.trim_end_matches('/')),
        }
    }

    /// The full claim key being read.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Strict read: a present but malformed claim is an error.
    pub fn try_read(&self, claims: &IdentityClaims) -> Result<Option<String>, AuthError> {
        let Some(value) = claims.get(&self.key) else {
            return Ok(None);
        };
        let roles = value
            .as_array()
            .ok_or_else(|| AuthError::ClaimExtraction(format!("{} is not an array", self.key)))?;
        match roles.first() {
            None => Ok(None),
            Some(Value::String(role)) => Ok(Some(role.clone())),
            Some(other) => Err(AuthError::ClaimExtraction(format!(
                "{} starts with a non-string entry: {other}",
                self.key
            ))),
        }
    }

    /// First element of the roles array, as found in the token.
    ///
    /// Missing key and empty array yield `None`; so does a malformed claim,
    /// which is logged and otherwise ignored.
    pub fn read(&self, claims: &IdentityClaims) -> Option<String> {
        self.try_read(claims).unwrap_or_else(|e| {
            tracing::warn!(name: "auth.claims.malformed", error = %e, "Treating user as having no role");
            None
        })
    }

    /// [`read`](Self::read) narrowed to the known roles.
    pub fn read_role(&self, claims: &IdentityClaims) -> Option<Role> {
        let raw = self.read(claims)?;
        let role = Role::parse(&raw);
        if role.is_none() {
            tracing::debug!(
                name: "auth.claims.unknown_role",
                role = %raw,
                "Ignoring unrecognised role claim"
            );
        }
        role
    }
}
