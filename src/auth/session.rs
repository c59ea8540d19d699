//! Session records and the post-callback session augmenter.

use serde::{Deserialize, Serialize};

use super::claims::{IdentityClaims, RoleClaimReader};
use super::errors::AuthError;
use super::roles::{self, Role};

/// The user as seen by the application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserView {
    /// Stable identity provider subject (`auth0|...`).
    pub sub: String,
    pub role: Option<Role>,
    pub email: String,
}

/// An authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub user: UserView,
    /// Post-login destination, always an internal path.
    pub return_to: String,
}

impl Session {
    pub fn role(&self) -> Option<Role> {
        self.user.role
    }

    /// Replace the role and recompute the destination.
    pub fn with_role(mut self, role: Role) -> Self {
        self.user.role = Some(role);
        self.return_to = roles::route(Some(role)).to_string();
        self
    }
}

/// Turns verified provider claims into an application [`Session`].
#[derive(Debug, Clone)]
pub struct SessionAugmenter {
    reader: RoleClaimReader,
    default_role: Option<Role>,
}

impl SessionAugmenter {
    pub fn new(reader: RoleClaimReader) -> Self {
        Self {
            reader,
            default_role: None,
        }
    }

    /// Role given to users whose token carries none.
    pub fn with_default_role(mut self, role: Option<Role>) -> Self {
        self.default_role = role;
        self
    }

    /// Build the session for a completed callback.
    ///
    /// Only a missing subject is rejected. Role problems never abort the
    /// login; they route the user to role selection instead.
    pub fn augment(&self, claims: &IdentityClaims) -> Result<Session, AuthError> {
        let sub = claims
            .sub
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingSubject)?
            .to_string();

        let role = self.reader.read_role(claims).or(self.default_role);
        let return_to = roles::route(role).to_string();

        tracing::debug!(
            name: "auth.session.augmented",
            sub = %sub,
            role = ?role,
            return_to = %return_to,
            "Session augmented"
        );

        Ok(Session {
            user: UserView {
                sub,
                role,
                email: claims.email.clone().unwrap_or_default(),
            },
            return_to,
        })
    }
}
