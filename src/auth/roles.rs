//! Marketplace roles and the role router.
//!
//! A role is one of a closed set. Anything else coming from the identity
//! provider is treated as "no role" and routed to role selection.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Role selection page for users without a recognised role.
pub const SIGNUP_PATH: &str = "/signup";

/// Page shown when an authenticated user hits a boundary their role does not permit.
pub const UNAUTHORIZED_PATH: &str = "/unauthorized";

/// A marketplace role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    ServiceProvider,
    Homeowner,
}

impl Role {
    /// Every role, in a stable order.
    pub const ALL: [Role; 3] = [Role::Client, Role::ServiceProvider, Role::Homeowner];

    /// Parse a claim value. Unknown values are `None`, never an error.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "client" => Some(Role::Client),
            "service_provider" => Some(Role::ServiceProvider),
            "homeowner" => Some(Role::Homeowner),
            _ => None,
        }
    }

    /// Claim value of the role.
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ServiceProvider => "service_provider",
            Role::Homeowner => "homeowner",
        }
    }

    /// URL segment for the role (`service-provider`, ...).
    pub fn slug(self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::ServiceProvider => "service-provider",
            Role::Homeowner => "homeowner",
        }
    }

    /// Human readable label.
    pub fn label(self) -> &'static str {
        match self {
            Role::Client => "Client",
            Role::ServiceProvider => "Service Provider",
            Role::Homeowner => "Homeowner",
        }
    }

    pub fn from_slug(slug: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|role| role.slug() == slug)
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Onboarding destination for a role; role selection when absent.
pub fn route(role: Option<Role>) -> &'static str {
    match role {
        Some(Role::ServiceProvider) => "/service-provider/onboarding",
        Some(Role::Client) => "/client/onboarding",
        Some(Role::Homeowner) => "/homeowner/onboarding",
        None => SIGNUP_PATH,
    }
}

/// [`route`] for an unparsed role value.
pub fn route_str(role: &str) -> &'static str {
    route(Role::parse(role))
}

/// Role-specific dashboard; role selection when absent.
pub fn dashboard(role: Option<Role>) -> String {
    match role {
        Some(role) => format!("/dashboard/{}", role.slug()),
        None => SIGNUP_PATH.to_string(),
    }
}

/// Every path [`route`] can produce.
pub fn destinations() -> impl Iterator<Item = &'static str> {
    Role::ALL
        .into_iter()
        .map(|role| route(Some(role)))
        .chain(std::iter::once(SIGNUP_PATH))
}
