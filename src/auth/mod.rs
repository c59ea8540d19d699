//! Role-aware authentication.
//!
//! - [`claims`]: identity token claims and the namespaced role claim reader
//! - [`session`]: session records and the post-callback augmenter
//! - [`roles`]: the closed role set and the onboarding router
//! - [`guard`]: route access policy, guard decisions and middleware
//! - [`redirect`]: allow-listing of caller-supplied return targets
//! - [`cookie`]: signed session and login-state cookies
//! - [`provider`]: the identity provider client
//! - [`handlers`]: the `/auth` endpoints

pub mod claims;
pub mod cookie;
pub mod errors;
pub mod guard;
pub mod handlers;
pub mod provider;
pub mod redirect;
pub mod roles;
pub mod session;

pub use claims::{IdentityClaims, RoleClaimReader};
pub use errors::AuthError;
pub use guard::{AccessGuard, AccessPolicy, GuardDecision, MismatchRedirect};
pub use provider::{Auth0Client, IdentityProvider};
pub use roles::Role;
pub use session::{Session, SessionAugmenter, UserView};
