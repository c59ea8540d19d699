//! Validation of caller-supplied redirect targets.

use url::Url;

use super::errors::AuthError;
use super::guard::{AccessGuard, AccessPolicy};
use super::roles;
use super::session::Session;

/// Base used only to resolve relative paths; never emitted.
const PROBE_ORIGIN: &str = "http://internal.invalid";

/// Accept `target` only if it is an internal path on the allow-list.
///
/// The allow-list is every guarded boundary plus every role-router
/// destination. Returns the normalised path (with query, if any).
pub fn validate_return_target(target: &str, policy: &AccessPolicy) -> Result<String, AuthError> {
    let reject = || AuthError::InvalidReturnTarget(target.to_string());

    // Only absolute paths; rules out schemes and `//host` / `/\host` forms.
    if !target.starts_with('/') || target.starts_with("//") || target.starts_with("/\\") {
        return Err(reject());
    }

    let base = Url::parse(PROBE_ORIGIN).map_err(|_| reject())?;
    let resolved = base.join(target).map_err(|_| reject())?;
    if resolved.origin() != base.origin() {
        return Err(reject());
    }

    let path = resolved.path();
    let listed = policy.boundary_for(path).is_some() || roles::destinations().any(|d| d == path);
    if !listed {
        return Err(reject());
    }

    Ok(match resolved.query() {
        Some(query) => format!("{path}?{query}"),
        None => path.to_string(),
    })
}

/// Final post-login redirect.
///
/// A requested deep link is honoured only when it validates and the guard
/// would render it for `session`; otherwise the computed
/// `session.return_to` wins.
pub fn resolve_return_to(
    requested: Option<&str>,
    session: &Session,
    policy: &AccessPolicy,
    guard: &AccessGuard,
) -> String {
    let Some(requested) = requested else {
        return session.return_to.clone();
    };

    match validate_return_target(requested, policy) {
        Ok(target) => {
            let path = target.split('?').next().unwrap_or_default();
            if guard.check_path(policy, Some(session), path).is_render() {
                target
            } else {
                session.return_to.clone()
            }
        }
        Err(e) => {
            tracing::warn!(name: "auth.redirect.rejected", error = %e, "Ignoring return target");
            session.return_to.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::roles::Role;
    use crate::auth::session::UserView;

    fn policy() -> AccessPolicy {
        AccessPolicy::marketplace()
    }

    fn session(role: Option<Role>) -> Session {
        Session {
            user: UserView {
                sub: "auth0|1".into(),
                role,
                email: String::new(),
            },
            return_to: roles::route(role).to_string(),
        }
    }

    #[test]
    fn test_accepts_listed_paths() {
        assert_eq!(
            validate_return_target("/client/onboarding", &policy()).unwrap(),
            "/client/onboarding"
        );
        assert_eq!(
            validate_return_target("/dashboard/homeowner?tab=jobs", &policy()).unwrap(),
            "/dashboard/homeowner?tab=jobs"
        );
        assert_eq!(validate_return_target("/signup", &policy()).unwrap(), "/signup");
    }

    #[test]
    fn test_rejects_external_targets() {
        for target in [
            "https://evil.example/client",
            "//evil.example/client",
            "/\\evil.example/client",
            "javascript:alert(1)",
            "client/onboarding",
            "",
        ] {
            assert!(
                matches!(
                    validate_return_target(target, &policy()),
                    Err(AuthError::InvalidReturnTarget(_))
                ),
                "{target} should be rejected"
            );
        }
    }

    #[test]
    fn test_rejects_unlisted_paths() {
        assert!(validate_return_target("/admin", &policy()).is_err());
        assert!(validate_return_target("/", &policy()).is_err());
    }

    #[test]
    fn test_dot_segments_are_normalised_before_listing() {
        // Resolves to /admin, which is not listed.
        assert!(validate_return_target("/client/../admin", &policy()).is_err());
    }

    #[test]
    fn test_resolve_prefers_permitted_deep_link() {
        let guard = AccessGuard::default();
        let s = session(Some(Role::Client));
        assert_eq!(
            resolve_return_to(Some("/dashboard/client"), &s, &policy(), &guard),
            "/dashboard/client"
        );
    }

    #[test]
    fn test_resolve_falls_back_to_computed_default() {
        let guard = AccessGuard::default();
        let s = session(Some(Role::Client));
        assert_eq!(resolve_return_to(None, &s, &policy(), &guard), "/client/onboarding");
        assert_eq!(
            resolve_return_to(Some("https://evil.example"), &s, &policy(), &guard),
            "/client/onboarding"
        );
        // Listed but not permitted for this role.
        assert_eq!(
            resolve_return_to(Some("/dashboard/homeowner"), &s, &policy(), &guard),
            "/client/onboarding"
        );
    }

    #[test]
    fn test_roleless_user_always_lands_on_signup() {
        let guard = AccessGuard::default();
        let s = session(None);
        assert_eq!(
            resolve_return_to(Some("/client/onboarding"), &s, &policy(), &guard),
            "/signup"
        );
    }
}
