//! Role-gated access to protected boundaries.
//!
//! The [`AccessPolicy`] maps path prefixes to the roles allowed behind them;
//! [`AccessGuard::check`] turns a session and a required-role set into a
//! [`GuardDecision`]. The middleware runs the check on every request, so a
//! role change takes effect on the next navigation.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::Deserialize;

use super::roles::{self, Role, SIGNUP_PATH, UNAUTHORIZED_PATH};
use super::session::Session;
use crate::AppState;

/// Where an authenticated user with the wrong role is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MismatchRedirect {
    /// The generic `/unauthorized` page.
    #[default]
    Unauthorized,
    /// The user's own `/dashboard/{role}`.
    Dashboard,
}

/// Outcome of a guard check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Render,
    /// No session; go log in and come back to `return_to`.
    RedirectToLogin { return_to: String },
    /// Authenticated but not permitted here.
    RedirectTo(String),
}

impl GuardDecision {
    pub fn is_render(&self) -> bool {
        matches!(self, GuardDecision::Render)
    }
}

/// A guarded boundary: a path prefix and the roles permitted behind it.
///
/// An empty role list admits any authenticated user.
#[derive(Debug, Clone)]
pub struct Boundary {
    pub prefix: String,
    pub roles: Vec<Role>,
}

/// Static mapping of guarded boundaries.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    boundaries: Vec<Boundary>,
}

impl AccessPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn guard(mut self, prefix: &str, roles: &[Role]) -> Self {
        self.boundaries.push(Boundary {
            prefix: prefix.trim_end_matches('/').to_string(),
            roles: roles.to_vec(),
        });
        self
    }

    /// The marketplace pages: per-role onboarding and dashboards, and role
    /// selection for any signed-in user.
    pub fn marketplace() -> Self {
        let mut policy = Self::new().guard(SIGNUP_PATH, &[]);
        for role in Role::ALL {
            policy = policy
                .guard(&format!("/{}", role.slug()), &[role])
                .guard(&roles::dashboard(Some(role)), &[role]);
        }
        policy
    }

    pub fn boundaries(&self) -> &[Boundary] {
        &self.boundaries
    }

    /// Longest boundary containing `path`, segment aligned.
    pub fn boundary_for(&self, path: &str) -> Option<&Boundary> {
        self.boundaries
            .iter()
            .filter(|b| path_within(path, &b.prefix))
            .max_by_key(|b| b.prefix.len())
    }
}

fn path_within(path: &str, prefix: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Evaluates sessions against boundaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccessGuard {
    mismatch: MismatchRedirect,
}

impl AccessGuard {
    pub fn new(mismatch: MismatchRedirect) -> Self {
        Self { mismatch }
    }

    /// Decide what happens at a boundary requiring `required` (empty = any
    /// authenticated user). `path` is where the user was heading.
    pub fn check(&self, session: Option<&Session>, required: &[Role], path: &str) -> GuardDecision {
        let Some(session) = session else {
            return GuardDecision::RedirectToLogin {
                return_to: path.to_string(),
            };
        };

        let role = session.role();
        let permitted = required.is_empty() || role.is_some_and(|r| required.contains(&r));
        if permitted {
            return GuardDecision::Render;
        }

        let target = match self.mismatch {
            MismatchRedirect::Unauthorized => UNAUTHORIZED_PATH.to_string(),
            MismatchRedirect::Dashboard => roles::dashboard(role),
        };
        GuardDecision::RedirectTo(target)
    }

    /// [`check`](Self::check) against whatever boundary covers `path`.
    /// Paths outside every boundary render.
    pub fn check_path(
        &self,
        policy: &AccessPolicy,
        session: Option<&Session>,
        path: &str,
    ) -> GuardDecision {
        match policy.boundary_for(path) {
            Some(boundary) => self.check(session, &boundary.roles, path),
            None => GuardDecision::Render,
        }
    }
}

/// Login URL that returns to `path` afterwards.
pub fn login_redirect(path: &str) -> String {
    let encoded: String = url::form_urlencoded::byte_serialize(path.as_bytes()).collect();
    format!("/auth/login?returnTo={encoded}")
}

/// Decoded form of a request path, as the router's `Path` extractors see it.
///
/// `None` for paths that do not decode to UTF-8 or that carry `.`/`..`
/// segments; those never reach a handler.
pub fn canonical_path(raw: &str) -> Option<String> {
    let decoded = urlencoding::decode(raw).ok()?;
    if decoded
        .split(['/', '\\'])
        .any(|segment| segment == "." || segment == "..")
    {
        return None;
    }
    Some(decoded.into_owned())
}

/// Runs the access guard before every request.
pub async fn access_guard_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(path) = canonical_path(request.uri().path()) else {
        tracing::warn!(
            name: "auth.guard.malformed_path",
            path = %request.uri().path(),
            "Refusing non-canonical path"
        );
        return StatusCode::NOT_FOUND.into_response();
    };
    let session = state.cookies.session_from_headers(request.headers());

    match state
        .guard
        .check_path(&state.policy, session.as_ref(), &path)
    {
        GuardDecision::Render => next.run(request).await,
        GuardDecision::RedirectToLogin { return_to } => {
            tracing::info!(
                name: "auth.guard.unauthenticated",
                path = %path,
                "Redirecting to login"
            );
            let return_to = match request.uri().query() {
                Some(query) => format!("{return_to}?{query}"),
                None => return_to,
            };
            Redirect::to(&login_redirect(&return_to)).into_response()
        }
        GuardDecision::RedirectTo(target) => {
            tracing::info!(
                name: "auth.guard.role_mismatch",
                path = %path,
                role = session.as_ref().and_then(Session::role).map_or("none", Role::as_str),
                target = %target,
                "Role not permitted"
            );
            Redirect::to(&target).into_response()
        }
    }
}
