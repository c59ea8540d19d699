//! `/auth` endpoints: login, callback, logout, current user and role selection.

use axum::{
    Form, Json,
    extract::{Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::{Cookie, CookieJar};
use serde::Deserialize;
use uuid::Uuid;

use super::cookie::{LOGIN_COOKIE, LoginState, SESSION_COOKIE, removal};
use super::errors::AuthError;
use super::guard::login_redirect;
use super::redirect::{resolve_return_to, validate_return_target};
use super::roles::{self, Role, SIGNUP_PATH};
use super::session::UserView;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(rename = "returnTo", default)]
    pub return_to: Option<String>,
}

/// GET /auth/login - Redirect to the hosted login page.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<LoginQuery>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let return_to = query.return_to.as_deref().and_then(|target| {
        validate_return_target(target, &state.policy)
            .inspect_err(|e| {
                tracing::warn!(name: "auth.redirect.rejected", error = %e, "Dropping returnTo");
            })
            .ok()
    });

    let csrf = Uuid::new_v4().simple().to_string();
    let cookie = state.cookies.login_cookie(&LoginState {
        state: csrf.clone(),
        return_to,
    })?;

    tracing::debug!(name: "auth.login.started", "Redirecting to identity provider");
    Ok((
        jar.add(cookie),
        Redirect::to(&state.identity.authorize_url(&csrf)),
    ))
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// GET /auth/callback - Finish login and establish the session.
///
/// The login cookie is single use: it is cleared whatever the outcome.
pub async fn callback(
    State(state): State<AppState>,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> (CookieJar, Response) {
    let login = state.cookies.read_login(&jar);
    let jar = jar.remove(removal(LOGIN_COOKIE));

    match complete_login(&state, login, &query).await {
        Ok(Some((cookie, target))) => (jar.add(cookie), Redirect::to(&target).into_response()),
        Ok(None) => (jar, Redirect::to("/").into_response()),
        Err(e) => (jar, e.into_response()),
    }
}

/// Session cookie and redirect target for a successful callback; `None`
/// when the provider reported an error or sent no code.
async fn complete_login(
    state: &AppState,
    login: Option<LoginState>,
    query: &CallbackQuery,
) -> Result<Option<(Cookie<'static>, String)>, AuthError> {
    if let Some(error) = &query.error {
        tracing::warn!(
            name: "auth.callback.provider_error",
            error = %error,
            description = ?query.error_description,
            "Identity provider returned an error"
        );
        return Ok(None);
    }

    let login = login
        .filter(|login| query.state.as_deref() == Some(login.state.as_str()))
        .ok_or(AuthError::StateMismatch)?;

    let Some(code) = query.code.as_deref().filter(|c| !c.is_empty()) else {
        tracing::warn!(name: "auth.callback.no_code", "Callback without authorization code");
        return Ok(None);
    };

    let claims = state.identity.exchange_code(code).await?;
    let session = state.augmenter.augment(&claims)?;
    let target = resolve_return_to(
        login.return_to.as_deref(),
        &session,
        &state.policy,
        &state.guard,
    );
    let cookie = state.cookies.session_cookie(&session)?;

    tracing::info!(
        name: "auth.callback.completed",
        sub = %session.user.sub,
        role = ?session.user.role,
        target = %target,
        "User logged in"
    );

    Ok(Some((cookie, target)))
}

/// GET /auth/logout - Drop the session here and at the provider.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Redirect) {
    if let Some(session) = state.cookies.read_session(&jar) {
        tracing::info!(name: "auth.logout", sub = %session.user.sub, "User logged out");
    }
    (
        jar.remove(removal(SESSION_COOKIE)),
        Redirect::to(&state.identity.logout_url()),
    )
}

/// GET /auth/me - Current user.
pub async fn me(State(state): State<AppState>, jar: CookieJar) -> Result<Json<UserView>, AuthError> {
    state
        .cookies
        .read_session(&jar)
        .map(|session| Json(session.user))
        .ok_or(AuthError::Unauthenticated)
}

#[derive(Debug, Deserialize)]
pub struct RoleSelection {
    pub role: String,
}

/// POST /auth/role - First-time role selection.
pub async fn select_role(
    State(state): State<AppState>,
    jar: CookieJar,
    Form(form): Form<RoleSelection>,
) -> Result<(CookieJar, Redirect), AuthError> {
    let Some(session) = state.cookies.read_session(&jar) else {
        return Ok((jar, Redirect::to(&login_redirect(SIGNUP_PATH))));
    };

    if let Some(current) = session.role() {
        tracing::debug!(role = %current, "Role already selected");
        return Ok((jar, Redirect::to(roles::route(Some(current)))));
    }

    let Some(role) = Role::parse(&form.role) else {
        tracing::warn!(name: "auth.role.invalid", role = %form.role, "Unknown role selected");
        return Ok((jar, Redirect::to(SIGNUP_PATH)));
    };

    state.identity.assign_role(&session.user.sub, role).await?;
    let session = session.with_role(role);
    let cookie = state.cookies.session_cookie(&session)?;
    Ok((jar.add(cookie), Redirect::to(&session.return_to)))
}
