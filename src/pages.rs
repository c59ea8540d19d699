//! HTML pages behind the guard.
//!
//! Deliberately plain: the marketplace front end renders the real screens,
//! these exist so every boundary the guard protects has something to serve.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::AppState;
use crate::auth::roles::{self, Role};
use crate::auth::session::Session;

/// Generate the HTML shell for a page.
fn html_shell(title: &str, content: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1">
    <title>{title} - Marketplace</title>
</head>
<body>
    <header>
        <a href="/">Marketplace</a>
    </header>
    <main id="app">
        {content}
    </main>
</body>
</html>"#
    )
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

fn account_bar(session: &Session) -> String {
    format!(
        r#"<p>Signed in as {} · <a href="/auth/logout">Log out</a></p>"#,
        escape_html(&session.user.email)
    )
}

fn current_session(state: &AppState, jar: &CookieJar) -> Option<Session> {
    state.cookies.read_session(jar)
}

/// GET /
pub async fn home(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let content = match current_session(&state, &jar) {
        Some(session) => format!(
            r#"{}<p><a href="{}">Continue</a></p>"#,
            account_bar(&session),
            session.return_to
        ),
        None => r#"<h1>Find work. Hire help.</h1><p><a href="/auth/login">Log in or sign up</a></p>"#
            .to_string(),
    };
    Html(html_shell("Home", &content))
}

/// GET /signup - Role selection.
pub async fn signup(State(state): State<AppState>, jar: CookieJar) -> Html<String> {
    let header = current_session(&state, &jar)
        .map(|s| account_bar(&s))
        .unwrap_or_default();
    let buttons: String = Role::ALL
        .iter()
        .map(|role| {
            format!(
                r#"<button type="submit" name="role" value="{}">I am a {}</button>"#,
                role.as_str(),
                role.label()
            )
        })
        .collect();
    let content = format!(
        r#"{header}<h1>How will you use the marketplace?</h1>
        <form method="post" action="/auth/role">{buttons}</form>"#
    );
    Html(html_shell("Choose your role", &content))
}

/// GET /unauthorized
pub async fn unauthorized(State(state): State<AppState>, jar: CookieJar) -> Response {
    let home_link = match current_session(&state, &jar) {
        Some(session) => roles::dashboard(session.role()),
        None => "/".to_string(),
    };
    let content = format!(
        r#"<h1>You don't have access to that page</h1><p><a href="{home_link}">Go back</a></p>"#
    );
    (StatusCode::FORBIDDEN, Html(html_shell("Unauthorized", &content))).into_response()
}

/// GET /{role}/onboarding
pub async fn onboarding(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(slug): Path<String>,
) -> Response {
    let Some(role) = Role::from_slug(&slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let header = current_session(&state, &jar)
        .map(|s| account_bar(&s))
        .unwrap_or_default();
    let content = format!(
        r#"{header}<h1>Welcome, {label}</h1>
        <p>Let's set up your {label} profile.</p>
        <p><a href="{dashboard}">Skip to dashboard</a></p>"#,
        label = role.label(),
        dashboard = roles::dashboard(Some(role)),
    );
    Html(html_shell("Onboarding", &content)).into_response()
}

/// GET /dashboard/{role}
pub async fn dashboard(
    State(state): State<AppState>,
    jar: CookieJar,
    Path(slug): Path<String>,
) -> Response {
    let Some(role) = Role::from_slug(&slug) else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let header = current_session(&state, &jar)
        .map(|s| account_bar(&s))
        .unwrap_or_default();
    let content = format!(r#"{header}<h1>{} dashboard</h1>"#, role.label());
    Html(html_shell("Dashboard", &content)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn test_shell_includes_title() {
        assert!(html_shell("Dashboard", "<p>hi</p>").contains("<title>Dashboard - Marketplace</title>"));
    }
}
