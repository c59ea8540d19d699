//! Authentication errors and their navigation outcomes.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};

/// Errors raised while authenticating or authorising a request.
///
/// None of these are fatal; each resolves to a redirect or a status code.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Claims could not be read; callers treat this as "no role".
    #[error("Claim extraction failed: {0}")]
    ClaimExtraction(String),

    /// No session at a guarded boundary.
    #[error("Not authenticated")]
    Unauthenticated,

    /// Session role is not permitted at the boundary. Page navigation is
    /// redirected by the guard's mismatch policy; this is the API answer.
    #[error("Role {role} is not permitted")]
    RoleMismatch { role: String },

    /// Caller supplied a redirect target outside the allow-list.
    #[error("Invalid return target: {0}")]
    InvalidReturnTarget(String),

    /// Verified token has no subject.
    #[error("Identity token has no subject")]
    MissingSubject,

    /// Callback `state` did not match the login request.
    #[error("Login state mismatch")]
    StateMismatch,

    /// Provider rejected or failed the code exchange.
    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    /// ID token signature or claims did not validate.
    #[error("Token verification failed: {0}")]
    TokenVerification(#[from] jsonwebtoken::errors::Error),

    /// Management API call failed.
    #[error("Role assignment failed: {0}")]
    RoleAssignment(String),

    /// Session cookie could not be written.
    #[error("Session encoding failed: {0}")]
    SessionEncoding(String),

    /// HTTP transport error talking to the provider.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match &self {
            AuthError::Unauthenticated => StatusCode::UNAUTHORIZED.into_response(),
            AuthError::RoleMismatch { .. } => StatusCode::FORBIDDEN.into_response(),
            AuthError::ClaimExtraction(_)
            | AuthError::InvalidReturnTarget(_)
            | AuthError::MissingSubject
            | AuthError::StateMismatch
            | AuthError::TokenVerification(_) => {
                tracing::warn!(name: "auth.login.rejected", error = %self, "Login rejected");
                Redirect::to("/").into_response()
            }
            AuthError::TokenExchange(_) | AuthError::RoleAssignment(_) | AuthError::Http(_) => {
                tracing::error!(name: "auth.provider.failed", error = %self, "Identity provider call failed");
                (StatusCode::BAD_GATEWAY, self.to_string()).into_response()
            }
            AuthError::SessionEncoding(_) => {
                tracing::error!(name: "auth.session.encode_failed", error = %self, "Session encoding failed");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        }
    }
}
