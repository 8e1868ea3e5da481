//! Authentication extractors.
//!
//! The session token comes from `Authorization: Bearer <token>` or, for
//! browser requests, the `__session` cookie. The identity provider resolves
//! it to a [`Principal`].
//!
//! # Example
//!
//! ```rust,ignore
//! async fn protected_handler(
//!     RequirePrincipal(principal): RequirePrincipal,
//! ) -> impl IntoResponse {
//!     format!("Hello, {}!", principal.name)
//! }
//! ```

use axum::{
    Json,
    extract::FromRequestParts,
    http::{StatusCode, header, request::Parts},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::error::{AppError, set_sentry_user};
use crate::identity::Principal;
use crate::state::AppState;

/// Cookie carrying the session token in browser requests.
pub const SESSION_COOKIE: &str = "__session";

/// Where clients are sent when they need to sign in.
pub const SIGN_IN_PATH: &str = "/sign-in";

/// Read the session token from the request headers.
#[must_use]
pub fn session_token(parts: &Parts) -> Option<String> {
    if let Some(token) = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
    {
        return Some(token.to_string());
    }

    parts
        .headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == SESSION_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

async fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Principal>, AppError> {
    let Some(token) = session_token(parts) else {
        return Ok(None);
    };
    let principal = state.identity().current_principal(&token).await?;
    if let Some(principal) = &principal {
        set_sentry_user(principal.id.as_str(), principal.email.as_str());
    }
    Ok(principal)
}

/// Extractor for the current principal, if any.
///
/// Unlike [`RequirePrincipal`], an anonymous request is not rejected.
pub struct CurrentPrincipal(pub Option<Principal>);

impl FromRequestParts<AppState> for CurrentPrincipal {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(Self(resolve(parts, state).await?))
    }
}

/// Extractor that requires a signed-in principal.
pub struct RequirePrincipal(pub Principal);

/// Error returned when a principal is required but could not be resolved.
pub enum PrincipalRejection {
    /// No session, or the session is unknown to the identity provider.
    SignIn,
    /// The identity provider could not be asked.
    Failed(AppError),
}

impl IntoResponse for PrincipalRejection {
    fn into_response(self) -> Response {
        match self {
            Self::SignIn => sign_in_required(),
            Self::Failed(err) => err.into_response(),
        }
    }
}

impl FromRequestParts<AppState> for RequirePrincipal {
    type Rejection = PrincipalRejection;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        resolve(parts, state)
            .await
            .map_err(PrincipalRejection::Failed)?
            .map(Self)
            .ok_or(PrincipalRejection::SignIn)
    }
}

/// 401 pointing the client at the sign-in page.
#[must_use]
pub fn sign_in_required() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(header::LOCATION, SIGN_IN_PATH)],
        Json(json!({ "error": "Sign in required" })),
    )
        .into_response()
}
