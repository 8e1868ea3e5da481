//! JSON API handlers.
//!
//! Handlers authorize against the agency or sub-account a request touches,
//! then call into the services. Lookups that find nothing answer 404.

pub mod agencies;
pub mod entry;
pub mod pipelines;
pub mod sub_accounts;
pub mod users;

use axum::{Json, Router};

use plura_core::{AgencyId, SubAccountId};

use crate::error::AppError;
use crate::identity::Principal;
use crate::services::{Access, AccessDecision, AccessScope, AccessService, NotificationService};
use crate::state::AppState;

/// Build the complete API router.
pub fn router() -> Router<AppState> {
    Router::new()
        .merge(entry::router())
        .merge(agencies::router())
        .merge(sub_accounts::router())
        .merge(pipelines::router())
        .merge(users::router())
}

/// Authorize a signed-in principal for `scope`.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub(crate) async fn authorize(
    state: &AppState,
    principal: &Principal,
    scope: AccessScope,
) -> Result<Access, AppError> {
    match AccessService::new(state.store(), state.identity())
        .authorize(Some(principal), &scope)
        .await?
    {
        AccessDecision::Allowed(access) => Ok(*access),
        AccessDecision::SignIn | AccessDecision::Unauthorized => Err(AppError::Unauthorized),
    }
}

/// Authorize for `scope` and require an owner or admin.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied, or
/// `AppError::Forbidden` for a sub-account role.
pub(crate) async fn authorize_privileged(
    state: &AppState,
    principal: &Principal,
    scope: AccessScope,
) -> Result<Access, AppError> {
    let access = authorize(state, principal, scope).await?;
    if !access.role.is_agency_privileged() {
        return Err(AppError::Forbidden(
            "only agency owners and admins may do this".to_string(),
        ));
    }
    Ok(access)
}

/// Answer with `value`, or 404 naming `what`.
///
/// # Errors
///
/// Returns `AppError::NotFound` if `value` is `None`.
pub(crate) fn found<T>(value: Option<T>, what: &str) -> Result<Json<T>, AppError> {
    value
        .map(Json)
        .ok_or_else(|| AppError::NotFound(what.to_string()))
}

/// Record an activity for the acting principal.
///
/// # Errors
///
/// Returns an error if the notification could not be written.
pub(crate) async fn log_activity(
    state: &AppState,
    principal: &Principal,
    description: &str,
    agency_id: Option<&AgencyId>,
    sub_account_id: Option<&SubAccountId>,
) -> Result<(), AppError> {
    NotificationService::new(state.store())
        .save_activity_log(Some(principal), description, agency_id, sub_account_id)
        .await?;
    Ok(())
}
