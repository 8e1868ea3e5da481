//! Entry points of the dashboard pages.
//!
//! Each one accepts a pending invitation before deciding access, so a newly
//! invited principal lands straight in their agency.

use axum::{
    Json, Router,
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::get,
};

use plura_core::{AgencyId, SubAccountId};

use crate::error::AppError;
use crate::identity::Principal;
use crate::middleware::auth::{CurrentPrincipal, RequirePrincipal, sign_in_required};
use crate::services::{self, AccessScope, AccessService, Entry, Landing, Sidebar};
use crate::state::AppState;

use super::{authorize, found};

/// Build the entry router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agency", get(enter_agency))
        .route("/api/agency/{agency_id}", get(open_agency))
        .route("/api/agency/{agency_id}/sidebar", get(agency_sidebar))
        .route("/api/subaccount/{sub_account_id}", get(enter_sub_account))
        .route(
            "/api/subaccount/{sub_account_id}/sidebar",
            get(sub_account_sidebar),
        )
}

fn entry_response(entry: Entry) -> Response {
    match entry {
        Entry::SignIn => sign_in_required(),
        Entry::Unauthorized => AppError::Unauthorized.into_response(),
        Entry::Allowed(workspace) => Json(*workspace).into_response(),
    }
}

/// Where the principal should go: sign-in, onboarding, their agency or
/// their first sub-account.
///
/// # Errors
///
/// Returns an error if a datastore or identity call fails.
pub async fn enter_agency(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
) -> Result<Response, AppError> {
    let landing = AccessService::new(state.store(), state.identity())
        .enter_agency(principal.as_ref())
        .await?;
    Ok(match landing {
        Landing::SignIn => sign_in_required(),
        other => Json(other).into_response(),
    })
}

/// An agency with all of its notifications.
///
/// # Errors
///
/// Returns an error if a datastore or identity call fails.
pub async fn open_agency(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<Response, AppError> {
    let entry = AccessService::new(state.store(), state.identity())
        .open_agency(principal.as_ref(), &agency_id)
        .await?;
    Ok(entry_response(entry))
}

/// A sub-account with the notifications its visitor may see.
///
/// # Errors
///
/// Returns an error if a datastore or identity call fails.
pub async fn enter_sub_account(
    State(state): State<AppState>,
    CurrentPrincipal(principal): CurrentPrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<Response, AppError> {
    let entry = AccessService::new(state.store(), state.identity())
        .enter_sub_account(principal.as_ref(), &sub_account_id)
        .await?;
    Ok(entry_response(entry))
}

async fn sidebar_for(
    state: &AppState,
    principal: &Principal,
    target: AccessScope,
) -> Result<Json<Sidebar>, AppError> {
    let access = authorize(state, principal, target.clone()).await?;
    let sidebar = access
        .user
        .as_ref()
        .and_then(|user| services::sidebar(user, &target));
    found(sidebar, "sidebar")
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub async fn agency_sidebar(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<Json<Sidebar>, AppError> {
    sidebar_for(&state, &principal, AccessScope::Agency(agency_id)).await
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub async fn sub_account_sidebar(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<Json<Sidebar>, AppError> {
    sidebar_for(&state, &principal, AccessScope::SubAccount(sub_account_id)).await
}
