//! Agency API handlers.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use serde::Deserialize;

use plura_core::{AgencyId, Role};

use crate::error::AppError;
use crate::middleware::auth::RequirePrincipal;
use crate::models::{Agency, AgencyPatch, Invitation, NotificationWithUser, User};
use crate::services::{
    AccessScope, InvitationService, NotificationService, TenancyService, UpsertAgencyInput,
};
use crate::state::AppState;

use super::{authorize, authorize_privileged, found, log_activity};

/// Build the agencies router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/agencies", post(upsert_agency))
        .route(
            "/api/agencies/{agency_id}",
            patch(update_agency).delete(delete_agency),
        )
        .route("/api/agencies/{agency_id}/team", get(team_members))
        .route(
            "/api/agencies/{agency_id}/invitations",
            get(list_invitations).post(send_invitation),
        )
        .route(
            "/api/agencies/{agency_id}/notifications",
            get(agency_notifications),
        )
}

/// Create an agency owned by the caller, or update one they manage.
///
/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::Unauthorized`
/// when updating an agency the caller does not manage.
pub async fn upsert_agency(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Json(input): Json<UpsertAgencyInput>,
) -> Result<Json<Agency>, AppError> {
    let tenancy = TenancyService::new(state.store(), state.identity());

    let exists = state.store().agency(&input.id).await?.is_some();
    if exists {
        authorize_privileged(&state, &principal, AccessScope::Agency(input.id.clone())).await?;
    } else {
        input.validate()?;
        tenancy.init_user(&principal, Some(Role::AgencyOwner)).await?;
    }

    let agency = tenancy.upsert_agency(&input).await?;
    log_activity(
        &state,
        &principal,
        &format!("Updated agency | {}", agency.name),
        Some(&agency.id),
        None,
    )
    .await?;
    Ok(Json(agency))
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller does not manage the agency.
pub async fn update_agency(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
    Json(patch): Json<AgencyPatch>,
) -> Result<Json<Agency>, AppError> {
    authorize_privileged(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    let agency = TenancyService::new(state.store(), state.identity())
        .update_agency_details(&agency_id, &patch)
        .await?;
    found(agency, "agency")
}

/// Delete an agency with everything in it. Owner only.
///
/// # Errors
///
/// Returns `AppError::Forbidden` unless the caller owns the agency.
pub async fn delete_agency(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<StatusCode, AppError> {
    let access = authorize(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    if access.role != Role::AgencyOwner {
        return Err(AppError::Forbidden(
            "only the agency owner may delete it".to_string(),
        ));
    }
    let deleted = TenancyService::new(state.store(), state.identity())
        .delete_agency(&agency_id)
        .await?;
    if deleted {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound("agency".to_string()))
    }
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller does not manage the agency.
pub async fn team_members(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<Json<Vec<User>>, AppError> {
    authorize_privileged(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    let team = TenancyService::new(state.store(), state.identity())
        .team_members(&agency_id)
        .await?;
    Ok(Json(team))
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller does not manage the agency.
pub async fn list_invitations(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<Json<Vec<Invitation>>, AppError> {
    authorize_privileged(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    let invitations = InvitationService::new(state.store(), state.identity())
        .agency_invitations(&agency_id)
        .await?;
    Ok(Json(invitations))
}

/// Invitation request.
#[derive(Debug, Deserialize)]
pub struct SendInvitationRequest {
    pub email: String,
    pub role: Role,
}

/// Invite someone to the agency.
///
/// # Errors
///
/// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
/// if the email was already invited, or an identity error.
pub async fn send_invitation(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
    Json(body): Json<SendInvitationRequest>,
) -> Result<(StatusCode, Json<Invitation>), AppError> {
    authorize_privileged(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    let invitation = InvitationService::new(state.store(), state.identity())
        .send_invitation(
            body.role,
            &body.email,
            &agency_id,
            &state.invitation_redirect_url(),
        )
        .await?;
    log_activity(
        &state,
        &principal,
        &format!("Invited {}", invitation.email),
        Some(&agency_id),
        None,
    )
    .await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

/// Every notification of the agency, newest first.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller does not manage the agency.
pub async fn agency_notifications(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(agency_id): Path<AgencyId>,
) -> Result<Json<Vec<NotificationWithUser>>, AppError> {
    let access = authorize(&state, &principal, AccessScope::Agency(agency_id.clone())).await?;
    let notifications = NotificationService::new(state.store())
        .agency_notifications(&agency_id, &access.notification_scope)
        .await?;
    Ok(Json(notifications))
}
