//! User and notification API handlers.
//!
//! Agency owners and admins manage the users of their own agency. Anyone
//! may read themselves and change their own name and avatar.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
};
use serde::Deserialize;

use plura_core::{AgencyId, SubAccountId, UserId};

use crate::error::AppError;
use crate::identity::Principal;
use crate::middleware::auth::RequirePrincipal;
use crate::models::{Notification, PermissionWithSubAccount, User, UserDetails, UserPatch};
use crate::services::{AccessScope, NotificationService, TenancyService};
use crate::state::AppState;

use super::{authorize, authorize_privileged, found};

/// Build the users router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/me", get(me).post(init_me))
        .route(
            "/api/users/{user_id}",
            get(user).patch(update_user).delete(delete_user),
        )
        .route("/api/users/{user_id}/permissions", get(user_permissions))
        .route("/api/notifications", post(create_notification))
}

/// Load a user the caller may manage: themselves, or a member of an agency
/// they own or administer.
async fn managed_user(
    state: &AppState,
    principal: &Principal,
    user_id: &UserId,
) -> Result<User, AppError> {
    let target = TenancyService::new(state.store(), state.identity())
        .user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;
    if target.email == principal.email {
        return Ok(target);
    }
    let Some(agency_id) = target.agency_id.clone() else {
        return Err(AppError::Unauthorized);
    };
    authorize_privileged(state, principal, AccessScope::Agency(agency_id)).await?;
    Ok(target)
}

/// The signed-in user with their agency and permissions.
///
/// # Errors
///
/// Returns `AppError::NotFound` if the principal has no user yet.
pub async fn me(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
) -> Result<Json<UserDetails>, AppError> {
    let details = TenancyService::new(state.store(), state.identity())
        .user_details(&principal.email)
        .await?;
    found(details, "user")
}

/// Create the signed-in user from their identity, keeping any role they
/// already have.
///
/// # Errors
///
/// Returns a database error if the user could not be saved.
pub async fn init_me(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
) -> Result<Json<User>, AppError> {
    let user = TenancyService::new(state.store(), state.identity())
        .init_user(&principal, None)
        .await?;
    Ok(Json(user))
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller may not manage the user.
pub async fn user(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(user_id): Path<UserId>,
) -> Result<Json<User>, AppError> {
    Ok(Json(managed_user(&state, &principal, &user_id).await?))
}

/// Change a user's profile, or their role and agency.
///
/// # Errors
///
/// Returns `AppError::Forbidden` when someone changes their own role or
/// agency, or moves a user into an agency they do not manage.
pub async fn update_user(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(user_id): Path<UserId>,
    Json(patch): Json<UserPatch>,
) -> Result<Json<User>, AppError> {
    let target = managed_user(&state, &principal, &user_id).await?;

    if patch.role.is_some() || patch.agency_id.is_some() {
        if target.email == principal.email {
            return Err(AppError::Forbidden(
                "you cannot change your own role or agency".to_string(),
            ));
        }
        if let Some(agency_id) = &patch.agency_id
            && Some(agency_id) != target.agency_id.as_ref()
        {
            authorize_privileged(&state, &principal, AccessScope::Agency(agency_id.clone()))
                .await?;
        }
    }

    let user = TenancyService::new(state.store(), state.identity())
        .update_user(&target.email, &patch)
        .await?;
    found(user, "user")
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller may not manage the user.
pub async fn delete_user(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(user_id): Path<UserId>,
) -> Result<StatusCode, AppError> {
    managed_user(&state, &principal, &user_id).await?;
    TenancyService::new(state.store(), state.identity())
        .delete_user(&user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("user".to_string()))?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if the caller may not manage the user.
pub async fn user_permissions(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(user_id): Path<UserId>,
) -> Result<Json<Vec<PermissionWithSubAccount>>, AppError> {
    managed_user(&state, &principal, &user_id).await?;
    let permissions = TenancyService::new(state.store(), state.identity())
        .user_permissions(&user_id)
        .await?;
    Ok(Json(permissions))
}

/// Activity log request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateNotificationRequest {
    pub description: String,
    #[serde(default)]
    pub agency_id: Option<AgencyId>,
    #[serde(default)]
    pub sub_account_id: Option<SubAccountId>,
}

/// Record an activity against an agency or sub-account the caller can
/// access. Answers `null` if no user could be found to attribute it to.
///
/// # Errors
///
/// Returns `AppError::MissingScope` if neither an agency nor a sub-account
/// is given, and `AppError::BadRequest` if the sub-account is not under the
/// given agency.
pub async fn create_notification(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Json(body): Json<CreateNotificationRequest>,
) -> Result<(StatusCode, Json<Option<Notification>>), AppError> {
    let scope = match (&body.sub_account_id, &body.agency_id) {
        (Some(sub_account_id), _) => AccessScope::SubAccount(sub_account_id.clone()),
        (None, Some(agency_id)) => AccessScope::Agency(agency_id.clone()),
        (None, None) => return Err(AppError::MissingScope),
    };
    if body.description.trim().is_empty() {
        return Err(AppError::BadRequest("description is required".to_string()));
    }
    authorize(&state, &principal, scope).await?;

    let notification = NotificationService::new(state.store())
        .save_activity_log(
            Some(&principal),
            body.description.trim(),
            body.agency_id.as_ref(),
            body.sub_account_id.as_ref(),
        )
        .await?;
    let status = if notification.is_some() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    Ok((status, Json(notification)))
}
