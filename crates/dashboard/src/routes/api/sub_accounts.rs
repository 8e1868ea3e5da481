//! Sub-account API handlers: the sub-account itself, its media, funnels
//! and member permissions.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};
use serde::Deserialize;

use plura_core::{Email, MediaId, PermissionId, SubAccountId};

use crate::error::AppError;
use crate::middleware::auth::RequirePrincipal;
use crate::models::{Funnel, Media, Permission, SubAccount, SubAccountMedia};
use crate::services::{
    AccessScope, CreateMediaInput, FunnelService, MediaService, TenancyService,
    UpsertFunnelInput, UpsertSubAccountInput,
};
use crate::state::AppState;

use super::{authorize, authorize_privileged, found, log_activity};

/// Build the sub-accounts router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/subaccounts", post(upsert_sub_account))
        .route(
            "/api/subaccounts/{sub_account_id}",
            get(sub_account_details).delete(delete_sub_account),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/media",
            get(list_media).post(create_media),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/media/{media_id}",
            delete(delete_media),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/funnels",
            post(upsert_funnel),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/permissions",
            put(change_permission),
        )
}

fn scope(id: &SubAccountId) -> AccessScope {
    AccessScope::SubAccount(id.clone())
}

/// Create or update a sub-account of an agency the caller manages.
///
/// Answers `null` if the agency has no owner to grant access to.
///
/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::Unauthorized`
/// if the caller does not manage the agency.
pub async fn upsert_sub_account(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Json(input): Json<UpsertSubAccountInput>,
) -> Result<Json<Option<SubAccount>>, AppError> {
    authorize_privileged(
        &state,
        &principal,
        AccessScope::Agency(input.agency_id.clone()),
    )
    .await?;
    if let Some(existing) = state.store().sub_account(&input.id).await?
        && existing.agency_id != input.agency_id
    {
        return Err(AppError::BadRequest(
            "sub-account belongs to another agency".to_string(),
        ));
    }

    let sub_account = TenancyService::new(state.store(), state.identity())
        .upsert_sub_account(&input)
        .await?;
    if let Some(sub_account) = &sub_account {
        log_activity(
            &state,
            &principal,
            &format!("Updated sub account | {}", sub_account.name),
            None,
            Some(&sub_account.id),
        )
        .await?;
    }
    Ok(Json(sub_account))
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub async fn sub_account_details(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<Json<SubAccount>, AppError> {
    authorize(&state, &principal, scope(&sub_account_id)).await?;
    let sub_account = TenancyService::new(state.store(), state.identity())
        .sub_account_details(&sub_account_id)
        .await?;
    found(sub_account, "sub-account")
}

/// # Errors
///
/// Returns `AppError::Forbidden` for callers below agency admin.
pub async fn delete_sub_account(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<StatusCode, AppError> {
    let access = authorize_privileged(&state, &principal, scope(&sub_account_id)).await?;
    let tenancy = TenancyService::new(state.store(), state.identity());
    let Some(sub_account) = tenancy.sub_account_details(&sub_account_id).await? else {
        return Err(AppError::NotFound("sub-account".to_string()));
    };

    log_activity(
        &state,
        &principal,
        &format!("Deleted a sub account | {}", sub_account.name),
        Some(&access.agency_id),
        None,
    )
    .await?;
    tenancy.delete_sub_account(&sub_account_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// The sub-account with its media, newest first.
///
/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub async fn list_media(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<Json<SubAccountMedia>, AppError> {
    authorize(&state, &principal, scope(&sub_account_id)).await?;
    let media = MediaService::new(state.store())
        .sub_account_media(&sub_account_id)
        .await?;
    found(media, "sub-account")
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::BadRequest`
/// for a link already in the library.
pub async fn create_media(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(input): Json<CreateMediaInput>,
) -> Result<(StatusCode, Json<Media>), AppError> {
    authorize(&state, &principal, scope(&sub_account_id)).await?;
    let media = MediaService::new(state.store())
        .create_media(&sub_account_id, &input)
        .await?;
    log_activity(
        &state,
        &principal,
        &format!("Uploaded a media file | {}", media.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

/// # Errors
///
/// Returns `AppError::NotFound` if the media is not in this sub-account.
pub async fn delete_media(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, media_id)): Path<(SubAccountId, MediaId)>,
) -> Result<StatusCode, AppError> {
    authorize(&state, &principal, scope(&sub_account_id)).await?;
    let Some(media) = MediaService::new(state.store())
        .delete_media(&sub_account_id, &media_id)
        .await?
    else {
        return Err(AppError::NotFound("media".to_string()));
    };
    log_activity(
        &state,
        &principal,
        &format!("Deleted a media file | {}", media.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::BadRequest`
/// for a subdomain already in use.
pub async fn upsert_funnel(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(input): Json<UpsertFunnelInput>,
) -> Result<Json<Funnel>, AppError> {
    authorize(&state, &principal, scope(&sub_account_id)).await?;
    let funnel = FunnelService::new(state.store())
        .upsert_funnel(&sub_account_id, &input)
        .await?;
    log_activity(
        &state,
        &principal,
        &format!("Updated funnel | {}", funnel.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(Json(funnel))
}

/// Permission change request.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePermissionRequest {
    #[serde(default)]
    pub permission_id: Option<PermissionId>,
    pub email: Email,
    pub access: bool,
}

/// Grant or revoke a member's access to the sub-account.
///
/// Answers `null` if the change could not be saved.
///
/// # Errors
///
/// Returns `AppError::Forbidden` for callers below agency admin.
pub async fn change_permission(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(body): Json<ChangePermissionRequest>,
) -> Result<Json<Option<Permission>>, AppError> {
    authorize_privileged(&state, &principal, scope(&sub_account_id)).await?;
    let permission = TenancyService::new(state.store(), state.identity())
        .change_user_permission(body.permission_id, &body.email, &sub_account_id, body.access)
        .await;

    if permission.is_some() {
        let verb = if body.access { "Gave" } else { "Removed" };
        log_activity(
            &state,
            &principal,
            &format!("{verb} {} access to sub account", body.email),
            None,
            Some(&sub_account_id),
        )
        .await?;
    }
    Ok(Json(permission))
}
