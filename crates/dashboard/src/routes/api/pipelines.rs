//! Pipeline API handlers.
//!
//! Everything lives under the owning sub-account, and every pipeline, lane
//! and ticket in a path is checked to belong to it before it is touched.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, post, put},
};

use plura_core::{LaneId, PipelineId, SubAccountId, TicketId};

use crate::error::AppError;
use crate::identity::Principal;
use crate::middleware::auth::RequirePrincipal;
use crate::models::{
    Contact, Lane, LaneDetail, LaneOrder, Pipeline, Tag, TicketDetail, TicketOrder,
};
use crate::services::{
    AccessScope, PipelineService, UpsertContactInput, UpsertLaneInput, UpsertPipelineInput,
    UpsertTagInput, UpsertTicketInput,
};
use crate::state::AppState;

use super::{authorize, log_activity};

/// Build the pipelines router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines",
            get(list_pipelines).post(upsert_pipeline),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}",
            get(pipeline_details).delete(delete_pipeline),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/lanes",
            get(lanes_with_tickets).post(upsert_lane),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/lanes/order",
            put(reorder_lanes),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/lanes/{lane_id}",
            delete(delete_lane),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/tickets",
            post(upsert_ticket),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/tickets/order",
            put(reorder_tickets),
        )
        .route(
            "/api/subaccounts/{sub_account_id}/pipelines/{pipeline_id}/tickets/{ticket_id}",
            delete(delete_ticket),
        )
        .route("/api/subaccounts/{sub_account_id}/tags", post(upsert_tag))
        .route(
            "/api/subaccounts/{sub_account_id}/contacts",
            post(upsert_contact),
        )
}

fn mismatch(what: &str) -> AppError {
    AppError::BadRequest(format!("{what} does not match the path"))
}

/// Authorize for the sub-account and load one of its pipelines.
async fn pipeline_in(
    state: &AppState,
    principal: &Principal,
    sub_account_id: &SubAccountId,
    pipeline_id: &PipelineId,
) -> Result<Pipeline, AppError> {
    authorize(state, principal, AccessScope::SubAccount(sub_account_id.clone())).await?;
    PipelineService::new(state.store())
        .pipeline_details(pipeline_id)
        .await?
        .filter(|p| &p.sub_account_id == sub_account_id)
        .ok_or_else(|| AppError::NotFound("pipeline".to_string()))
}

/// # Errors
///
/// Returns `AppError::Unauthorized` if access is denied.
pub async fn list_pipelines(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
) -> Result<Json<Vec<Pipeline>>, AppError> {
    authorize(&state, &principal, AccessScope::SubAccount(sub_account_id.clone())).await?;
    let pipelines = PipelineService::new(state.store())
        .pipelines(&sub_account_id)
        .await?;
    Ok(Json(pipelines))
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input.
pub async fn upsert_pipeline(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(input): Json<UpsertPipelineInput>,
) -> Result<Json<Pipeline>, AppError> {
    if input.sub_account_id != sub_account_id {
        return Err(mismatch("subAccountId"));
    }
    if let Some(id) = input.id.as_ref().filter(|id| !id.is_blank()) {
        pipeline_in(&state, &principal, &sub_account_id, id).await?;
    } else {
        authorize(&state, &principal, AccessScope::SubAccount(sub_account_id.clone())).await?;
    }

    let pipeline = PipelineService::new(state.store())
        .upsert_pipeline(&input)
        .await?;
    log_activity(
        &state,
        &principal,
        &format!("Updated a pipeline | {}", pipeline.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(Json(pipeline))
}

/// # Errors
///
/// Returns `AppError::NotFound` if the pipeline is not in this sub-account.
pub async fn pipeline_details(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
) -> Result<Json<Pipeline>, AppError> {
    let pipeline = pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    Ok(Json(pipeline))
}

/// # Errors
///
/// Returns `AppError::NotFound` if the pipeline is not in this sub-account.
pub async fn delete_pipeline(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
) -> Result<StatusCode, AppError> {
    let pipeline = pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    PipelineService::new(state.store())
        .delete_pipeline(&pipeline_id)
        .await?;
    log_activity(
        &state,
        &principal,
        &format!("Deleted a pipeline | {}", pipeline.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
///
/// Returns `AppError::NotFound` if the pipeline is not in this sub-account.
pub async fn lanes_with_tickets(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
) -> Result<Json<Vec<LaneDetail>>, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    let lanes = PipelineService::new(state.store())
        .lanes_with_tickets(&pipeline_id)
        .await?;
    Ok(Json(lanes))
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input.
pub async fn upsert_lane(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
    Json(input): Json<UpsertLaneInput>,
) -> Result<Json<Lane>, AppError> {
    if input.pipeline_id != pipeline_id {
        return Err(mismatch("pipelineId"));
    }
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    let service = PipelineService::new(state.store());
    if let Some(id) = input.id.as_ref().filter(|id| !id.is_blank()) {
        let lanes = service.lanes_with_tickets(&pipeline_id).await?;
        if !lanes.iter().any(|l| &l.lane.id == id) {
            return Err(AppError::NotFound("lane".to_string()));
        }
    }

    let lane = service.upsert_lane(&input).await?;
    log_activity(
        &state,
        &principal,
        &format!("Updated a lane | {}", lane.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(Json(lane))
}

/// # Errors
///
/// Returns `AppError::NotFound` if the lane is not in this pipeline.
pub async fn delete_lane(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id, lane_id)): Path<(SubAccountId, PipelineId, LaneId)>,
) -> Result<StatusCode, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    let service = PipelineService::new(state.store());
    let lanes = service.lanes_with_tickets(&pipeline_id).await?;
    if !lanes.iter().any(|l| l.lane.id == lane_id) {
        return Err(AppError::NotFound("lane".to_string()));
    }

    if let Some(lane) = service.delete_lane(&lane_id).await? {
        log_activity(
            &state,
            &principal,
            &format!("Deleted a lane | {}", lane.name),
            None,
            Some(&sub_account_id),
        )
        .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::BadRequest`
/// if the lane is not in this pipeline.
pub async fn upsert_ticket(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
    Json(input): Json<UpsertTicketInput>,
) -> Result<Json<TicketDetail>, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    let service = PipelineService::new(state.store());
    let lanes = service.lanes_with_tickets(&pipeline_id).await?;
    if !lanes.iter().any(|l| l.lane.id == input.lane_id) {
        return Err(mismatch("laneId"));
    }
    if let Some(id) = input.id.as_ref().filter(|id| !id.is_blank())
        && !lanes
            .iter()
            .flat_map(|l| &l.tickets)
            .any(|t| &t.ticket.id == id)
    {
        return Err(AppError::NotFound("ticket".to_string()));
    }

    let ticket = service.upsert_ticket(&input).await?;
    log_activity(
        &state,
        &principal,
        &format!("Updated a ticket | {}", ticket.ticket.name),
        None,
        Some(&sub_account_id),
    )
    .await?;
    Ok(Json(ticket))
}

/// # Errors
///
/// Returns `AppError::NotFound` if the ticket is not in this pipeline.
pub async fn delete_ticket(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id, ticket_id)): Path<(SubAccountId, PipelineId, TicketId)>,
) -> Result<StatusCode, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    let service = PipelineService::new(state.store());
    let lanes = service.lanes_with_tickets(&pipeline_id).await?;
    if !lanes
        .iter()
        .flat_map(|l| &l.tickets)
        .any(|t| t.ticket.id == ticket_id)
    {
        return Err(AppError::NotFound("ticket".to_string()));
    }

    if let Some(ticket) = service.delete_ticket(&ticket_id).await? {
        log_activity(
            &state,
            &principal,
            &format!("Deleted a ticket | {}", ticket.name),
            None,
            Some(&sub_account_id),
        )
        .await?;
    }
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a lane reorder batch.
///
/// # Errors
///
/// Returns `AppError::Validation` for a malformed batch or
/// `AppError::OrderNotSaved` (409) if it could not be applied.
pub async fn reorder_lanes(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
    Json(batch): Json<Vec<LaneOrder>>,
) -> Result<StatusCode, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    PipelineService::new(state.store())
        .reorder_lanes(&pipeline_id, &batch)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Apply a ticket reorder batch.
///
/// # Errors
///
/// Returns `AppError::Validation` for a malformed batch or
/// `AppError::OrderNotSaved` (409) if it could not be applied.
pub async fn reorder_tickets(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path((sub_account_id, pipeline_id)): Path<(SubAccountId, PipelineId)>,
    Json(batch): Json<Vec<TicketOrder>>,
) -> Result<StatusCode, AppError> {
    pipeline_in(&state, &principal, &sub_account_id, &pipeline_id).await?;
    PipelineService::new(state.store())
        .reorder_tickets(&pipeline_id, &batch)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input.
pub async fn upsert_tag(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(input): Json<UpsertTagInput>,
) -> Result<Json<Tag>, AppError> {
    if input.sub_account_id != sub_account_id {
        return Err(mismatch("subAccountId"));
    }
    authorize(&state, &principal, AccessScope::SubAccount(sub_account_id)).await?;
    let tag = PipelineService::new(state.store()).upsert_tag(&input).await?;
    Ok(Json(tag))
}

/// # Errors
///
/// Returns `AppError::Validation` for bad input.
pub async fn upsert_contact(
    State(state): State<AppState>,
    RequirePrincipal(principal): RequirePrincipal,
    Path(sub_account_id): Path<SubAccountId>,
    Json(input): Json<UpsertContactInput>,
) -> Result<Json<Contact>, AppError> {
    if input.sub_account_id != sub_account_id {
        return Err(mismatch("subAccountId"));
    }
    authorize(&state, &principal, AccessScope::SubAccount(sub_account_id)).await?;
    let contact = PipelineService::new(state.store())
        .upsert_contact(&input)
        .await?;
    Ok(Json(contact))
}
