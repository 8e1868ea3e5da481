//! HTTP route handlers for the dashboard.
//!
//! # Route Structure
//!
//! ```text
//! GET  /health                          - Liveness check
//! GET  /health/ready                    - Readiness check (datastore)
//!
//! # Entry
//! GET  /api/agency                      - Where the principal lands
//! GET  /api/agency/:id                  - Agency workspace with notifications
//! GET  /api/agency/:id/sidebar          - Agency navigation
//! GET  /api/subaccount/:id              - Sub-account workspace with notifications
//! GET  /api/subaccount/:id/sidebar      - Sub-account navigation
//!
//! # Agencies
//! POST   /api/agencies                  - Create or update an agency
//! PATCH  /api/agencies/:id              - Update agency details
//! DELETE /api/agencies/:id              - Delete an agency (owner only)
//! GET    /api/agencies/:id/team         - Team members
//! GET    /api/agencies/:id/invitations  - Invitations
//! POST   /api/agencies/:id/invitations  - Send an invitation
//! GET    /api/agencies/:id/notifications - Activity log
//!
//! # Sub-accounts
//! POST   /api/subaccounts               - Create or update a sub-account
//! GET    /api/subaccounts/:id           - Sub-account details
//! DELETE /api/subaccounts/:id           - Delete a sub-account
//! GET    /api/subaccounts/:id/media     - Media library
//! POST   /api/subaccounts/:id/media     - Add media
//! DELETE /api/subaccounts/:id/media/:media_id - Remove media
//! POST   /api/subaccounts/:id/funnels   - Create or update a funnel
//! PUT    /api/subaccounts/:id/permissions - Grant or revoke access
//! POST   /api/subaccounts/:id/tags      - Create or update a tag
//! POST   /api/subaccounts/:id/contacts  - Create or update a contact
//!
//! # Pipelines (under /api/subaccounts/:id)
//! GET    /pipelines                     - Pipelines of the sub-account
//! POST   /pipelines                     - Create or update a pipeline
//! GET    /pipelines/:pid                - Pipeline
//! DELETE /pipelines/:pid                - Delete a pipeline
//! GET    /pipelines/:pid/lanes          - Lanes with their tickets
//! POST   /pipelines/:pid/lanes          - Create or update a lane
//! PUT    /pipelines/:pid/lanes/order    - Reorder lanes
//! DELETE /pipelines/:pid/lanes/:lane_id - Delete a lane
//! POST   /pipelines/:pid/tickets        - Create or update a ticket
//! PUT    /pipelines/:pid/tickets/order  - Reorder tickets
//! DELETE /pipelines/:pid/tickets/:ticket_id - Delete a ticket
//!
//! # Users
//! GET    /api/users/me                  - Signed-in user with agency and permissions
//! POST   /api/users/me                  - Create the signed-in user
//! GET    /api/users/:id                 - User
//! PATCH  /api/users/:id                 - Update a user
//! DELETE /api/users/:id                 - Delete a user
//! GET    /api/users/:id/permissions     - Permissions with their sub-accounts
//! POST   /api/notifications             - Record an activity
//! ```

pub mod api;

use axum::{Router, extract::State, http::StatusCode, routing::get};
use tracing::warn;

use crate::state::AppState;

/// Build the complete router: health checks and the JSON API.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/health/ready", get(readiness))
        .merge(api::router())
}

/// Liveness health check endpoint.
///
/// Returns "ok" if the server is running. Does not check dependencies.
async fn health() -> &'static str {
    "ok"
}

/// Readiness health check endpoint.
///
/// Returns 503 Service Unavailable if the datastore is not reachable.
async fn readiness(State(state): State<AppState>) -> StatusCode {
    match state.store().ping().await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}
