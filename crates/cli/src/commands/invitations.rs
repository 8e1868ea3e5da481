//! Invitation management commands.
//!
//! # Usage
//!
//! ```bash
//! plura-cli invitation create -e member@example.com -a agency-id -r AGENCY_ADMIN
//! ```
//!
//! Only the invitation record is written; no email is sent. The invitee
//! joins the agency on their next sign-in to the dashboard.

use plura_core::{AgencyId, Email, InvitationId, Role};
use plura_dashboard::db::Store;
use plura_dashboard::models::{Invitation, NewInvitation};

use super::{CommandError, connect};

/// Record a pending invitation.
///
/// # Errors
///
/// Returns `CommandError` for an invalid email, an owner role, an unknown
/// agency, an email already invited, or a database failure.
pub async fn create(email: &str, agency: &str, role: Role) -> Result<Invitation, CommandError> {
    let email = Email::parse(email)?;
    if role == Role::AgencyOwner {
        return Err(CommandError::InvalidArgument(
            "an invitation cannot grant the agency owner role".to_string(),
        ));
    }

    let store = connect().await?;
    let agency_id = AgencyId::from(agency);
    if store.agency(&agency_id).await?.is_none() {
        return Err(CommandError::InvalidArgument(format!(
            "unknown agency: {agency_id}"
        )));
    }

    let invitation = store
        .create_invitation(&NewInvitation {
            id: InvitationId::generate(),
            email,
            agency_id,
            role,
        })
        .await?;

    tracing::info!(
        "Invitation created! ID: {}, Email: {}, Role: {}",
        invitation.id,
        invitation.email,
        invitation.role
    );
    Ok(invitation)
}
