//! Pending agency invitations.

use serde::{Deserialize, Serialize};

use plura_core::{AgencyId, Email, InvitationId, InvitationStatus, Role};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invitation {
    pub id: InvitationId,
    pub email: Email,
    pub agency_id: AgencyId,
    pub status: InvitationStatus,
    pub role: Role,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewInvitation {
    pub id: InvitationId,
    pub email: Email,
    pub agency_id: AgencyId,
    pub role: Role,
}
