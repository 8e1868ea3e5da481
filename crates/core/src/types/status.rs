//! Status enums.

use serde::{Deserialize, Serialize};

/// Lifecycle of an invitation.
///
/// Accepted invitations are deleted rather than kept, so in practice only
/// `Pending` rows exist; `Accepted` is still representable for rows written
/// by other tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "plura.invitation_status", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InvitationStatus {
    #[default]
    Pending,
    Accepted,
}
