//! Users and their loaded context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::{AgencyId, Email, Role, UserId};

use super::agency::AgencyDetails;
use super::permission::Permission;

/// A dashboard user, linked to the identity provider by id and email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub email: Email,
    pub role: Role,
    pub agency_id: Option<AgencyId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Insert half of a user upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewUser {
    pub id: UserId,
    pub name: String,
    pub avatar_url: String,
    pub email: Email,
    pub role: Role,
    pub agency_id: Option<AgencyId>,
}

/// Fields changed on an existing user. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub avatar_url: Option<String>,
    pub role: Option<Role>,
    pub agency_id: Option<AgencyId>,
}

impl UserPatch {
    pub fn apply_to(&self, user: &mut User) {
        if let Some(name) = &self.name {
            user.name.clone_from(name);
        }
        if let Some(avatar_url) = &self.avatar_url {
            user.avatar_url.clone_from(avatar_url);
        }
        if let Some(role) = self.role {
            user.role = role;
        }
        if let Some(agency_id) = &self.agency_id {
            user.agency_id = Some(agency_id.clone());
        }
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.avatar_url.is_none()
            && self.role.is_none()
            && self.agency_id.is_none()
    }
}

/// A user with their agency (sidebar and sub-accounts included) and
/// sub-account permissions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDetails {
    #[serde(flatten)]
    pub user: User,
    pub agency: Option<AgencyDetails>,
    pub permissions: Vec<Permission>,
}

impl UserDetails {
    /// Sub-account ids this user has been granted access to.
    pub fn accessible_sub_accounts(&self) -> impl Iterator<Item = &plura_core::SubAccountId> {
        self.permissions
            .iter()
            .filter(|p| p.access)
            .map(|p| &p.sub_account_id)
    }
}
