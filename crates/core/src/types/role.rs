//! Roles and their privilege levels.

use serde::{Deserialize, Serialize};

/// A user's role within an agency.
///
/// Stored and transmitted in `SCREAMING_SNAKE_CASE` (`AGENCY_OWNER`, ...),
/// which is also the form written to the identity provider's metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "plura.role", rename_all = "SCREAMING_SNAKE_CASE")
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Created the agency. Exactly one per agency; never assigned by invitation.
    AgencyOwner,
    /// Manages the agency alongside the owner.
    AgencyAdmin,
    /// Works inside the sub-accounts they have been granted. Default for
    /// users created without an explicit role.
    #[default]
    SubaccountUser,
    /// Read-mostly access to granted sub-accounts.
    SubaccountGuest,
}

/// How far a role reaches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Privilege {
    /// Access is decided per sub-account by explicit permission rows.
    SubAccount,
    /// Every sub-account of the user's agency, no permission rows needed.
    Agency,
}

impl Role {
    /// All roles, most privileged first.
    pub const ALL: [Self; 4] = [
        Self::AgencyOwner,
        Self::AgencyAdmin,
        Self::SubaccountUser,
        Self::SubaccountGuest,
    ];

    #[must_use]
    pub const fn privilege(self) -> Privilege {
        match self {
            Self::AgencyOwner | Self::AgencyAdmin => Privilege::Agency,
            Self::SubaccountUser | Self::SubaccountGuest => Privilege::SubAccount,
        }
    }

    /// Owners and admins skip sub-account permission checks.
    #[must_use]
    pub const fn is_agency_privileged(self) -> bool {
        matches!(self.privilege(), Privilege::Agency)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AgencyOwner => "AGENCY_OWNER",
            Self::AgencyAdmin => "AGENCY_ADMIN",
            Self::SubaccountUser => "SUBACCOUNT_USER",
            Self::SubaccountGuest => "SUBACCOUNT_GUEST",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Unknown role string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid role: {0}")]
pub struct RoleParseError(pub String);

impl std::str::FromStr for Role {
    type Err = RoleParseError;

    /// Accepts the canonical form and its lowercase spelling.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| RoleParseError(s.to_owned()))
    }
}
