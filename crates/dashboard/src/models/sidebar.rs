//! Navigation entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::SidebarOptionId;

/// A sidebar entry, owned by an agency or a sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SidebarOption {
    pub id: SidebarOptionId,
    pub name: String,
    pub icon: String,
    pub link: String,
    pub created_at: DateTime<Utc>,
}

/// A sidebar entry to be created with its tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SidebarSeed {
    pub name: &'static str,
    pub icon: &'static str,
    pub link: String,
}
