//! Sub-account types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::{AgencyId, Email, PermissionId, SubAccountId};

use super::sidebar::{SidebarOption, SidebarSeed};

/// A workspace under an agency.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccount {
    pub id: SubAccountId,
    pub agency_id: AgencyId,
    pub connect_account_id: String,
    pub name: String,
    pub sub_account_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    pub goal: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated fields written by a sub-account upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAccountRecord {
    pub id: SubAccountId,
    pub agency_id: AgencyId,
    pub name: String,
    pub sub_account_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    pub connect_account_id: String,
    pub goal: i32,
}

/// Rows created alongside a new sub-account, in the same transaction.
#[derive(Debug, Clone)]
pub struct SubAccountSeed {
    /// Agency owner granted access to the new sub-account.
    pub owner_email: Email,
    pub permission_id: PermissionId,
    pub pipeline_name: String,
    pub sidebar: Vec<SidebarSeed>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccountDetails {
    #[serde(flatten)]
    pub sub_account: SubAccount,
    pub sidebar_options: Vec<SidebarOption>,
}
