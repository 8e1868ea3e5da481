//! Agency (tenant root) types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::AgencyId;

use super::sidebar::SidebarOption;
use super::sub_account::SubAccountDetails;

/// An agency, the top-level tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: AgencyId,
    /// Payment-connection account, empty until billing is connected.
    pub connect_account_id: String,
    pub name: String,
    pub agency_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub white_label: bool,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    pub goal: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Validated fields written by an agency upsert.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgencyRecord {
    pub id: AgencyId,
    pub name: String,
    pub agency_logo: String,
    pub company_email: String,
    pub company_phone: String,
    pub white_label: bool,
    pub address: String,
    pub city: String,
    pub zip_code: String,
    pub state: String,
    pub country: String,
    pub connect_account_id: String,
    pub goal: i32,
}

/// Partial update of agency details. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AgencyPatch {
    pub name: Option<String>,
    pub agency_logo: Option<String>,
    pub company_email: Option<String>,
    pub company_phone: Option<String>,
    pub white_label: Option<bool>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub zip_code: Option<String>,
    pub state: Option<String>,
    pub country: Option<String>,
    pub connect_account_id: Option<String>,
    pub goal: Option<i32>,
}

impl AgencyPatch {
    /// Apply the patch to an in-memory agency.
    pub fn apply_to(&self, agency: &mut Agency) {
        fn set<T: Clone>(slot: &mut T, value: Option<&T>) {
            if let Some(v) = value {
                slot.clone_from(v);
            }
        }
        set(&mut agency.name, self.name.as_ref());
        set(&mut agency.agency_logo, self.agency_logo.as_ref());
        set(&mut agency.company_email, self.company_email.as_ref());
        set(&mut agency.company_phone, self.company_phone.as_ref());
        set(&mut agency.white_label, self.white_label.as_ref());
        set(&mut agency.address, self.address.as_ref());
        set(&mut agency.city, self.city.as_ref());
        set(&mut agency.zip_code, self.zip_code.as_ref());
        set(&mut agency.state, self.state.as_ref());
        set(&mut agency.country, self.country.as_ref());
        set(&mut agency.connect_account_id, self.connect_account_id.as_ref());
        set(&mut agency.goal, self.goal.as_ref());
    }
}

/// An agency with its navigation and sub-accounts, as loaded for the
/// signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyDetails {
    #[serde(flatten)]
    pub agency: Agency,
    pub sidebar_options: Vec<SidebarOption>,
    pub sub_accounts: Vec<SubAccountDetails>,
}
