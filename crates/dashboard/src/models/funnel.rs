//! Funnels (published sites of a sub-account).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::{FunnelId, SubAccountId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Funnel {
    pub id: FunnelId,
    pub name: String,
    pub description: Option<String>,
    pub published: bool,
    pub sub_domain_name: Option<String>,
    pub favicon: Option<String>,
    pub sub_account_id: SubAccountId,
    /// JSON array of product references, stored as text.
    pub live_products: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunnelRecord {
    pub id: FunnelId,
    pub name: String,
    pub description: Option<String>,
    pub sub_domain_name: Option<String>,
    pub favicon: Option<String>,
    pub live_products: String,
}
