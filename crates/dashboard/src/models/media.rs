//! Uploaded media assets.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::{MediaId, SubAccountId};

use super::sub_account::SubAccount;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: MediaId,
    #[serde(rename = "type")]
    pub media_type: Option<String>,
    pub name: String,
    pub link: String,
    pub sub_account_id: SubAccountId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewMedia {
    pub id: MediaId,
    pub media_type: Option<String>,
    pub name: String,
    pub link: String,
}

/// A sub-account with its media library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubAccountMedia {
    #[serde(flatten)]
    pub sub_account: SubAccount,
    pub media: Vec<Media>,
}
