//! Sub-account access grants.

use serde::{Deserialize, Serialize};

use plura_core::{Email, PermissionId, SubAccountId};

use super::sub_account::SubAccount;

/// Grants (or revokes) a user's access to one sub-account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    pub id: PermissionId,
    pub email: Email,
    pub sub_account_id: SubAccountId,
    pub access: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionWithSubAccount {
    #[serde(flatten)]
    pub permission: Permission,
    pub sub_account: SubAccount,
}
