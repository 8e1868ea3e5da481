//! Activity log entries.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use plura_core::{AgencyId, NotificationId, SubAccountId, UserId};

use super::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: NotificationId,
    /// Rendered text, `"{actor} | {description}"`.
    pub notification: String,
    pub agency_id: AgencyId,
    pub sub_account_id: Option<SubAccountId>,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A notification together with the user who caused it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationWithUser {
    #[serde(flatten)]
    pub notification: Notification,
    pub user: User,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewNotification {
    pub id: NotificationId,
    pub notification: String,
    pub agency_id: AgencyId,
    pub sub_account_id: Option<SubAccountId>,
    pub user_id: UserId,
}
