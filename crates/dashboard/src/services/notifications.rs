//! Activity log.
//!
//! Every notification names the user who acted and is attached to an
//! agency, optionally narrowed to one of its sub-accounts.

use tracing::{info, instrument, warn};

use plura_core::{AgencyId, NotificationId, SubAccountId};

use crate::db::Store;
use crate::error::AppError;
use crate::identity::Principal;
use crate::models::{NewNotification, Notification, NotificationWithUser};

/// Which notifications an authorized principal may see.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "subAccountId")]
pub enum NotificationScope {
    /// Everything logged under the agency.
    Agency,
    /// Only entries attached to this sub-account.
    SubAccount(SubAccountId),
}

impl NotificationScope {
    #[must_use]
    pub fn admits(&self, notification: &Notification) -> bool {
        match self {
            Self::Agency => true,
            Self::SubAccount(id) => notification.sub_account_id.as_ref() == Some(id),
        }
    }
}

/// Notification service.
pub struct NotificationService<'a> {
    store: &'a dyn Store,
}

impl<'a> NotificationService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    /// Record `description` as done by the acting user.
    ///
    /// The acting user is the principal's datastore user or, without a
    /// principal, any user of the agency owning `sub_account_id`. The
    /// agency is the parent of `sub_account_id`, else `agency_id`; when both
    /// are given they must agree. The stored text is
    /// `"{user name} | {description}"`.
    ///
    /// Returns `Ok(None)` without writing when no acting user exists.
    ///
    /// # Errors
    ///
    /// Returns `AppError::MissingScope` if no agency can be resolved,
    /// `AppError::BadRequest` if the sub-account belongs to a different
    /// agency, or a database error.
    #[instrument(skip(self, principal), fields(description = %description))]
    pub async fn save_activity_log(
        &self,
        principal: Option<&Principal>,
        description: &str,
        agency_id: Option<&AgencyId>,
        sub_account_id: Option<&SubAccountId>,
    ) -> Result<Option<Notification>, AppError> {
        let user = match (principal, sub_account_id) {
            (Some(principal), _) => self.store.user_by_email(&principal.email).await?,
            (None, Some(sub_account_id)) => {
                self.store.user_for_sub_account_agency(sub_account_id).await?
            }
            (None, None) => None,
        };
        let Some(user) = user else {
            warn!("Could not find a user to attribute the notification to");
            return Ok(None);
        };

        let agency_id = match (agency_id, sub_account_id) {
            (_, Some(sub_account_id)) => {
                let parent = self
                    .store
                    .sub_account(sub_account_id)
                    .await?
                    .map(|sub_account| sub_account.agency_id)
                    .ok_or(AppError::MissingScope)?;
                if agency_id.is_some_and(|agency_id| agency_id != &parent) {
                    warn!(sub_account_id = %sub_account_id, "Sub-account belongs to another agency");
                    return Err(AppError::BadRequest(
                        "sub-account does not belong to the agency".to_string(),
                    ));
                }
                parent
            }
            (Some(agency_id), None) => agency_id.clone(),
            (None, None) => return Err(AppError::MissingScope),
        };

        let notification = self
            .store
            .create_notification(&NewNotification {
                id: NotificationId::generate(),
                notification: format!("{} | {description}", user.name),
                agency_id,
                sub_account_id: sub_account_id.cloned(),
                user_id: user.id,
            })
            .await?;

        info!(notification_id = %notification.id, agency_id = %notification.agency_id, "Activity logged");
        Ok(Some(notification))
    }

    /// An agency's notifications visible under `scope`, newest first.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn agency_notifications(
        &self,
        agency_id: &AgencyId,
        scope: &NotificationScope,
    ) -> Result<Vec<NotificationWithUser>, AppError> {
        let mut notifications = self.store.notifications_for_agency(agency_id).await?;
        notifications.retain(|n| scope.admits(&n.notification));
        Ok(notifications)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, AGENCY, SUB_ACCOUNT};

    #[tokio::test]
    async fn test_text_is_prefixed_with_user_name() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);

        let notification = service
            .save_activity_log(
                Some(&f.owner_principal),
                "Updated settings",
                Some(&AgencyId::new(AGENCY)),
                None,
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(notification.notification, "Olive Owner | Updated settings");
        assert_eq!(notification.sub_account_id, None);
    }

    #[tokio::test]
    async fn test_agency_resolved_from_sub_account() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);

        let notification = service
            .save_activity_log(None, "Imported contacts", None, Some(&SubAccountId::new(SUB_ACCOUNT)))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(notification.agency_id.as_str(), AGENCY);
        assert_eq!(notification.user_id, f.owner_principal.id);
    }

    #[tokio::test]
    async fn test_missing_scope_is_fatal() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);

        let result = service
            .save_activity_log(Some(&f.owner_principal), "Orphan", None, None)
            .await;
        assert!(matches!(result, Err(AppError::MissingScope)));

        let result = service
            .save_activity_log(
                Some(&f.owner_principal),
                "Orphan",
                None,
                Some(&SubAccountId::new("missing")),
            )
            .await;
        assert!(matches!(result, Err(AppError::MissingScope)));
    }

    #[tokio::test]
    async fn test_agency_must_own_the_sub_account() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);

        let result = service
            .save_activity_log(
                Some(&f.owner_principal),
                "Elsewhere",
                Some(&AgencyId::new("ag2")),
                Some(&SubAccountId::new(SUB_ACCOUNT)),
            )
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));

        let all = service
            .agency_notifications(&AgencyId::new("ag2"), &NotificationScope::Agency)
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_actor_writes_nothing() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);
        let stranger = fixtures::principal("user_x", "Stan Stranger", "stan@x.com");

        let result = service
            .save_activity_log(Some(&stranger), "Hello", Some(&AgencyId::new(AGENCY)), None)
            .await
            .unwrap();
        assert!(result.is_none());

        let all = service
            .agency_notifications(&AgencyId::new(AGENCY), &NotificationScope::Agency)
            .await
            .unwrap();
        assert!(all.is_empty());
    }

    #[tokio::test]
    async fn test_sub_account_scope_filters() {
        let f = fixtures::agency_with_sub_account().await;
        let service = NotificationService::new(&f.store);
        let agency_id = AgencyId::new(AGENCY);
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        service
            .save_activity_log(Some(&f.owner_principal), "Agency wide", Some(&agency_id), None)
            .await
            .unwrap();
        service
            .save_activity_log(
                Some(&f.owner_principal),
                "In shop",
                Some(&agency_id),
                Some(&sub_account_id),
            )
            .await
            .unwrap();

        let all = service
            .agency_notifications(&agency_id, &NotificationScope::Agency)
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].notification.notification, "Olive Owner | In shop");

        let scoped = service
            .agency_notifications(&agency_id, &NotificationScope::SubAccount(sub_account_id))
            .await
            .unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].user.name, "Olive Owner");
    }
}
