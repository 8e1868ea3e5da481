//! Authorization and the protected entry flows.
//!
//! Every protected page of the dashboard starts here. [`AccessService::authorize`]
//! decides whether a principal may open an agency or a sub-account, and
//! which notifications they get to see there. The entry flows wrap it with
//! invitation acceptance and the notification listing.
//!
//! The effective role is the one cached in the identity provider's metadata,
//! falling back to the datastore user's role. A metadata role is enough on
//! its own: an owner or admin without a datastore user still passes the
//! privileged bypass.

use serde::Serialize;
use tracing::{debug, instrument};

use plura_core::{AgencyId, Role, SubAccountId};

use crate::db::Store;
use crate::error::AppError;
use crate::identity::{IdentityProvider, Principal};
use crate::models::{NotificationWithUser, UserDetails};
use crate::services::invitations::InvitationService;
use crate::services::notifications::{NotificationScope, NotificationService};

/// What a request is trying to open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessScope {
    Agency(AgencyId),
    SubAccount(SubAccountId),
}

/// Outcome of an authorization check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// No principal; the client should sign in.
    SignIn,
    /// Signed in, but not allowed here.
    Unauthorized,
    Allowed(Box<Access>),
}

/// A granted access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Access {
    /// Absent when the role came from identity metadata alone.
    pub user: Option<UserDetails>,
    pub role: Role,
    /// Agency owning the requested scope.
    pub agency_id: AgencyId,
    pub notification_scope: NotificationScope,
}

/// An opened agency or sub-account, with the notifications visible there.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    #[serde(flatten)]
    pub access: Access,
    pub notifications: Vec<NotificationWithUser>,
}

/// Outcome of an entry flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry {
    SignIn,
    Unauthorized,
    Allowed(Box<Workspace>),
}

/// Where a principal lands when they enter the dashboard without a target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase", tag = "kind", content = "id")]
pub enum Landing {
    SignIn,
    /// Signed in but not part of any agency yet; they may create one.
    Onboarding,
    Agency(AgencyId),
    /// First sub-account the principal has been granted.
    SubAccount(SubAccountId),
    Unauthorized,
}

/// Role cached on the identity profile, else the datastore user's role.
fn effective_role(principal: &Principal, user: Option<&UserDetails>) -> Option<Role> {
    principal.role_metadata.or_else(|| user.map(|u| u.user.role))
}

/// Access service.
pub struct AccessService<'a> {
    store: &'a dyn Store,
    identity: &'a dyn IdentityProvider,
}

impl<'a> AccessService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, identity: &'a dyn IdentityProvider) -> Self {
        Self { store, identity }
    }

    /// Decide whether `principal` may open `scope`.
    ///
    /// Owners and admins may open their own agency and every sub-account of
    /// it. Other roles may open only sub-accounts they hold a granted
    /// permission for, and see only that sub-account's notifications.
    ///
    /// # Errors
    ///
    /// Returns a database error if a lookup fails.
    #[instrument(skip(self, principal), fields(scope = ?scope))]
    pub async fn authorize(
        &self,
        principal: Option<&Principal>,
        scope: &AccessScope,
    ) -> Result<AccessDecision, AppError> {
        let Some(principal) = principal else {
            return Ok(AccessDecision::SignIn);
        };

        let user = self.store.user_details(&principal.email).await?;
        let Some(role) = effective_role(principal, user.as_ref()) else {
            debug!("No role resolved");
            return Ok(AccessDecision::Unauthorized);
        };

        let scope_agency = match scope {
            AccessScope::Agency(id) => self.store.agency(id).await?.map(|a| a.id),
            AccessScope::SubAccount(id) => self.store.sub_account(id).await?.map(|s| s.agency_id),
        };
        let Some(agency_id) = scope_agency else {
            debug!("Requested scope does not exist");
            return Ok(AccessDecision::Unauthorized);
        };

        let notification_scope = if role.is_agency_privileged() {
            let member_elsewhere = user
                .as_ref()
                .is_some_and(|u| u.user.agency_id.as_ref() != Some(&agency_id));
            if member_elsewhere {
                debug!("Privileged user outside the owning agency");
                return Ok(AccessDecision::Unauthorized);
            }
            NotificationScope::Agency
        } else {
            let AccessScope::SubAccount(sub_account_id) = scope else {
                return Ok(AccessDecision::Unauthorized);
            };
            let granted = user
                .as_ref()
                .is_some_and(|u| u.accessible_sub_accounts().any(|id| id == sub_account_id));
            if !granted {
                debug!(role = %role.as_str(), "No granted permission for sub-account");
                return Ok(AccessDecision::Unauthorized);
            }
            NotificationScope::SubAccount(sub_account_id.clone())
        };

        Ok(AccessDecision::Allowed(Box::new(Access {
            user,
            role,
            agency_id,
            notification_scope,
        })))
    }

    /// Accept any pending invitation, then pick where the principal lands.
    ///
    /// # Errors
    ///
    /// Returns a database error if a lookup or the invitation acceptance
    /// fails.
    #[instrument(skip(self, principal))]
    pub async fn enter_agency(&self, principal: Option<&Principal>) -> Result<Landing, AppError> {
        let Some(principal) = principal else {
            return Ok(Landing::SignIn);
        };

        let Some(agency_id) = InvitationService::new(self.store, self.identity)
            .verify_and_accept_invitation(principal)
            .await?
        else {
            return Ok(Landing::Onboarding);
        };

        let Some(user) = self.store.user_details(&principal.email).await? else {
            return Ok(Landing::Unauthorized);
        };

        if effective_role(principal, Some(&user)).is_some_and(Role::is_agency_privileged) {
            return Ok(Landing::Agency(agency_id));
        }
        let landing = user
            .accessible_sub_accounts()
            .next()
            .cloned()
            .map_or(Landing::Unauthorized, Landing::SubAccount);
        Ok(landing)
    }

    /// Open an agency with all of its notifications.
    ///
    /// # Errors
    ///
    /// Returns a database error if a lookup or the invitation acceptance
    /// fails.
    #[instrument(skip(self, principal))]
    pub async fn open_agency(
        &self,
        principal: Option<&Principal>,
        agency_id: &AgencyId,
    ) -> Result<Entry, AppError> {
        self.enter(principal, AccessScope::Agency(agency_id.clone()))
            .await
    }

    /// Open a sub-account with the notifications its visitor may see.
    ///
    /// # Errors
    ///
    /// Returns a database error if a lookup or the invitation acceptance
    /// fails.
    #[instrument(skip(self, principal))]
    pub async fn enter_sub_account(
        &self,
        principal: Option<&Principal>,
        sub_account_id: &SubAccountId,
    ) -> Result<Entry, AppError> {
        self.enter(principal, AccessScope::SubAccount(sub_account_id.clone()))
            .await
    }

    async fn enter(
        &self,
        principal: Option<&Principal>,
        scope: AccessScope,
    ) -> Result<Entry, AppError> {
        if let Some(principal) = principal {
            InvitationService::new(self.store, self.identity)
                .verify_and_accept_invitation(principal)
                .await?;
        }

        let access = match self.authorize(principal, &scope).await? {
            AccessDecision::SignIn => return Ok(Entry::SignIn),
            AccessDecision::Unauthorized => return Ok(Entry::Unauthorized),
            AccessDecision::Allowed(access) => *access,
        };

        let notifications = NotificationService::new(self.store)
            .agency_notifications(&access.agency_id, &access.notification_scope)
            .await?;

        Ok(Entry::Allowed(Box::new(Workspace {
            access,
            notifications,
        })))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, AGENCY, SUB_ACCOUNT};
    use crate::services::tenancy::TenancyService;

    fn agency_scope() -> AccessScope {
        AccessScope::Agency(AgencyId::new(AGENCY))
    }

    fn sub_account_scope() -> AccessScope {
        AccessScope::SubAccount(SubAccountId::new(SUB_ACCOUNT))
    }

    /// Add a team member to `ag1` with `role`.
    async fn member(f: &fixtures::Fixture, id: &str, email: &str, role: Role) -> Principal {
        let principal = fixtures::principal(id, "Tia Team", email);
        let tenancy = TenancyService::new(&f.store, &f.identity);
        tenancy.init_user(&principal, Some(role)).await.unwrap();
        tenancy
            .update_user(
                &principal.email,
                &crate::models::UserPatch {
                    agency_id: Some(AgencyId::new(AGENCY)),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        principal
    }

    #[tokio::test]
    async fn test_no_principal_signs_in() {
        let f = fixtures::agency_with_sub_account().await;
        let service = AccessService::new(&f.store, &f.identity);

        let decision = service.authorize(None, &agency_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::SignIn);
    }

    #[tokio::test]
    async fn test_no_role_is_unauthorized() {
        let f = fixtures::agency_with_sub_account().await;
        let service = AccessService::new(&f.store, &f.identity);
        let stranger = fixtures::principal("user_x", "Stan Stranger", "stan@x.com");

        let decision = service.authorize(Some(&stranger), &sub_account_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_owner_sees_agency_and_sub_accounts() {
        let f = fixtures::agency_with_sub_account().await;
        let service = AccessService::new(&f.store, &f.identity);

        for scope in [agency_scope(), sub_account_scope()] {
            let AccessDecision::Allowed(access) =
                service.authorize(Some(&f.owner_principal), &scope).await.unwrap()
            else {
                panic!("owner denied {scope:?}");
            };
            assert_eq!(access.notification_scope, NotificationScope::Agency);
            assert_eq!(access.agency_id.as_str(), AGENCY);
        }
    }

    #[tokio::test]
    async fn test_privileged_user_of_other_agency_is_denied() {
        let f = fixtures::agency_with_sub_account().await;
        let tenancy = TenancyService::new(&f.store, &f.identity);
        let rival = fixtures::principal("user_rival", "Rex Rival", "rex@y.com");
        tenancy.init_user(&rival, Some(Role::AgencyOwner)).await.unwrap();
        tenancy
            .upsert_agency(&fixtures::agency_input("ag2", "rex@y.com"))
            .await
            .unwrap();

        let service = AccessService::new(&f.store, &f.identity);
        let decision = service.authorize(Some(&rival), &sub_account_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_sub_account_user_needs_granted_permission() {
        let f = fixtures::agency_with_sub_account().await;
        let principal = member(&f, "user_team", "team@x.com", Role::SubaccountUser).await;
        let service = AccessService::new(&f.store, &f.identity);
        let tenancy = TenancyService::new(&f.store, &f.identity);
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        let decision = service.authorize(Some(&principal), &sub_account_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);

        let permission = tenancy
            .change_user_permission(None, &principal.email, &sub_account_id, true)
            .await
            .unwrap();
        let AccessDecision::Allowed(access) =
            service.authorize(Some(&principal), &sub_account_scope()).await.unwrap()
        else {
            panic!("granted user denied");
        };
        assert_eq!(
            access.notification_scope,
            NotificationScope::SubAccount(sub_account_id.clone())
        );

        tenancy
            .change_user_permission(Some(permission.id), &principal.email, &sub_account_id, false)
            .await
            .unwrap();
        let decision = service.authorize(Some(&principal), &sub_account_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_metadata_role_wins_over_datastore_role() {
        let f = fixtures::agency_with_sub_account().await;
        let mut principal = member(&f, "user_team", "team@x.com", Role::SubaccountUser).await;
        principal.role_metadata = Some(Role::AgencyAdmin);
        let service = AccessService::new(&f.store, &f.identity);

        let AccessDecision::Allowed(access) =
            service.authorize(Some(&principal), &sub_account_scope()).await.unwrap()
        else {
            panic!("metadata admin denied");
        };
        assert_eq!(access.role, Role::AgencyAdmin);
        assert_eq!(access.notification_scope, NotificationScope::Agency);

        let mut owner = f.owner_principal.clone();
        owner.role_metadata = Some(Role::SubaccountGuest);
        let decision = service.authorize(Some(&owner), &agency_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_metadata_role_without_datastore_user() {
        let f = fixtures::agency_with_sub_account().await;
        let service = AccessService::new(&f.store, &f.identity);
        let mut admin = fixtures::principal("user_meta", "Mae Meta", "mae@x.com");
        admin.role_metadata = Some(Role::AgencyAdmin);

        let AccessDecision::Allowed(access) =
            service.authorize(Some(&admin), &sub_account_scope()).await.unwrap()
        else {
            panic!("metadata-only admin denied");
        };
        assert!(access.user.is_none());
        assert_eq!(access.agency_id.as_str(), AGENCY);

        let mut guest = fixtures::principal("user_guest", "Gus Guest", "gus@x.com");
        guest.role_metadata = Some(Role::SubaccountGuest);
        let decision = service.authorize(Some(&guest), &sub_account_scope()).await.unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_sub_account_user_denied_agency_scope() {
        let f = fixtures::agency_with_sub_account().await;
        let principal = member(&f, "user_team", "team@x.com", Role::SubaccountGuest).await;
        TenancyService::new(&f.store, &f.identity)
            .change_user_permission(None, &principal.email, &SubAccountId::new(SUB_ACCOUNT), true)
            .await
            .unwrap();

        let decision = AccessService::new(&f.store, &f.identity)
            .authorize(Some(&principal), &agency_scope())
            .await
            .unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_missing_sub_account_is_unauthorized() {
        let f = fixtures::agency_with_sub_account().await;
        let decision = AccessService::new(&f.store, &f.identity)
            .authorize(
                Some(&f.owner_principal),
                &AccessScope::SubAccount(SubAccountId::new("missing")),
            )
            .await
            .unwrap();
        assert_eq!(decision, AccessDecision::Unauthorized);
    }

    #[tokio::test]
    async fn test_enter_sub_account_filters_notifications() {
        let f = fixtures::agency_with_sub_account().await;
        let principal = member(&f, "user_team", "team@x.com", Role::SubaccountUser).await;
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);
        TenancyService::new(&f.store, &f.identity)
            .change_user_permission(None, &principal.email, &sub_account_id, true)
            .await
            .unwrap();
        let notifications = NotificationService::new(&f.store);
        let agency_id = AgencyId::new(AGENCY);
        notifications
            .save_activity_log(Some(&f.owner_principal), "Agency wide", Some(&agency_id), None)
            .await
            .unwrap();
        notifications
            .save_activity_log(
                Some(&f.owner_principal),
                "Shop only",
                Some(&agency_id),
                Some(&sub_account_id),
            )
            .await
            .unwrap();
        let service = AccessService::new(&f.store, &f.identity);

        let Entry::Allowed(workspace) = service
            .enter_sub_account(Some(&principal), &sub_account_id)
            .await
            .unwrap()
        else {
            panic!("granted user denied");
        };
        assert_eq!(workspace.notifications.len(), 1);
        assert_eq!(
            workspace.notifications[0].notification.notification,
            "Olive Owner | Shop only"
        );

        let Entry::Allowed(workspace) = service
            .enter_sub_account(Some(&f.owner_principal), &sub_account_id)
            .await
            .unwrap()
        else {
            panic!("owner denied");
        };
        assert_eq!(workspace.notifications.len(), 2);
    }

    #[tokio::test]
    async fn test_enter_agency_landings() {
        let f = fixtures::agency_with_sub_account().await;
        let service = AccessService::new(&f.store, &f.identity);

        assert_eq!(service.enter_agency(None).await.unwrap(), Landing::SignIn);
        assert_eq!(
            service.enter_agency(Some(&f.owner_principal)).await.unwrap(),
            Landing::Agency(AgencyId::new(AGENCY))
        );

        let newcomer = fixtures::principal("user_new", "Nia New", "new@x.com");
        assert_eq!(
            service.enter_agency(Some(&newcomer)).await.unwrap(),
            Landing::Onboarding
        );

        let team = member(&f, "user_team", "team@x.com", Role::SubaccountUser).await;
        assert_eq!(
            service.enter_agency(Some(&team)).await.unwrap(),
            Landing::Unauthorized
        );
        TenancyService::new(&f.store, &f.identity)
            .change_user_permission(None, &team.email, &SubAccountId::new(SUB_ACCOUNT), true)
            .await
            .unwrap();
        assert_eq!(
            service.enter_agency(Some(&team)).await.unwrap(),
            Landing::SubAccount(SubAccountId::new(SUB_ACCOUNT))
        );
    }
}
