//! Agency invitations: sending and accepting.
//!
//! Acceptance runs on every protected entry. A principal with a pending
//! invitation is turned into a team user of the inviting agency, the join
//! is logged, and the invitation is consumed. Only the role metadata write
//! to the identity provider may fail without failing the request.

use tracing::{info, instrument, warn};

use plura_core::{AgencyId, InvitationId, Role};

use crate::db::Store;
use crate::error::AppError;
use crate::identity::{IdentityProvider, Principal};
use crate::models::{Invitation, NewInvitation, NewUser, UserPatch};
use crate::services::notifications::NotificationService;
use crate::validation::Validator;

/// Invitation service.
pub struct InvitationService<'a> {
    store: &'a dyn Store,
    identity: &'a dyn IdentityProvider,
}

impl<'a> InvitationService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store, identity: &'a dyn IdentityProvider) -> Self {
        Self { store, identity }
    }

    /// Accept the principal's pending invitation, if any.
    ///
    /// Returns the agency the principal belongs to afterwards, or `None`
    /// if they belong to none. An invitation carrying the owner role creates
    /// no user and syncs no metadata; the join is still logged when the
    /// principal already has a datastore user, and the invitation is
    /// consumed.
    ///
    /// # Errors
    ///
    /// Returns a database error from any datastore step. Identity metadata
    /// failures are logged and ignored.
    #[instrument(skip(self, principal), fields(email = %principal.email))]
    pub async fn verify_and_accept_invitation(
        &self,
        principal: &Principal,
    ) -> Result<Option<AgencyId>, AppError> {
        let Some(invitation) = self.store.pending_invitation(&principal.email).await? else {
            let user = self.store.user_by_email(&principal.email).await?;
            return Ok(user.and_then(|u| u.agency_id));
        };

        if invitation.role == Role::AgencyOwner {
            warn!(invitation_id = %invitation.id, "Owner role is never granted by invitation");
            NotificationService::new(self.store)
                .save_activity_log(Some(principal), "Joined", Some(&invitation.agency_id), None)
                .await?;
            self.store.delete_invitation(&principal.email).await?;
            return Ok(None);
        }

        let create = NewUser {
            id: principal.id.clone(),
            name: principal.name.clone(),
            avatar_url: principal.avatar_url.clone(),
            email: principal.email.clone(),
            role: invitation.role,
            agency_id: Some(invitation.agency_id.clone()),
        };
        let update = UserPatch {
            role: Some(invitation.role),
            agency_id: Some(invitation.agency_id.clone()),
            ..UserPatch::default()
        };
        let user = self.store.upsert_user(&create, &update).await?;

        NotificationService::new(self.store)
            .save_activity_log(Some(principal), "Joined", user.agency_id.as_ref(), None)
            .await?;

        if let Err(e) = self
            .identity
            .update_role_metadata(&user.id, Some(user.role))
            .await
        {
            warn!(error = %e, user_id = %user.id, "Failed to sync role metadata");
        }

        self.store.delete_invitation(&principal.email).await?;

        info!(
            user_id = %user.id,
            agency_id = ?user.agency_id,
            role = %user.role.as_str(),
            "Invitation accepted"
        );
        Ok(user.agency_id)
    }

    /// Store a pending invitation, then have the identity provider send it.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an owner role, a malformed email
    /// or a blank agency id; `AppError::BadRequest` if the email already
    /// has an invitation; an identity error if sending fails.
    #[instrument(skip(self, redirect_url), fields(agency_id = %agency_id, role = %role.as_str()))]
    pub async fn send_invitation(
        &self,
        role: Role,
        email: &str,
        agency_id: &AgencyId,
        redirect_url: &str,
    ) -> Result<Invitation, AppError> {
        let mut v = Validator::new();
        v.check(
            role != Role::AgencyOwner,
            "role",
            "agency owners cannot be invited",
        );
        let email = v.email("email", email);
        v.check(!agency_id.is_blank(), "agencyId", "must not be empty");
        let email = v.finish(email)?.ok_or_else(|| {
            AppError::Internal("email accepted without a parsed value".to_string())
        })?;

        let invitation = self
            .store
            .create_invitation(&NewInvitation {
                id: InvitationId::generate(),
                email: email.clone(),
                agency_id: agency_id.clone(),
                role,
            })
            .await
            .map_err(AppError::from_write)?;

        self.identity
            .create_invitation(&email, role, redirect_url)
            .await?;

        info!(invitation_id = %invitation.id, "Invitation sent");
        Ok(invitation)
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn agency_invitations(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<Invitation>, AppError> {
        Ok(self.store.invitations_for_agency(agency_id).await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, AGENCY};
    use crate::services::notifications::NotificationScope;
    use plura_core::{Email, InvitationStatus};

    const REDIRECT: &str = "https://app.plura.test/agency";

    async fn invite(f: &fixtures::Fixture, email: &str, role: Role) -> Invitation {
        InvitationService::new(&f.store, &f.identity)
            .send_invitation(role, email, &AgencyId::new(AGENCY), REDIRECT)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_send_stores_pending_and_notifies_provider() {
        let f = fixtures::agency_with_sub_account().await;
        let invitation = invite(&f, "new@x.com", Role::SubaccountUser).await;

        assert_eq!(invitation.status, InvitationStatus::Pending);
        let sent = f.identity.sent_invitations().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].email.as_str(), "new@x.com");
        assert_eq!(sent[0].redirect_url, REDIRECT);
    }

    #[tokio::test]
    async fn test_send_rejects_owner_role_and_bad_email() {
        let f = fixtures::agency_with_sub_account().await;
        let service = InvitationService::new(&f.store, &f.identity);

        let err = service
            .send_invitation(Role::AgencyOwner, "not-an-email", &AgencyId::new(AGENCY), REDIRECT)
            .await
            .unwrap_err();
        let AppError::Validation(err) = err else {
            panic!("expected validation error, got {err:?}");
        };
        assert!(err.has_field("role"));
        assert!(err.has_field("email"));
        assert!(f.identity.sent_invitations().await.is_empty());
    }

    #[tokio::test]
    async fn test_send_duplicate_email_is_bad_request() {
        let f = fixtures::agency_with_sub_account().await;
        invite(&f, "new@x.com", Role::SubaccountUser).await;

        let result = InvitationService::new(&f.store, &f.identity)
            .send_invitation(Role::AgencyAdmin, "new@x.com", &AgencyId::new(AGENCY), REDIRECT)
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_accept_creates_user_and_consumes_invitation() {
        let f = fixtures::agency_with_sub_account().await;
        invite(&f, "new@x.com", Role::AgencyAdmin).await;
        let principal = fixtures::principal("user_new", "Nia New", "new@x.com");
        let service = InvitationService::new(&f.store, &f.identity);

        let agency_id = service.verify_and_accept_invitation(&principal).await.unwrap();
        assert_eq!(agency_id, Some(AgencyId::new(AGENCY)));

        let user = f.store.user_by_email(&principal.email).await.unwrap().unwrap();
        assert_eq!(user.role, Role::AgencyAdmin);
        assert!(f.store.pending_invitation(&principal.email).await.unwrap().is_none());

        let notifications = NotificationService::new(&f.store)
            .agency_notifications(&AgencyId::new(AGENCY), &NotificationScope::Agency)
            .await
            .unwrap();
        assert_eq!(notifications[0].notification.notification, "Nia New | Joined");
    }

    #[tokio::test]
    async fn test_accept_twice_is_idempotent() {
        let f = fixtures::agency_with_sub_account().await;
        invite(&f, "new@x.com", Role::SubaccountUser).await;
        let principal = fixtures::principal("user_new", "Nia New", "new@x.com");
        let service = InvitationService::new(&f.store, &f.identity);

        let first = service.verify_and_accept_invitation(&principal).await.unwrap();
        let second = service.verify_and_accept_invitation(&principal).await.unwrap();
        assert_eq!(first, second);

        let team = f.store.team_members(&AgencyId::new(AGENCY)).await.unwrap();
        let matching = team.iter().filter(|u| u.email == principal.email).count();
        assert_eq!(matching, 1);

        let notifications = f
            .store
            .notifications_for_agency(&AgencyId::new(AGENCY))
            .await
            .unwrap();
        assert_eq!(notifications.len(), 1);
    }

    #[tokio::test]
    async fn test_metadata_failure_does_not_abort_acceptance() {
        let f = fixtures::agency_with_sub_account().await;
        invite(&f, "new@x.com", Role::SubaccountUser).await;
        f.identity.fail_metadata_writes(true);
        let principal = fixtures::principal("user_new", "Nia New", "new@x.com");

        let agency_id = InvitationService::new(&f.store, &f.identity)
            .verify_and_accept_invitation(&principal)
            .await
            .unwrap();
        assert_eq!(agency_id, Some(AgencyId::new(AGENCY)));
        assert!(f.store.pending_invitation(&principal.email).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_owner_invitation_creates_nothing() {
        let f = fixtures::agency_with_sub_account().await;
        let email = Email::parse("boss@x.com").unwrap();
        f.store
            .create_invitation(&NewInvitation {
                id: InvitationId::generate(),
                email: email.clone(),
                agency_id: AgencyId::new(AGENCY),
                role: Role::AgencyOwner,
            })
            .await
            .unwrap();
        let writes_before = f.identity.metadata_writes().await.len();
        let principal = fixtures::principal("user_boss", "Bo Boss", "boss@x.com");

        let agency_id = InvitationService::new(&f.store, &f.identity)
            .verify_and_accept_invitation(&principal)
            .await
            .unwrap();
        assert_eq!(agency_id, None);
        assert!(f.store.user_by_email(&email).await.unwrap().is_none());
        assert!(f.store.pending_invitation(&email).await.unwrap().is_none());
        assert_eq!(f.identity.metadata_writes().await.len(), writes_before);
    }

    #[tokio::test]
    async fn test_owner_invitation_still_logs_join_for_known_user() {
        let f = fixtures::agency_with_sub_account().await;
        let principal = fixtures::principal("user_boss", "Bo Boss", "boss@x.com");
        crate::services::tenancy::TenancyService::new(&f.store, &f.identity)
            .init_user(&principal, None)
            .await
            .unwrap();
        f.store
            .create_invitation(&NewInvitation {
                id: InvitationId::generate(),
                email: principal.email.clone(),
                agency_id: AgencyId::new(AGENCY),
                role: Role::AgencyOwner,
            })
            .await
            .unwrap();

        let agency_id = InvitationService::new(&f.store, &f.identity)
            .verify_and_accept_invitation(&principal)
            .await
            .unwrap();
        assert_eq!(agency_id, None);

        let user = f.store.user_by_email(&principal.email).await.unwrap().unwrap();
        assert_eq!(user.role, Role::SubaccountUser);
        assert_eq!(user.agency_id, None);
        assert!(f.store.pending_invitation(&principal.email).await.unwrap().is_none());

        let log = NotificationService::new(&f.store)
            .agency_notifications(&AgencyId::new(AGENCY), &NotificationScope::Agency)
            .await
            .unwrap();
        assert!(log.iter().any(|n| n.notification.notification == "Bo Boss | Joined"));
    }

    #[tokio::test]
    async fn test_no_invitation_returns_existing_agency() {
        let f = fixtures::agency_with_sub_account().await;
        let service = InvitationService::new(&f.store, &f.identity);

        let agency_id = service
            .verify_and_accept_invitation(&f.owner_principal)
            .await
            .unwrap();
        assert_eq!(agency_id, Some(AgencyId::new(AGENCY)));

        let stranger = fixtures::principal("user_x", "Stan Stranger", "stan@x.com");
        assert_eq!(service.verify_and_accept_invitation(&stranger).await.unwrap(), None);
    }
}
