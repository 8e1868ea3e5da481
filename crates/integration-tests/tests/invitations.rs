//! Integration tests for sending and accepting agency invitations.

#![allow(clippy::unwrap_used)]

use plura_core::{AgencyId, Role};
use plura_dashboard::error::AppError;
use plura_dashboard::services::{
    AccessService, InvitationService, Landing, NotificationScope, NotificationService,
};
use plura_integration_tests::{AGENCY, TestContext, principal};

const REDIRECT: &str = "https://app.plura.test/agency";

#[tokio::test]
async fn test_invited_admin_lands_in_agency() {
    let ctx = TestContext::seeded().await;
    let invitations = InvitationService::new(ctx.state.store(), ctx.state.identity());
    invitations
        .send_invitation(Role::AgencyAdmin, "ada@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap();

    let sent = ctx.identity.sent_invitations().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].redirect_url, REDIRECT);

    let ada = principal("user_ada", "Ada Admin", "ada@acme.test");
    let access = AccessService::new(ctx.state.store(), ctx.state.identity());
    let landing = access.enter_agency(Some(&ada)).await.unwrap();
    assert_eq!(landing, Landing::Agency(AgencyId::new(AGENCY)));

    let user = ctx.tenancy().user(&ada.id).await.unwrap().unwrap();
    assert_eq!(user.role, Role::AgencyAdmin);
    assert_eq!(user.agency_id, Some(AgencyId::new(AGENCY)));
    assert_eq!(
        ctx.identity.metadata_writes().await.last(),
        Some(&(ada.id.clone(), Some(Role::AgencyAdmin)))
    );
}

#[tokio::test]
async fn test_acceptance_is_idempotent() {
    let ctx = TestContext::seeded().await;
    InvitationService::new(ctx.state.store(), ctx.state.identity())
        .send_invitation(Role::SubaccountUser, "sam@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap();
    let sam = principal("user_sam", "Sam Seller", "sam@acme.test");
    let invitations = InvitationService::new(ctx.state.store(), ctx.state.identity());

    let first = invitations.verify_and_accept_invitation(&sam).await.unwrap();
    let second = invitations.verify_and_accept_invitation(&sam).await.unwrap();
    assert_eq!(first, Some(AgencyId::new(AGENCY)));
    assert_eq!(second, first);

    let team = ctx.tenancy().team_members(&AgencyId::new(AGENCY)).await.unwrap();
    assert_eq!(team.iter().filter(|u| u.email == sam.email).count(), 1);

    let joined = NotificationService::new(ctx.state.store())
        .agency_notifications(&AgencyId::new(AGENCY), &NotificationScope::Agency)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.notification.notification.ends_with("| Joined"))
        .count();
    assert_eq!(joined, 1);
    assert!(
        InvitationService::new(ctx.state.store(), ctx.state.identity())
            .agency_invitations(&AgencyId::new(AGENCY))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_owner_role_cannot_be_invited() {
    let ctx = TestContext::seeded().await;
    let err = InvitationService::new(ctx.state.store(), ctx.state.identity())
        .send_invitation(Role::AgencyOwner, "boss@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap_err();

    let AppError::Validation(err) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(err.has_field("role"));
    assert!(ctx.identity.sent_invitations().await.is_empty());
}

#[tokio::test]
async fn test_second_invitation_for_email_is_rejected() {
    let ctx = TestContext::seeded().await;
    let invitations = InvitationService::new(ctx.state.store(), ctx.state.identity());
    invitations
        .send_invitation(Role::SubaccountGuest, "gus@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap();

    let err = invitations
        .send_invitation(Role::AgencyAdmin, "gus@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::BadRequest(_)), "got {err:?}");
    assert_eq!(ctx.identity.sent_invitations().await.len(), 1);
}

#[tokio::test]
async fn test_failed_metadata_sync_still_accepts() {
    let ctx = TestContext::seeded().await;
    InvitationService::new(ctx.state.store(), ctx.state.identity())
        .send_invitation(Role::AgencyAdmin, "ada@acme.test", &AgencyId::new(AGENCY), REDIRECT)
        .await
        .unwrap();
    ctx.identity.fail_metadata_writes(true);

    let ada = principal("user_ada", "Ada Admin", "ada@acme.test");
    let agency = InvitationService::new(ctx.state.store(), ctx.state.identity())
        .verify_and_accept_invitation(&ada)
        .await
        .unwrap();

    assert_eq!(agency, Some(AgencyId::new(AGENCY)));
    assert!(ctx.tenancy().user(&ada.id).await.unwrap().is_some());
}
