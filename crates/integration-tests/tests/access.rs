//! Integration tests for authorization and landing decisions.

#![allow(clippy::unwrap_used)]

use plura_core::{AgencyId, Role, SubAccountId};
use plura_dashboard::models::UserPatch;
use plura_dashboard::identity::Principal;
use plura_dashboard::services::{
    AccessDecision, AccessScope, AccessService, Entry, Landing, NotificationScope,
};
use plura_integration_tests::{AGENCY, SUB_ACCOUNT, TestContext, principal, sub_account_input};

fn agency() -> AccessScope {
    AccessScope::Agency(AgencyId::new(AGENCY))
}

fn shop() -> AccessScope {
    AccessScope::SubAccount(SubAccountId::new(SUB_ACCOUNT))
}

/// Add a member of `role` to the seeded agency.
async fn join(ctx: &TestContext, id: &str, email: &str, role: Role) -> Principal {
    let member = principal(id, "Mia Member", email);
    let tenancy = ctx.tenancy();
    tenancy.init_user(&member, Some(role)).await.unwrap();
    tenancy
        .update_user(
            &member.email,
            &UserPatch {
                agency_id: Some(AgencyId::new(AGENCY)),
                ..UserPatch::default()
            },
        )
        .await
        .unwrap();
    member
}

#[tokio::test]
async fn test_sub_account_user_needs_a_granted_permission() {
    let ctx = TestContext::seeded().await;
    let mia = join(&ctx, "user_mia", "mia@acme.test", Role::SubaccountUser).await;
    let access = AccessService::new(ctx.state.store(), ctx.state.identity());

    assert_eq!(
        access.authorize(Some(&mia), &shop()).await.unwrap(),
        AccessDecision::Unauthorized
    );

    ctx.tenancy()
        .change_user_permission(None, &mia.email, &SubAccountId::new(SUB_ACCOUNT), true)
        .await
        .unwrap();
    let AccessDecision::Allowed(granted) = access.authorize(Some(&mia), &shop()).await.unwrap()
    else {
        panic!("granted member denied");
    };
    assert_eq!(
        granted.notification_scope,
        NotificationScope::SubAccount(SubAccountId::new(SUB_ACCOUNT))
    );

    // Still no way into the agency itself
    assert_eq!(
        access.authorize(Some(&mia), &agency()).await.unwrap(),
        AccessDecision::Unauthorized
    );
}

#[tokio::test]
async fn test_revoked_permission_denies_access() {
    let ctx = TestContext::seeded().await;
    let mia = join(&ctx, "user_mia", "mia@acme.test", Role::SubaccountGuest).await;
    let shop_id = SubAccountId::new(SUB_ACCOUNT);
    let granted = ctx
        .tenancy()
        .change_user_permission(None, &mia.email, &shop_id, true)
        .await
        .unwrap();

    ctx.tenancy()
        .change_user_permission(Some(granted.id), &mia.email, &shop_id, false)
        .await
        .unwrap();

    let decision = AccessService::new(ctx.state.store(), ctx.state.identity())
        .authorize(Some(&mia), &shop())
        .await
        .unwrap();
    assert_eq!(decision, AccessDecision::Unauthorized);
}

#[tokio::test]
async fn test_admin_reaches_every_sub_account() {
    let ctx = TestContext::seeded().await;
    ctx.tenancy()
        .upsert_sub_account(&sub_account_input("sub_acme_blog", AGENCY))
        .await
        .unwrap()
        .unwrap();
    let ada = join(&ctx, "user_ada", "ada@acme.test", Role::AgencyAdmin).await;
    let access = AccessService::new(ctx.state.store(), ctx.state.identity());

    for id in [SUB_ACCOUNT, "sub_acme_blog"] {
        let decision = access
            .authorize(Some(&ada), &AccessScope::SubAccount(SubAccountId::new(id)))
            .await
            .unwrap();
        assert!(matches!(decision, AccessDecision::Allowed(_)), "admin denied {id}");
    }
}

#[tokio::test]
async fn test_unknown_scope_is_unauthorized() {
    let ctx = TestContext::seeded().await;
    let decision = AccessService::new(ctx.state.store(), ctx.state.identity())
        .authorize(
            Some(&ctx.owner),
            &AccessScope::SubAccount(SubAccountId::new("sub_missing")),
        )
        .await
        .unwrap();
    assert_eq!(decision, AccessDecision::Unauthorized);
}

#[tokio::test]
async fn test_landing_follows_role_and_permissions() {
    let ctx = TestContext::seeded().await;
    let access = AccessService::new(ctx.state.store(), ctx.state.identity());

    assert_eq!(access.enter_agency(None).await.unwrap(), Landing::SignIn);
    assert_eq!(
        access.enter_agency(Some(&ctx.owner)).await.unwrap(),
        Landing::Agency(AgencyId::new(AGENCY))
    );

    let newcomer = principal("user_new", "Nia New", "nia@elsewhere.test");
    assert_eq!(
        access.enter_agency(Some(&newcomer)).await.unwrap(),
        Landing::Onboarding
    );

    let mia = join(&ctx, "user_mia", "mia@acme.test", Role::SubaccountUser).await;
    assert_eq!(
        access.enter_agency(Some(&mia)).await.unwrap(),
        Landing::Unauthorized
    );
    ctx.tenancy()
        .change_user_permission(None, &mia.email, &SubAccountId::new(SUB_ACCOUNT), true)
        .await
        .unwrap();
    assert_eq!(
        access.enter_agency(Some(&mia)).await.unwrap(),
        Landing::SubAccount(SubAccountId::new(SUB_ACCOUNT))
    );
}

#[tokio::test]
async fn test_open_agency_lists_notifications() {
    let ctx = TestContext::seeded().await;
    let entry = AccessService::new(ctx.state.store(), ctx.state.identity())
        .open_agency(Some(&ctx.owner), &AgencyId::new(AGENCY))
        .await
        .unwrap();

    let Entry::Allowed(workspace) = entry else {
        panic!("owner could not open their agency");
    };
    assert_eq!(workspace.access.role, Role::AgencyOwner);
    assert_eq!(workspace.access.agency_id, AgencyId::new(AGENCY));
}

#[tokio::test]
async fn test_role_cached_on_identity_profile_takes_precedence() {
    let ctx = TestContext::seeded().await;
    let mia = join(&ctx, "user_mia", "mia@acme.test", Role::SubaccountUser).await;
    ctx.sign_in("session_mia", &mia).await;
    ctx.state
        .identity()
        .update_role_metadata(&mia.id, Some(Role::AgencyAdmin))
        .await
        .unwrap();

    let mia = ctx
        .state
        .identity()
        .current_principal("session_mia")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(mia.role_metadata, Some(Role::AgencyAdmin));

    let access = AccessService::new(ctx.state.store(), ctx.state.identity());
    let AccessDecision::Allowed(granted) = access.authorize(Some(&mia), &shop()).await.unwrap()
    else {
        panic!("admin by metadata denied");
    };
    assert_eq!(granted.role, Role::AgencyAdmin);
    assert_eq!(granted.notification_scope, NotificationScope::Agency);
    assert_eq!(
        access.enter_agency(Some(&mia)).await.unwrap(),
        Landing::Agency(AgencyId::new(AGENCY))
    );
}
