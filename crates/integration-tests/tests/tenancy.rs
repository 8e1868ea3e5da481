//! Integration tests for agencies, sub-accounts and activity logs.

#![allow(clippy::unwrap_used)]

use plura_core::{AgencyId, Role, SubAccountId};
use plura_dashboard::error::AppError;
use plura_dashboard::services::{NotificationScope, NotificationService, PipelineService};
use plura_integration_tests::{
    AGENCY, SUB_ACCOUNT, TestContext, agency_input, principal, sub_account_input,
};

#[tokio::test]
async fn test_sub_account_without_owner_is_not_created() {
    let ctx = TestContext::new();
    // Company email matches no user, so the agency has no owner
    ctx.tenancy()
        .upsert_agency(&agency_input("agency_orphan", "nobody@orphan.test"))
        .await
        .unwrap();

    let created = ctx
        .tenancy()
        .upsert_sub_account(&sub_account_input("sub_orphan", "agency_orphan"))
        .await
        .unwrap();

    assert!(created.is_none());
    assert!(
        ctx.tenancy()
            .sub_account_details(&SubAccountId::new("sub_orphan"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_new_sub_account_gets_owner_permission_and_pipeline() {
    let ctx = TestContext::seeded().await;
    let owner = ctx.tenancy().user(&ctx.owner.id).await.unwrap().unwrap();

    let permissions = ctx.tenancy().user_permissions(&owner.id).await.unwrap();
    assert!(
        permissions
            .iter()
            .any(|p| p.permission.sub_account_id.as_str() == SUB_ACCOUNT && p.permission.access)
    );

    let pipelines = PipelineService::new(ctx.state.store())
        .pipelines(&SubAccountId::new(SUB_ACCOUNT))
        .await
        .unwrap();
    assert_eq!(pipelines.len(), 1);
    assert_eq!(pipelines[0].name, "Lead Cycle");
}

#[tokio::test]
async fn test_invalid_agency_writes_nothing() {
    let ctx = TestContext::new();
    let mut input = agency_input("agency_bad", "");
    input.name = "   ".to_string();

    let err = ctx.tenancy().upsert_agency(&input).await.unwrap_err();
    let AppError::Validation(err) = err else {
        panic!("expected a validation error, got {err:?}");
    };
    assert!(err.has_field("companyEmail"));
    assert!(err.has_field("name"));
    assert!(
        ctx.state
            .store()
            .agency(&AgencyId::new("agency_bad"))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_deleting_agency_removes_sub_accounts() {
    let ctx = TestContext::seeded().await;
    assert!(ctx.tenancy().delete_agency(&AgencyId::new(AGENCY)).await.unwrap());

    assert!(
        ctx.tenancy()
            .sub_account_details(&SubAccountId::new(SUB_ACCOUNT))
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_sub_account_members_see_only_their_activity() {
    let ctx = TestContext::seeded().await;
    let notifications = NotificationService::new(ctx.state.store());
    let agency_id = AgencyId::new(AGENCY);
    let shop_id = SubAccountId::new(SUB_ACCOUNT);

    notifications
        .save_activity_log(Some(&ctx.owner), "Updated agency", Some(&agency_id), None)
        .await
        .unwrap();
    notifications
        .save_activity_log(Some(&ctx.owner), "Uploaded a logo", None, Some(&shop_id))
        .await
        .unwrap();

    let everything = notifications
        .agency_notifications(&agency_id, &NotificationScope::Agency)
        .await
        .unwrap();
    assert_eq!(everything.len(), 2);
    // Newest first
    assert!(everything[0].notification.notification.ends_with("Uploaded a logo"));

    let shop_only = notifications
        .agency_notifications(&agency_id, &NotificationScope::SubAccount(shop_id.clone()))
        .await
        .unwrap();
    assert_eq!(shop_only.len(), 1);
    assert_eq!(shop_only[0].notification.sub_account_id, Some(shop_id));
    assert_eq!(
        shop_only[0].notification.notification,
        "Olive Owner | Uploaded a logo"
    );
}

#[tokio::test]
async fn test_activity_without_scope_is_rejected() {
    let ctx = TestContext::seeded().await;
    let err = NotificationService::new(ctx.state.store())
        .save_activity_log(Some(&ctx.owner), "Floating", None, None)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::MissingScope), "got {err:?}");
}

#[tokio::test]
async fn test_deleted_user_loses_role_metadata() {
    let ctx = TestContext::seeded().await;
    let temp = principal("user_temp", "Tom Temp", "tom@acme.test");
    let user = ctx
        .tenancy()
        .init_user(&temp, Some(Role::SubaccountGuest))
        .await
        .unwrap();

    let deleted = ctx.tenancy().delete_user(&user.id).await.unwrap();
    assert!(deleted.is_some());
    assert_eq!(
        ctx.identity.metadata_writes().await.last(),
        Some(&(user.id.clone(), None))
    );
}
