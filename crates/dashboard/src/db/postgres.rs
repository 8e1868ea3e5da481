//! `PostgreSQL` implementation of [`Store`].

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use plura_core::{
    AgencyId, Email, LaneId, MediaId, PermissionId, PipelineId, SubAccountId, TicketId, UserId,
};

use super::agencies::AgencyRepository;
use super::funnels::FunnelRepository;
use super::invitations::InvitationRepository;
use super::media::MediaRepository;
use super::notifications::NotificationRepository;
use super::pipelines::PipelineRepository;
use super::sub_accounts::SubAccountRepository;
use super::users::UserRepository;
use super::{RepositoryError, Store};
use crate::models::{
    Agency, AgencyDetails, AgencyPatch, AgencyRecord, Contact, ContactRecord, Funnel,
    FunnelRecord, Invitation, Lane, LaneDetail, LaneOrder, LaneRecord, Media, NewInvitation,
    NewMedia, NewNotification, NewUser, Notification, NotificationWithUser, Permission,
    PermissionWithSubAccount, Pipeline, PipelineRecord, SidebarOption, SidebarSeed, SubAccount,
    SubAccountDetails, SubAccountMedia, SubAccountRecord, SubAccountSeed, Tag, TagRecord, Ticket,
    TicketDetail, TicketOrder, TicketRecord, User, UserDetails, UserPatch,
};

/// [`Store`] backed by a shared connection pool.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn agency_details(&self, id: &AgencyId) -> Result<Option<AgencyDetails>, RepositoryError> {
        let agencies = AgencyRepository::new(&self.pool);
        let Some(agency) = agencies.get_by_id(id).await? else {
            return Ok(None);
        };

        let sidebar_options = agencies.sidebar(id).await?;
        let sub_accounts = SubAccountRepository::new(&self.pool)
            .list_for_agency(id)
            .await?;
        let ids: Vec<SubAccountId> = sub_accounts.iter().map(|s| s.id.clone()).collect();

        let mut sidebars: HashMap<SubAccountId, Vec<SidebarOption>> = HashMap::new();
        for (owner, option) in agencies.sub_account_sidebars(&ids).await? {
            sidebars.entry(owner).or_default().push(option);
        }

        let sub_accounts = sub_accounts
            .into_iter()
            .map(|sub_account| SubAccountDetails {
                sidebar_options: sidebars.remove(&sub_account.id).unwrap_or_default(),
                sub_account,
            })
            .collect();

        Ok(Some(AgencyDetails {
            agency,
            sidebar_options,
            sub_accounts,
        }))
    }
}

#[async_trait]
impl Store for PgStore {
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_email(email).await
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).get_by_id(id).await
    }

    async fn user_details(&self, email: &Email) -> Result<Option<UserDetails>, RepositoryError> {
        let users = UserRepository::new(&self.pool);
        let Some(user) = users.get_by_email(email).await? else {
            return Ok(None);
        };

        let agency = match &user.agency_id {
            Some(agency_id) => self.agency_details(agency_id).await?,
            None => None,
        };
        let permissions = users.permissions_for_email(email).await?;

        Ok(Some(UserDetails {
            user,
            agency,
            permissions,
        }))
    }

    async fn upsert_user(
        &self,
        create: &NewUser,
        update: &UserPatch,
    ) -> Result<User, RepositoryError> {
        UserRepository::new(&self.pool).upsert(create, update).await
    }

    async fn update_user(
        &self,
        email: &Email,
        patch: &UserPatch,
    ) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).update(email, patch).await
    }

    async fn delete_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).delete(id).await
    }

    async fn agency_owner(&self, agency_id: &AgencyId) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool).agency_owner(agency_id).await
    }

    async fn user_for_sub_account_agency(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<User>, RepositoryError> {
        UserRepository::new(&self.pool)
            .any_in_sub_account_agency(sub_account_id)
            .await
    }

    async fn team_members(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError> {
        UserRepository::new(&self.pool).list_for_agency(agency_id).await
    }

    async fn permissions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PermissionWithSubAccount>, RepositoryError> {
        let users = UserRepository::new(&self.pool);
        let Some(user) = users.get_by_id(user_id).await? else {
            return Ok(Vec::new());
        };

        let permissions = users.permissions_for_email(&user.email).await?;
        let ids: Vec<SubAccountId> = permissions
            .iter()
            .map(|p| p.sub_account_id.clone())
            .collect();
        let mut sub_accounts: HashMap<SubAccountId, SubAccount> =
            SubAccountRepository::new(&self.pool)
                .get_many(&ids)
                .await?
                .into_iter()
                .map(|s| (s.id.clone(), s))
                .collect();

        permissions
            .into_iter()
            .map(|permission| {
                let sub_account = sub_accounts.remove(&permission.sub_account_id).ok_or_else(|| {
                    RepositoryError::DataCorruption(format!(
                        "permission {} references missing sub-account",
                        permission.id
                    ))
                })?;
                Ok(PermissionWithSubAccount {
                    permission,
                    sub_account,
                })
            })
            .collect()
    }

    async fn upsert_permission(
        &self,
        id: &PermissionId,
        email: &Email,
        sub_account_id: &SubAccountId,
        access: bool,
    ) -> Result<Permission, RepositoryError> {
        UserRepository::new(&self.pool)
            .upsert_permission(id, email, sub_account_id, access)
            .await
    }

    async fn pending_invitation(
        &self,
        email: &Email,
    ) -> Result<Option<Invitation>, RepositoryError> {
        InvitationRepository::new(&self.pool).get_pending(email).await
    }

    async fn create_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<Invitation, RepositoryError> {
        InvitationRepository::new(&self.pool).create(invitation).await
    }

    async fn delete_invitation(&self, email: &Email) -> Result<bool, RepositoryError> {
        InvitationRepository::new(&self.pool)
            .delete_by_email(email)
            .await
    }

    async fn invitations_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        InvitationRepository::new(&self.pool)
            .list_for_agency(agency_id)
            .await
    }

    async fn agency(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError> {
        AgencyRepository::new(&self.pool).get_by_id(id).await
    }

    async fn upsert_agency(
        &self,
        record: &AgencyRecord,
        sidebar: &[SidebarSeed],
    ) -> Result<Agency, RepositoryError> {
        AgencyRepository::new(&self.pool).upsert(record, sidebar).await
    }

    async fn update_agency(
        &self,
        id: &AgencyId,
        patch: &AgencyPatch,
    ) -> Result<Option<Agency>, RepositoryError> {
        AgencyRepository::new(&self.pool).update(id, patch).await
    }

    async fn delete_agency(&self, id: &AgencyId) -> Result<bool, RepositoryError> {
        AgencyRepository::new(&self.pool).delete(id).await
    }

    async fn sub_account(&self, id: &SubAccountId) -> Result<Option<SubAccount>, RepositoryError> {
        SubAccountRepository::new(&self.pool).get_by_id(id).await
    }

    async fn upsert_sub_account(
        &self,
        record: &SubAccountRecord,
        seed: &SubAccountSeed,
    ) -> Result<SubAccount, RepositoryError> {
        SubAccountRepository::new(&self.pool)
            .upsert(record, seed)
            .await
    }

    async fn delete_sub_account(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, RepositoryError> {
        SubAccountRepository::new(&self.pool).delete(id).await
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        NotificationRepository::new(&self.pool)
            .create(notification)
            .await
    }

    async fn notifications_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<NotificationWithUser>, RepositoryError> {
        NotificationRepository::new(&self.pool)
            .list_for_agency(agency_id)
            .await
    }

    async fn sub_account_media(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<SubAccountMedia>, RepositoryError> {
        let Some(sub_account) = self.sub_account(sub_account_id).await? else {
            return Ok(None);
        };
        let media = MediaRepository::new(&self.pool)
            .list_for_sub_account(sub_account_id)
            .await?;
        Ok(Some(SubAccountMedia { sub_account, media }))
    }

    async fn create_media(
        &self,
        sub_account_id: &SubAccountId,
        media: &NewMedia,
    ) -> Result<Media, RepositoryError> {
        MediaRepository::new(&self.pool)
            .create(sub_account_id, media)
            .await
    }

    async fn delete_media(
        &self,
        sub_account_id: &SubAccountId,
        id: &MediaId,
    ) -> Result<Option<Media>, RepositoryError> {
        MediaRepository::new(&self.pool)
            .delete(sub_account_id, id)
            .await
    }

    async fn pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        PipelineRepository::new(&self.pool).get_by_id(id).await
    }

    async fn pipelines_for_sub_account(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Vec<Pipeline>, RepositoryError> {
        PipelineRepository::new(&self.pool)
            .list_for_sub_account(sub_account_id)
            .await
    }

    async fn upsert_pipeline(&self, record: &PipelineRecord) -> Result<Pipeline, RepositoryError> {
        PipelineRepository::new(&self.pool).upsert(record).await
    }

    async fn delete_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        PipelineRepository::new(&self.pool).delete(id).await
    }

    async fn lanes_with_tickets(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Vec<LaneDetail>, RepositoryError> {
        PipelineRepository::new(&self.pool)
            .lanes_with_tickets(pipeline_id)
            .await
    }

    async fn upsert_lane(&self, record: &LaneRecord) -> Result<Lane, RepositoryError> {
        PipelineRepository::new(&self.pool).upsert_lane(record).await
    }

    async fn delete_lane(&self, id: &LaneId) -> Result<Option<Lane>, RepositoryError> {
        PipelineRepository::new(&self.pool).delete_lane(id).await
    }

    async fn upsert_ticket(&self, record: &TicketRecord) -> Result<TicketDetail, RepositoryError> {
        PipelineRepository::new(&self.pool)
            .upsert_ticket(record)
            .await
    }

    async fn delete_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        PipelineRepository::new(&self.pool).delete_ticket(id).await
    }

    async fn upsert_tag(&self, record: &TagRecord) -> Result<Tag, RepositoryError> {
        PipelineRepository::new(&self.pool).upsert_tag(record).await
    }

    async fn upsert_contact(&self, record: &ContactRecord) -> Result<Contact, RepositoryError> {
        PipelineRepository::new(&self.pool)
            .upsert_contact(record)
            .await
    }

    async fn update_lanes_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[LaneOrder],
    ) -> Result<(), RepositoryError> {
        PipelineRepository::new(&self.pool)
            .update_lanes_order(pipeline_id, batch)
            .await
    }

    async fn update_tickets_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[TicketOrder],
    ) -> Result<(), RepositoryError> {
        PipelineRepository::new(&self.pool)
            .update_tickets_order(pipeline_id, batch)
            .await
    }

    async fn upsert_funnel(
        &self,
        sub_account_id: &SubAccountId,
        record: &FunnelRecord,
    ) -> Result<Funnel, RepositoryError> {
        FunnelRepository::new(&self.pool)
            .upsert(sub_account_id, record)
            .await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
