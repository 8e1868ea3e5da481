//! In-process implementation of [`Store`].
//!
//! Holds every table in plain collections behind one async mutex. Each
//! write runs against a scratch copy of the tables that replaces the live
//! copy only when the whole operation succeeded, so a failed multi-row
//! write leaves nothing behind, as a rolled back transaction would.
//! Foreign keys, unique columns and cascading deletes of the `plura`
//! schema are enforced here as well.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use plura_core::{
    AgencyId, ContactId, Email, FunnelId, InvitationStatus, LaneId, MediaId, PermissionId,
    PipelineId, Role, SidebarOptionId, SubAccountId, TagId, TicketId, UserId,
};

use super::{RepositoryError, Store, is_contiguous};
use crate::models::{
    Agency, AgencyDetails, AgencyPatch, AgencyRecord, Contact, ContactRecord, Funnel,
    FunnelRecord, Invitation, Lane, LaneDetail, LaneOrder, LaneRecord, Media, NewInvitation,
    NewMedia, NewNotification, NewUser, Notification, NotificationWithUser, Permission,
    PermissionWithSubAccount, Pipeline, PipelineRecord, SidebarOption, SidebarSeed, SubAccount,
    SubAccountDetails, SubAccountMedia, SubAccountRecord, SubAccountSeed, Tag, TagRecord, Ticket,
    TicketDetail, TicketOrder, TicketRecord, User, UserDetails, UserPatch,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    agencies: BTreeMap<AgencyId, Agency>,
    agency_sidebar: Vec<(AgencyId, SidebarOption)>,
    sub_accounts: BTreeMap<SubAccountId, SubAccount>,
    sub_account_sidebar: Vec<(SubAccountId, SidebarOption)>,
    users: BTreeMap<UserId, User>,
    permissions: Vec<Permission>,
    invitations: Vec<Invitation>,
    /// Insertion order; newest last.
    notifications: Vec<Notification>,
    pipelines: BTreeMap<PipelineId, Pipeline>,
    lanes: BTreeMap<LaneId, Lane>,
    tickets: BTreeMap<TicketId, Ticket>,
    ticket_tags: BTreeSet<(TicketId, TagId)>,
    tags: BTreeMap<TagId, Tag>,
    contacts: BTreeMap<ContactId, Contact>,
    media: Vec<Media>,
    funnels: BTreeMap<FunnelId, Funnel>,
}

fn conflict(message: impl Into<String>) -> RepositoryError {
    RepositoryError::Conflict(message.into())
}

impl Tables {
    fn user_by_email(&self, email: &Email) -> Option<&User> {
        self.users.values().find(|u| &u.email == email)
    }

    fn sidebar_of_agency(&self, id: &AgencyId) -> Vec<SidebarOption> {
        self.agency_sidebar
            .iter()
            .filter(|(owner, _)| owner == id)
            .map(|(_, option)| option.clone())
            .collect()
    }

    fn sidebar_of_sub_account(&self, id: &SubAccountId) -> Vec<SidebarOption> {
        self.sub_account_sidebar
            .iter()
            .filter(|(owner, _)| owner == id)
            .map(|(_, option)| option.clone())
            .collect()
    }

    fn sub_accounts_of(&self, agency_id: &AgencyId) -> Vec<SubAccount> {
        let mut list: Vec<SubAccount> = self
            .sub_accounts
            .values()
            .filter(|s| &s.agency_id == agency_id)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        list
    }

    fn agency_details(&self, id: &AgencyId) -> Option<AgencyDetails> {
        let agency = self.agencies.get(id)?.clone();
        let sub_accounts = self
            .sub_accounts_of(id)
            .into_iter()
            .map(|sub_account| SubAccountDetails {
                sidebar_options: self.sidebar_of_sub_account(&sub_account.id),
                sub_account,
            })
            .collect();
        Some(AgencyDetails {
            agency,
            sidebar_options: self.sidebar_of_agency(id),
            sub_accounts,
        })
    }

    fn permissions_of(&self, email: &Email) -> Vec<Permission> {
        let mut list: Vec<Permission> = self
            .permissions
            .iter()
            .filter(|p| &p.email == email)
            .cloned()
            .collect();
        list.sort_by(|a, b| a.sub_account_id.cmp(&b.sub_account_id));
        list
    }

    fn lane_orders(&self, pipeline_id: &PipelineId) -> Vec<i32> {
        self.lanes
            .values()
            .filter(|l| &l.pipeline_id == pipeline_id)
            .map(|l| l.order)
            .collect()
    }

    fn ticket_orders(&self, lane_id: &LaneId) -> Vec<i32> {
        self.tickets
            .values()
            .filter(|t| &t.lane_id == lane_id)
            .map(|t| t.order)
            .collect()
    }

    fn ticket_detail(&self, ticket: &Ticket) -> TicketDetail {
        let mut tags: Vec<Tag> = self
            .ticket_tags
            .iter()
            .filter(|(ticket_id, _)| ticket_id == &ticket.id)
            .filter_map(|(_, tag_id)| self.tags.get(tag_id).cloned())
            .collect();
        tags.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        TicketDetail {
            tags,
            assigned: ticket
                .assigned_user_id
                .as_ref()
                .and_then(|id| self.users.get(id).cloned()),
            customer: ticket
                .customer_id
                .as_ref()
                .and_then(|id| self.contacts.get(id).cloned()),
            ticket: ticket.clone(),
        }
    }

    // --- cascades ---

    fn remove_lane(&mut self, id: &LaneId) -> Option<Lane> {
        let lane = self.lanes.remove(id)?;
        let tickets: Vec<TicketId> = self
            .tickets
            .values()
            .filter(|t| &t.lane_id == id)
            .map(|t| t.id.clone())
            .collect();
        for ticket_id in tickets {
            self.remove_ticket(&ticket_id);
        }
        Some(lane)
    }

    fn remove_ticket(&mut self, id: &TicketId) -> Option<Ticket> {
        self.ticket_tags.retain(|(ticket_id, _)| ticket_id != id);
        self.tickets.remove(id)
    }

    fn remove_pipeline(&mut self, id: &PipelineId) -> Option<Pipeline> {
        let pipeline = self.pipelines.remove(id)?;
        let lanes: Vec<LaneId> = self
            .lanes
            .values()
            .filter(|l| &l.pipeline_id == id)
            .map(|l| l.id.clone())
            .collect();
        for lane_id in lanes {
            self.remove_lane(&lane_id);
        }
        Some(pipeline)
    }

    fn remove_sub_account(&mut self, id: &SubAccountId) -> Option<SubAccount> {
        let sub_account = self.sub_accounts.remove(id)?;
        let pipelines: Vec<PipelineId> = self
            .pipelines
            .values()
            .filter(|p| &p.sub_account_id == id)
            .map(|p| p.id.clone())
            .collect();
        for pipeline_id in pipelines {
            self.remove_pipeline(&pipeline_id);
        }

        let tags: BTreeSet<TagId> = self
            .tags
            .values()
            .filter(|t| &t.sub_account_id == id)
            .map(|t| t.id.clone())
            .collect();
        self.ticket_tags.retain(|(_, tag_id)| !tags.contains(tag_id));
        self.tags.retain(|_, t| &t.sub_account_id != id);

        self.contacts.retain(|_, c| &c.sub_account_id != id);
        for ticket in self.tickets.values_mut() {
            if ticket
                .customer_id
                .as_ref()
                .is_some_and(|c| !self.contacts.contains_key(c))
            {
                ticket.customer_id = None;
            }
        }

        self.permissions.retain(|p| &p.sub_account_id != id);
        self.notifications
            .retain(|n| n.sub_account_id.as_ref() != Some(id));
        self.sub_account_sidebar.retain(|(owner, _)| owner != id);
        self.media.retain(|m| &m.sub_account_id != id);
        self.funnels.retain(|_, f| &f.sub_account_id != id);
        Some(sub_account)
    }

    fn remove_user(&mut self, id: &UserId) -> Option<User> {
        let user = self.users.remove(id)?;
        self.permissions.retain(|p| p.email != user.email);
        self.notifications.retain(|n| &n.user_id != id);
        for ticket in self.tickets.values_mut() {
            if ticket.assigned_user_id.as_ref() == Some(id) {
                ticket.assigned_user_id = None;
            }
        }
        Some(user)
    }

    fn remove_agency(&mut self, id: &AgencyId) -> bool {
        if self.agencies.remove(id).is_none() {
            return false;
        }
        let sub_accounts: Vec<SubAccountId> = self
            .sub_accounts
            .values()
            .filter(|s| &s.agency_id == id)
            .map(|s| s.id.clone())
            .collect();
        for sub_account_id in sub_accounts {
            self.remove_sub_account(&sub_account_id);
        }
        let users: Vec<UserId> = self
            .users
            .values()
            .filter(|u| u.agency_id.as_ref() == Some(id))
            .map(|u| u.id.clone())
            .collect();
        for user_id in users {
            self.remove_user(&user_id);
        }
        self.invitations.retain(|i| &i.agency_id != id);
        self.notifications.retain(|n| &n.agency_id != id);
        self.agency_sidebar.retain(|(owner, _)| owner != id);
        true
    }
}

/// [`Store`] kept entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    async fn read<T>(&self, f: impl FnOnce(&Tables) -> T + Send) -> T {
        let tables = self.tables.lock().await;
        f(&tables)
    }

    /// Run `f` on a scratch copy, publishing it only on success.
    async fn write<T>(
        &self,
        f: impl FnOnce(&mut Tables) -> Result<T, RepositoryError> + Send,
    ) -> Result<T, RepositoryError> {
        let mut tables = self.tables.lock().await;
        let mut scratch = tables.clone();
        let out = f(&mut scratch)?;
        *tables = scratch;
        Ok(out)
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|t| t.user_by_email(email).cloned()).await)
    }

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        Ok(self.read(|t| t.users.get(id).cloned()).await)
    }

    async fn user_details(&self, email: &Email) -> Result<Option<UserDetails>, RepositoryError> {
        Ok(self
            .read(|t| {
                let user = t.user_by_email(email)?.clone();
                let agency = user.agency_id.as_ref().and_then(|id| t.agency_details(id));
                Some(UserDetails {
                    permissions: t.permissions_of(email),
                    agency,
                    user,
                })
            })
            .await)
    }

    async fn upsert_user(
        &self,
        create: &NewUser,
        update: &UserPatch,
    ) -> Result<User, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            if let Some(existing) = t.users.values_mut().find(|u| u.email == create.email) {
                if let Some(agency_id) = &update.agency_id
                    && !t.agencies.contains_key(agency_id)
                {
                    return Err(conflict("agency does not exist"));
                }
                update.apply_to(existing);
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            if t.users.contains_key(&create.id) {
                return Err(conflict("user id already exists"));
            }
            if let Some(agency_id) = &create.agency_id
                && !t.agencies.contains_key(agency_id)
            {
                return Err(conflict("agency does not exist"));
            }
            let user = User {
                id: create.id.clone(),
                name: create.name.clone(),
                avatar_url: create.avatar_url.clone(),
                email: create.email.clone(),
                role: create.role,
                agency_id: create.agency_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.users.insert(user.id.clone(), user.clone());
            Ok(user)
        })
        .await
    }

    async fn update_user(
        &self,
        email: &Email,
        patch: &UserPatch,
    ) -> Result<Option<User>, RepositoryError> {
        self.write(|t| {
            if let Some(agency_id) = &patch.agency_id
                && !t.agencies.contains_key(agency_id)
            {
                return Err(conflict("agency does not exist"));
            }
            Ok(t.users.values_mut().find(|u| &u.email == email).map(|user| {
                patch.apply_to(user);
                user.updated_at = Utc::now();
                user.clone()
            }))
        })
        .await
    }

    async fn delete_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        self.write(|t| Ok(t.remove_user(id))).await
    }

    async fn agency_owner(&self, agency_id: &AgencyId) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .read(|t| {
                t.users
                    .values()
                    .filter(|u| u.agency_id.as_ref() == Some(agency_id))
                    .filter(|u| u.role == Role::AgencyOwner)
                    .min_by_key(|u| u.created_at)
                    .cloned()
            })
            .await)
    }

    async fn user_for_sub_account_agency(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .read(|t| {
                let agency_id = &t.sub_accounts.get(sub_account_id)?.agency_id;
                t.users
                    .values()
                    .filter(|u| u.agency_id.as_ref() == Some(agency_id))
                    .min_by_key(|u| u.created_at)
                    .cloned()
            })
            .await)
    }

    async fn team_members(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError> {
        Ok(self
            .read(|t| {
                let mut list: Vec<User> = t
                    .users
                    .values()
                    .filter(|u| u.agency_id.as_ref() == Some(agency_id))
                    .cloned()
                    .collect();
                list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                list
            })
            .await)
    }

    async fn permissions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PermissionWithSubAccount>, RepositoryError> {
        self.read(|t| {
            let Some(user) = t.users.get(user_id) else {
                return Ok(Vec::new());
            };
            t.permissions_of(&user.email)
                .into_iter()
                .map(|permission| {
                    let sub_account = t
                        .sub_accounts
                        .get(&permission.sub_account_id)
                        .cloned()
                        .ok_or_else(|| {
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
        })
        .await
    }

    async fn upsert_permission(
        &self,
        id: &PermissionId,
        email: &Email,
        sub_account_id: &SubAccountId,
        access: bool,
    ) -> Result<Permission, RepositoryError> {
        self.write(|t| {
            if let Some(existing) = t.permissions.iter_mut().find(|p| &p.id == id) {
                existing.access = access;
                return Ok(existing.clone());
            }
            if let Some(existing) = t
                .permissions
                .iter_mut()
                .find(|p| &p.email == email && &p.sub_account_id == sub_account_id)
            {
                existing.access = access;
                return Ok(existing.clone());
            }
            if t.user_by_email(email).is_none() {
                return Err(conflict("user does not exist"));
            }
            if !t.sub_accounts.contains_key(sub_account_id) {
                return Err(conflict("sub-account does not exist"));
            }
            let permission = Permission {
                id: id.clone(),
                email: email.clone(),
                sub_account_id: sub_account_id.clone(),
                access,
            };
            t.permissions.push(permission.clone());
            Ok(permission)
        })
        .await
    }

    async fn pending_invitation(
        &self,
        email: &Email,
    ) -> Result<Option<Invitation>, RepositoryError> {
        Ok(self
            .read(|t| {
                t.invitations
                    .iter()
                    .find(|i| &i.email == email && i.status == InvitationStatus::Pending)
                    .cloned()
            })
            .await)
    }

    async fn create_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<Invitation, RepositoryError> {
        self.write(|t| {
            if t.invitations.iter().any(|i| i.email == invitation.email) {
                return Err(conflict("invitation already exists"));
            }
            if !t.agencies.contains_key(&invitation.agency_id) {
                return Err(conflict("agency does not exist"));
            }
            let created = Invitation {
                id: invitation.id.clone(),
                email: invitation.email.clone(),
                agency_id: invitation.agency_id.clone(),
                status: InvitationStatus::Pending,
                role: invitation.role,
            };
            t.invitations.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn delete_invitation(&self, email: &Email) -> Result<bool, RepositoryError> {
        self.write(|t| {
            let before = t.invitations.len();
            t.invitations.retain(|i| &i.email != email);
            Ok(t.invitations.len() != before)
        })
        .await
    }

    async fn invitations_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        Ok(self
            .read(|t| {
                let mut list: Vec<Invitation> = t
                    .invitations
                    .iter()
                    .filter(|i| &i.agency_id == agency_id)
                    .cloned()
                    .collect();
                list.sort_by(|a, b| a.email.cmp(&b.email));
                list
            })
            .await)
    }

    async fn agency(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError> {
        Ok(self.read(|t| t.agencies.get(id).cloned()).await)
    }

    async fn upsert_agency(
        &self,
        record: &AgencyRecord,
        sidebar: &[SidebarSeed],
    ) -> Result<Agency, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            let created_at = match t.agencies.get(&record.id) {
                Some(existing) => existing.created_at,
                None => {
                    for seed in sidebar {
                        t.agency_sidebar.push((
                            record.id.clone(),
                            SidebarOption {
                                id: SidebarOptionId::generate(),
                                name: seed.name.to_string(),
                                icon: seed.icon.to_string(),
                                link: seed.link.clone(),
                                created_at: now,
                            },
                        ));
                    }
                    for user in t.users.values_mut() {
                        if user.email.as_str() == record.company_email {
                            user.agency_id = Some(record.id.clone());
                            user.updated_at = now;
                        }
                    }
                    now
                }
            };
            let agency = Agency {
                id: record.id.clone(),
                connect_account_id: record.connect_account_id.clone(),
                name: record.name.clone(),
                agency_logo: record.agency_logo.clone(),
                company_email: record.company_email.clone(),
                company_phone: record.company_phone.clone(),
                white_label: record.white_label,
                address: record.address.clone(),
                city: record.city.clone(),
                zip_code: record.zip_code.clone(),
                state: record.state.clone(),
                country: record.country.clone(),
                goal: record.goal,
                created_at,
                updated_at: now,
            };
            t.agencies.insert(agency.id.clone(), agency.clone());
            Ok(agency)
        })
        .await
    }

    async fn update_agency(
        &self,
        id: &AgencyId,
        patch: &AgencyPatch,
    ) -> Result<Option<Agency>, RepositoryError> {
        self.write(|t| {
            Ok(t.agencies.get_mut(id).map(|agency| {
                patch.apply_to(agency);
                agency.updated_at = Utc::now();
                agency.clone()
            }))
        })
        .await
    }

    async fn delete_agency(&self, id: &AgencyId) -> Result<bool, RepositoryError> {
        self.write(|t| Ok(t.remove_agency(id))).await
    }

    async fn sub_account(&self, id: &SubAccountId) -> Result<Option<SubAccount>, RepositoryError> {
        Ok(self.read(|t| t.sub_accounts.get(id).cloned()).await)
    }

    async fn upsert_sub_account(
        &self,
        record: &SubAccountRecord,
        seed: &SubAccountSeed,
    ) -> Result<SubAccount, RepositoryError> {
        self.write(|t| {
            if !t.agencies.contains_key(&record.agency_id) {
                return Err(conflict("agency does not exist"));
            }
            let now = Utc::now();
            let existing = t.sub_accounts.get(&record.id).map(|s| s.created_at);
            let sub_account = SubAccount {
                id: record.id.clone(),
                agency_id: record.agency_id.clone(),
                connect_account_id: record.connect_account_id.clone(),
                name: record.name.clone(),
                sub_account_logo: record.sub_account_logo.clone(),
                company_email: record.company_email.clone(),
                company_phone: record.company_phone.clone(),
                address: record.address.clone(),
                city: record.city.clone(),
                zip_code: record.zip_code.clone(),
                state: record.state.clone(),
                country: record.country.clone(),
                goal: record.goal,
                created_at: existing.unwrap_or(now),
                updated_at: now,
            };
            t.sub_accounts
                .insert(sub_account.id.clone(), sub_account.clone());

            if existing.is_none() {
                if t.user_by_email(&seed.owner_email).is_none() {
                    return Err(conflict("owner does not exist"));
                }
                match t
                    .permissions
                    .iter_mut()
                    .find(|p| p.email == seed.owner_email && p.sub_account_id == record.id)
                {
                    Some(permission) => permission.access = true,
                    None => t.permissions.push(Permission {
                        id: seed.permission_id.clone(),
                        email: seed.owner_email.clone(),
                        sub_account_id: record.id.clone(),
                        access: true,
                    }),
                }

                let pipeline = Pipeline {
                    id: PipelineId::generate(),
                    name: seed.pipeline_name.clone(),
                    sub_account_id: record.id.clone(),
                    created_at: now,
                    updated_at: now,
                };
                t.pipelines.insert(pipeline.id.clone(), pipeline);

                for option in &seed.sidebar {
                    t.sub_account_sidebar.push((
                        record.id.clone(),
                        SidebarOption {
                            id: SidebarOptionId::generate(),
                            name: option.name.to_string(),
                            icon: option.icon.to_string(),
                            link: option.link.clone(),
                            created_at: now,
                        },
                    ));
                }
            }
            Ok(sub_account)
        })
        .await
    }

    async fn delete_sub_account(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, RepositoryError> {
        self.write(|t| Ok(t.remove_sub_account(id))).await
    }

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        self.write(|t| {
            if !t.agencies.contains_key(&notification.agency_id) {
                return Err(conflict("agency does not exist"));
            }
            if !t.users.contains_key(&notification.user_id) {
                return Err(conflict("user does not exist"));
            }
            if let Some(sub_account_id) = &notification.sub_account_id
                && !t.sub_accounts.contains_key(sub_account_id)
            {
                return Err(conflict("sub-account does not exist"));
            }
            let now = Utc::now();
            let created = Notification {
                id: notification.id.clone(),
                notification: notification.notification.clone(),
                agency_id: notification.agency_id.clone(),
                sub_account_id: notification.sub_account_id.clone(),
                user_id: notification.user_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.notifications.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn notifications_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<NotificationWithUser>, RepositoryError> {
        Ok(self
            .read(|t| {
                t.notifications
                    .iter()
                    .rev()
                    .filter(|n| &n.agency_id == agency_id)
                    .filter_map(|n| {
                        Some(NotificationWithUser {
                            user: t.users.get(&n.user_id)?.clone(),
                            notification: n.clone(),
                        })
                    })
                    .collect()
            })
            .await)
    }

    async fn sub_account_media(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<SubAccountMedia>, RepositoryError> {
        Ok(self
            .read(|t| {
                let sub_account = t.sub_accounts.get(sub_account_id)?.clone();
                let media = t
                    .media
                    .iter()
                    .rev()
                    .filter(|m| &m.sub_account_id == sub_account_id)
                    .cloned()
                    .collect();
                Some(SubAccountMedia { sub_account, media })
            })
            .await)
    }

    async fn create_media(
        &self,
        sub_account_id: &SubAccountId,
        media: &NewMedia,
    ) -> Result<Media, RepositoryError> {
        self.write(|t| {
            if !t.sub_accounts.contains_key(sub_account_id) {
                return Err(conflict("sub-account does not exist"));
            }
            if t.media.iter().any(|m| m.link == media.link) {
                return Err(conflict("media link already exists"));
            }
            let now = Utc::now();
            let created = Media {
                id: media.id.clone(),
                media_type: media.media_type.clone(),
                name: media.name.clone(),
                link: media.link.clone(),
                sub_account_id: sub_account_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.media.push(created.clone());
            Ok(created)
        })
        .await
    }

    async fn delete_media(
        &self,
        sub_account_id: &SubAccountId,
        id: &MediaId,
    ) -> Result<Option<Media>, RepositoryError> {
        self.write(|t| {
            let position = t
                .media
                .iter()
                .position(|m| &m.id == id && &m.sub_account_id == sub_account_id);
            Ok(position.map(|i| t.media.remove(i)))
        })
        .await
    }

    async fn pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        Ok(self.read(|t| t.pipelines.get(id).cloned()).await)
    }

    async fn pipelines_for_sub_account(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Vec<Pipeline>, RepositoryError> {
        Ok(self
            .read(|t| {
                let mut list: Vec<Pipeline> = t
                    .pipelines
                    .values()
                    .filter(|p| &p.sub_account_id == sub_account_id)
                    .cloned()
                    .collect();
                list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
                list
            })
            .await)
    }

    async fn upsert_pipeline(&self, record: &PipelineRecord) -> Result<Pipeline, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            if let Some(existing) = t.pipelines.get_mut(&record.id) {
                existing.name.clone_from(&record.name);
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            if !t.sub_accounts.contains_key(&record.sub_account_id) {
                return Err(conflict("sub-account does not exist"));
            }
            let pipeline = Pipeline {
                id: record.id.clone(),
                name: record.name.clone(),
                sub_account_id: record.sub_account_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.pipelines.insert(pipeline.id.clone(), pipeline.clone());
            Ok(pipeline)
        })
        .await
    }

    async fn delete_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        self.write(|t| Ok(t.remove_pipeline(id))).await
    }

    async fn lanes_with_tickets(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Vec<LaneDetail>, RepositoryError> {
        Ok(self
            .read(|t| {
                let mut lanes: Vec<&Lane> = t
                    .lanes
                    .values()
                    .filter(|l| &l.pipeline_id == pipeline_id)
                    .collect();
                lanes.sort_by_key(|l| l.order);
                lanes
                    .into_iter()
                    .map(|lane| {
                        let mut tickets: Vec<&Ticket> =
                            t.tickets.values().filter(|x| x.lane_id == lane.id).collect();
                        tickets.sort_by_key(|x| x.order);
                        LaneDetail {
                            lane: lane.clone(),
                            tickets: tickets.into_iter().map(|x| t.ticket_detail(x)).collect(),
                        }
                    })
                    .collect()
            })
            .await)
    }

    async fn upsert_lane(&self, record: &LaneRecord) -> Result<Lane, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            if let Some(existing) = t.lanes.get_mut(&record.id) {
                existing.name.clone_from(&record.name);
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            if !t.pipelines.contains_key(&record.pipeline_id) {
                return Err(conflict("pipeline does not exist"));
            }
            let order = i32::try_from(t.lane_orders(&record.pipeline_id).len())
                .map_err(|_| conflict("too many lanes"))?;
            let lane = Lane {
                id: record.id.clone(),
                name: record.name.clone(),
                pipeline_id: record.pipeline_id.clone(),
                order,
                created_at: now,
                updated_at: now,
            };
            t.lanes.insert(lane.id.clone(), lane.clone());
            Ok(lane)
        })
        .await
    }

    async fn delete_lane(&self, id: &LaneId) -> Result<Option<Lane>, RepositoryError> {
        self.write(|t| {
            let Some(lane) = t.remove_lane(id) else {
                return Ok(None);
            };
            for sibling in t.lanes.values_mut() {
                if sibling.pipeline_id == lane.pipeline_id && sibling.order > lane.order {
                    sibling.order -= 1;
                }
            }
            Ok(Some(lane))
        })
        .await
    }

    async fn upsert_ticket(&self, record: &TicketRecord) -> Result<TicketDetail, RepositoryError> {
        self.write(|t| {
            if !t.lanes.contains_key(&record.lane_id) {
                return Err(conflict("lane does not exist"));
            }
            if let Some(customer_id) = &record.customer_id
                && !t.contacts.contains_key(customer_id)
            {
                return Err(conflict("contact does not exist"));
            }
            if let Some(user_id) = &record.assigned_user_id
                && !t.users.contains_key(user_id)
            {
                return Err(conflict("assigned user does not exist"));
            }
            if let Some(missing) = record.tag_ids.iter().find(|id| !t.tags.contains_key(*id)) {
                return Err(conflict(format!("tag {missing} does not exist")));
            }

            let now = Utc::now();
            let ticket = match t.tickets.get(&record.id) {
                Some(existing) => Ticket {
                    name: record.name.clone(),
                    value: record.value,
                    description: record.description.clone(),
                    customer_id: record.customer_id.clone(),
                    assigned_user_id: record.assigned_user_id.clone(),
                    updated_at: now,
                    ..existing.clone()
                },
                None => Ticket {
                    id: record.id.clone(),
                    name: record.name.clone(),
                    lane_id: record.lane_id.clone(),
                    order: i32::try_from(t.ticket_orders(&record.lane_id).len())
                        .map_err(|_| conflict("too many tickets"))?,
                    value: record.value,
                    description: record.description.clone(),
                    customer_id: record.customer_id.clone(),
                    assigned_user_id: record.assigned_user_id.clone(),
                    created_at: now,
                    updated_at: now,
                },
            };
            t.tickets.insert(ticket.id.clone(), ticket.clone());

            t.ticket_tags.retain(|(ticket_id, _)| ticket_id != &record.id);
            for tag_id in &record.tag_ids {
                t.ticket_tags.insert((record.id.clone(), tag_id.clone()));
            }
            Ok(t.ticket_detail(&ticket))
        })
        .await
    }

    async fn delete_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        self.write(|t| {
            let Some(ticket) = t.remove_ticket(id) else {
                return Ok(None);
            };
            for sibling in t.tickets.values_mut() {
                if sibling.lane_id == ticket.lane_id && sibling.order > ticket.order {
                    sibling.order -= 1;
                }
            }
            Ok(Some(ticket))
        })
        .await
    }

    async fn upsert_tag(&self, record: &TagRecord) -> Result<Tag, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            if let Some(existing) = t.tags.get_mut(&record.id) {
                existing.name.clone_from(&record.name);
                existing.color.clone_from(&record.color);
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            if !t.sub_accounts.contains_key(&record.sub_account_id) {
                return Err(conflict("sub-account does not exist"));
            }
            let tag = Tag {
                id: record.id.clone(),
                name: record.name.clone(),
                color: record.color.clone(),
                sub_account_id: record.sub_account_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.tags.insert(tag.id.clone(), tag.clone());
            Ok(tag)
        })
        .await
    }

    async fn upsert_contact(&self, record: &ContactRecord) -> Result<Contact, RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            if let Some(existing) = t.contacts.get_mut(&record.id) {
                existing.name.clone_from(&record.name);
                existing.email.clone_from(&record.email);
                existing.updated_at = now;
                return Ok(existing.clone());
            }
            if !t.sub_accounts.contains_key(&record.sub_account_id) {
                return Err(conflict("sub-account does not exist"));
            }
            let contact = Contact {
                id: record.id.clone(),
                name: record.name.clone(),
                email: record.email.clone(),
                sub_account_id: record.sub_account_id.clone(),
                created_at: now,
                updated_at: now,
            };
            t.contacts.insert(contact.id.clone(), contact.clone());
            Ok(contact)
        })
        .await
    }

    async fn update_lanes_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[LaneOrder],
    ) -> Result<(), RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            for item in batch {
                let lane = t
                    .lanes
                    .get_mut(&item.id)
                    .filter(|l| &l.pipeline_id == pipeline_id)
                    .ok_or(RepositoryError::NotFound)?;
                lane.order = item.order;
                lane.updated_at = now;
            }
            if !is_contiguous(&t.lane_orders(pipeline_id)) {
                return Err(conflict(format!(
                    "lane orders of pipeline {pipeline_id} would not be contiguous"
                )));
            }
            Ok(())
        })
        .await
    }

    async fn update_tickets_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[TicketOrder],
    ) -> Result<(), RepositoryError> {
        self.write(|t| {
            let now = Utc::now();
            let in_pipeline = |lanes: &BTreeMap<LaneId, Lane>, lane_id: &LaneId| {
                lanes
                    .get(lane_id)
                    .is_some_and(|l| &l.pipeline_id == pipeline_id)
            };

            let mut touched: BTreeSet<LaneId> = BTreeSet::new();
            for item in batch {
                if !in_pipeline(&t.lanes, &item.lane_id) {
                    return Err(RepositoryError::NotFound);
                }
                let ticket = t
                    .tickets
                    .get_mut(&item.id)
                    .ok_or(RepositoryError::NotFound)?;
                if !in_pipeline(&t.lanes, &ticket.lane_id) {
                    return Err(RepositoryError::NotFound);
                }
                touched.insert(ticket.lane_id.clone());
                touched.insert(item.lane_id.clone());
                ticket.lane_id = item.lane_id.clone();
                ticket.order = item.order;
                ticket.updated_at = now;
            }

            for lane_id in &touched {
                if !is_contiguous(&t.ticket_orders(lane_id)) {
                    return Err(conflict(format!(
                        "ticket orders of lane {lane_id} would not be contiguous"
                    )));
                }
            }
            Ok(())
        })
        .await
    }

    async fn upsert_funnel(
        &self,
        sub_account_id: &SubAccountId,
        record: &FunnelRecord,
    ) -> Result<Funnel, RepositoryError> {
        self.write(|t| {
            if let Some(sub_domain) = &record.sub_domain_name
                && t.funnels.values().any(|f| {
                    f.id != record.id && f.sub_domain_name.as_ref() == Some(sub_domain)
                })
            {
                return Err(conflict("subdomain already taken"));
            }
            let now = Utc::now();
            let funnel = match t.funnels.get(&record.id) {
                Some(existing) => Funnel {
                    name: record.name.clone(),
                    description: record.description.clone(),
                    sub_domain_name: record.sub_domain_name.clone(),
                    favicon: record.favicon.clone(),
                    live_products: record.live_products.clone(),
                    updated_at: now,
                    ..existing.clone()
                },
                None => {
                    if !t.sub_accounts.contains_key(sub_account_id) {
                        return Err(conflict("sub-account does not exist"));
                    }
                    Funnel {
                        id: record.id.clone(),
                        name: record.name.clone(),
                        description: record.description.clone(),
                        published: false,
                        sub_domain_name: record.sub_domain_name.clone(),
                        favicon: record.favicon.clone(),
                        sub_account_id: sub_account_id.clone(),
                        live_products: record.live_products.clone(),
                        created_at: now,
                        updated_at: now,
                    }
                }
            };
            t.funnels.insert(funnel.id.clone(), funnel.clone());
            Ok(funnel)
        })
        .await
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn agency_record(id: &str, email: &str) -> AgencyRecord {
        AgencyRecord {
            id: AgencyId::new(id),
            name: "Acme".to_string(),
            agency_logo: "https://cdn.test/logo.png".to_string(),
            company_email: email.to_string(),
            company_phone: "555-0100".to_string(),
            white_label: true,
            address: "1 Main St".to_string(),
            city: "Springfield".to_string(),
            zip_code: "12345".to_string(),
            state: "IL".to_string(),
            country: "US".to_string(),
            connect_account_id: String::new(),
            goal: 5,
        }
    }

    async fn seeded() -> (MemoryStore, PipelineId) {
        let store = MemoryStore::new();
        store
            .upsert_agency(&agency_record("ag1", "owner@x.com"), &[])
            .await
            .unwrap();
        store
            .upsert_user(
                &NewUser {
                    id: UserId::new("u1"),
                    name: "Owner".to_string(),
                    avatar_url: String::new(),
                    email: Email::parse("owner@x.com").unwrap(),
                    role: Role::AgencyOwner,
                    agency_id: Some(AgencyId::new("ag1")),
                },
                &UserPatch::default(),
            )
            .await
            .unwrap();
        let record = SubAccountRecord {
            id: SubAccountId::new("sa1"),
            agency_id: AgencyId::new("ag1"),
            name: "Shop".to_string(),
            sub_account_logo: String::new(),
            company_email: "shop@x.com".to_string(),
            company_phone: "555".to_string(),
            address: "a".to_string(),
            city: "c".to_string(),
            zip_code: "z".to_string(),
            state: "s".to_string(),
            country: "co".to_string(),
            connect_account_id: String::new(),
            goal: 5,
        };
        let seed = SubAccountSeed {
            owner_email: Email::parse("owner@x.com").unwrap(),
            permission_id: PermissionId::generate(),
            pipeline_name: "Lead Cycle".to_string(),
            sidebar: Vec::new(),
        };
        store.upsert_sub_account(&record, &seed).await.unwrap();
        let pipeline = store
            .pipelines_for_sub_account(&SubAccountId::new("sa1"))
            .await
            .unwrap()
            .remove(0);
        (store, pipeline.id)
    }

    async fn add_lanes(store: &MemoryStore, pipeline_id: &PipelineId, names: &[&str]) {
        for name in names {
            store
                .upsert_lane(&LaneRecord {
                    id: LaneId::new(*name),
                    name: (*name).to_string(),
                    pipeline_id: pipeline_id.clone(),
                })
                .await
                .unwrap();
        }
    }

    async fn lane_order(store: &MemoryStore, pipeline_id: &PipelineId) -> Vec<(String, i32)> {
        store
            .lanes_with_tickets(pipeline_id)
            .await
            .unwrap()
            .into_iter()
            .map(|l| (l.lane.id.into_inner(), l.lane.order))
            .collect()
    }

    #[tokio::test]
    async fn test_lanes_append_and_compact() {
        let (store, pipeline_id) = seeded().await;
        add_lanes(&store, &pipeline_id, &["a", "b", "c"]).await;
        assert_eq!(
            lane_order(&store, &pipeline_id).await,
            vec![("a".into(), 0), ("b".into(), 1), ("c".into(), 2)]
        );

        store.delete_lane(&LaneId::new("a")).await.unwrap();
        assert_eq!(
            lane_order(&store, &pipeline_id).await,
            vec![("b".into(), 0), ("c".into(), 1)]
        );
    }

    #[tokio::test]
    async fn test_failed_reorder_changes_nothing() {
        let (store, pipeline_id) = seeded().await;
        add_lanes(&store, &pipeline_id, &["a", "b"]).await;

        let batch = [
            LaneOrder {
                id: LaneId::new("a"),
                order: 1,
            },
            LaneOrder {
                id: LaneId::new("elsewhere"),
                order: 0,
            },
        ];
        let err = store
            .update_lanes_order(&pipeline_id, &batch)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
        assert_eq!(
            lane_order(&store, &pipeline_id).await,
            vec![("a".into(), 0), ("b".into(), 1)]
        );
    }

    #[tokio::test]
    async fn test_reorder_rejects_gaps() {
        let (store, pipeline_id) = seeded().await;
        add_lanes(&store, &pipeline_id, &["a", "b"]).await;

        let batch = [LaneOrder {
            id: LaneId::new("b"),
            order: 5,
        }];
        let err = store
            .update_lanes_order(&pipeline_id, &batch)
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_delete_sub_account_cascades() {
        let (store, pipeline_id) = seeded().await;
        add_lanes(&store, &pipeline_id, &["a"]).await;

        store
            .delete_sub_account(&SubAccountId::new("sa1"))
            .await
            .unwrap()
            .unwrap();
        assert!(store.pipeline(&pipeline_id).await.unwrap().is_none());
        assert!(store.lanes_with_tickets(&pipeline_id).await.unwrap().is_empty());
        let details = store
            .user_details(&Email::parse("owner@x.com").unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(details.permissions.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_invitation_conflicts() {
        let (store, _) = seeded().await;
        let invitation = NewInvitation {
            id: plura_core::InvitationId::generate(),
            email: Email::parse("new@x.com").unwrap(),
            agency_id: AgencyId::new("ag1"),
            role: Role::SubaccountUser,
        };
        store.create_invitation(&invitation).await.unwrap();
        let err = store.create_invitation(&invitation).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }
}
