//! Persistence gateway.
//!
//! # Database: `plura` schema
//!
//! ## Tables
//!
//! - `agency`, `sub_account` - Tenants
//! - `users`, `permission`, `invitation` - Membership and access
//! - `notification` - Activity log
//! - `agency_sidebar_option`, `sub_account_sidebar_option` - Navigation
//! - `pipeline`, `lane`, `ticket`, `tag`, `ticket_tag`, `contact` - Sales pipelines
//! - `media`, `funnel` - Sub-account assets
//!
//! Services talk to the [`Store`] trait. [`PgStore`] is the production
//! implementation; [`MemoryStore`] keeps everything in process and backs
//! the test suites.
//!
//! # Migrations
//!
//! Migrations are stored in `crates/dashboard/migrations/` and run via:
//! ```bash
//! cargo run -p plura-cli -- migrate
//! ```

pub mod agencies;
pub mod funnels;
pub mod invitations;
pub mod media;
pub mod memory;
pub mod notifications;
pub mod pipelines;
pub mod postgres;
pub mod sub_accounts;
pub mod users;

use std::time::Duration;

use async_trait::async_trait;
use secrecy::ExposeSecret;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use thiserror::Error;

use plura_core::{
    AgencyId, Email, LaneId, MediaId, PermissionId, PipelineId, SubAccountId, TicketId, UserId,
};

use crate::models::{
    Agency, AgencyPatch, AgencyRecord, Contact, ContactRecord, Funnel, FunnelRecord, Invitation,
    Lane, LaneDetail, LaneOrder, LaneRecord, Media, NewInvitation, NewMedia, NewNotification,
    NewUser, Notification, NotificationWithUser, Permission, PermissionWithSubAccount, Pipeline,
    PipelineRecord, SidebarSeed, SubAccount, SubAccountMedia, SubAccountRecord, SubAccountSeed,
    Tag, TagRecord, Ticket, TicketDetail, TicketOrder, TicketRecord, User, UserDetails, UserPatch,
};

pub use memory::MemoryStore;
pub use postgres::PgStore;

/// Errors that can occur during repository operations.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// Database error from sqlx.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Data in the database is corrupted or invalid.
    #[error("data corruption: {0}")]
    DataCorruption(String),

    /// Requested entity was not found.
    #[error("not found")]
    NotFound,

    /// Constraint violation (e.g., unique email).
    #[error("constraint violation: {0}")]
    Conflict(String),
}

impl RepositoryError {
    /// Classify a failed write: constraint violations become `Conflict`.
    pub(crate) fn from_write(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err
            && (db_err.is_unique_violation()
                || db_err.is_foreign_key_violation()
                || db_err.is_check_violation())
        {
            return Self::Conflict(db_err.message().to_string());
        }
        Self::Database(err)
    }
}

/// Create a `PostgreSQL` connection pool with sensible defaults.
///
/// # Errors
///
/// Returns `sqlx::Error` if the connection cannot be established.
pub async fn create_pool(database_url: &secrecy::SecretString) -> Result<PgPool, sqlx::Error> {
    PgPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url.expose_secret())
        .await
}

/// Every read and write the dashboard performs against its datastore.
///
/// Lookups that find nothing return `Ok(None)`. Operations that touch more
/// than one row are all-or-nothing.
#[async_trait]
pub trait Store: Send + Sync {
    // --- Users ---

    async fn user_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;

    async fn user_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// The user with their agency (sidebar, sub-accounts and their sidebars)
    /// and permissions.
    async fn user_details(&self, email: &Email) -> Result<Option<UserDetails>, RepositoryError>;

    /// Insert `create`, or apply `update` to the user already holding that
    /// email.
    async fn upsert_user(
        &self,
        create: &NewUser,
        update: &UserPatch,
    ) -> Result<User, RepositoryError>;

    async fn update_user(
        &self,
        email: &Email,
        patch: &UserPatch,
    ) -> Result<Option<User>, RepositoryError>;

    async fn delete_user(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;

    /// The agency-owner user of an agency, if there is one.
    async fn agency_owner(&self, agency_id: &AgencyId) -> Result<Option<User>, RepositoryError>;

    /// Any user belonging to the agency that owns `sub_account_id`.
    async fn user_for_sub_account_agency(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<User>, RepositoryError>;

    async fn team_members(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError>;

    // --- Permissions ---

    async fn permissions_for_user(
        &self,
        user_id: &UserId,
    ) -> Result<Vec<PermissionWithSubAccount>, RepositoryError>;

    /// Update permission `id` if it exists, otherwise set the grant for
    /// (`email`, `sub_account_id`).
    async fn upsert_permission(
        &self,
        id: &PermissionId,
        email: &Email,
        sub_account_id: &SubAccountId,
        access: bool,
    ) -> Result<Permission, RepositoryError>;

    // --- Invitations ---

    async fn pending_invitation(&self, email: &Email)
    -> Result<Option<Invitation>, RepositoryError>;

    async fn create_invitation(
        &self,
        invitation: &NewInvitation,
    ) -> Result<Invitation, RepositoryError>;

    /// Remove the invitation for `email`. Returns whether one existed.
    async fn delete_invitation(&self, email: &Email) -> Result<bool, RepositoryError>;

    async fn invitations_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<Invitation>, RepositoryError>;

    // --- Agencies ---

    async fn agency(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError>;

    /// Update the agency, or create it with `sidebar` and attach the user
    /// whose email is the company email.
    async fn upsert_agency(
        &self,
        record: &AgencyRecord,
        sidebar: &[SidebarSeed],
    ) -> Result<Agency, RepositoryError>;

    async fn update_agency(
        &self,
        id: &AgencyId,
        patch: &AgencyPatch,
    ) -> Result<Option<Agency>, RepositoryError>;

    async fn delete_agency(&self, id: &AgencyId) -> Result<bool, RepositoryError>;

    // --- Sub-accounts ---

    async fn sub_account(&self, id: &SubAccountId) -> Result<Option<SubAccount>, RepositoryError>;

    /// Update the sub-account, or create it together with every row in
    /// `seed`.
    async fn upsert_sub_account(
        &self,
        record: &SubAccountRecord,
        seed: &SubAccountSeed,
    ) -> Result<SubAccount, RepositoryError>;

    async fn delete_sub_account(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, RepositoryError>;

    // --- Notifications ---

    async fn create_notification(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError>;

    /// All notifications of an agency, newest first.
    async fn notifications_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<NotificationWithUser>, RepositoryError>;

    // --- Media ---

    async fn sub_account_media(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<SubAccountMedia>, RepositoryError>;

    async fn create_media(
        &self,
        sub_account_id: &SubAccountId,
        media: &NewMedia,
    ) -> Result<Media, RepositoryError>;

    async fn delete_media(
        &self,
        sub_account_id: &SubAccountId,
        id: &MediaId,
    ) -> Result<Option<Media>, RepositoryError>;

    // --- Pipelines ---

    async fn pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError>;

    async fn pipelines_for_sub_account(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Vec<Pipeline>, RepositoryError>;

    async fn upsert_pipeline(&self, record: &PipelineRecord) -> Result<Pipeline, RepositoryError>;

    async fn delete_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError>;

    /// Lanes of a pipeline in order, each with its tickets in order.
    async fn lanes_with_tickets(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Vec<LaneDetail>, RepositoryError>;

    async fn upsert_lane(&self, record: &LaneRecord) -> Result<Lane, RepositoryError>;

    /// Delete a lane and its tickets, closing the gap it leaves.
    async fn delete_lane(&self, id: &LaneId) -> Result<Option<Lane>, RepositoryError>;

    async fn upsert_ticket(&self, record: &TicketRecord) -> Result<TicketDetail, RepositoryError>;

    /// Delete a ticket, closing the gap it leaves in its lane.
    async fn delete_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError>;

    async fn upsert_tag(&self, record: &TagRecord) -> Result<Tag, RepositoryError>;

    async fn upsert_contact(&self, record: &ContactRecord) -> Result<Contact, RepositoryError>;

    // --- Ordering ---

    /// Apply a lane reorder within one pipeline, all or nothing.
    ///
    /// Fails if any lane is outside the pipeline or the resulting orders are
    /// not `0..n`.
    async fn update_lanes_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[LaneOrder],
    ) -> Result<(), RepositoryError>;

    /// Apply a ticket reorder (possibly moving tickets between lanes) within
    /// one pipeline, all or nothing.
    ///
    /// Fails if any ticket or target lane is outside the pipeline or a
    /// touched lane ends up with orders other than `0..n`.
    async fn update_tickets_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[TicketOrder],
    ) -> Result<(), RepositoryError>;

    // --- Funnels ---

    async fn upsert_funnel(
        &self,
        sub_account_id: &SubAccountId,
        record: &FunnelRecord,
    ) -> Result<Funnel, RepositoryError>;

    // --- Health ---

    /// Check that the datastore is reachable.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

/// Whether `orders` is exactly `0..orders.len()` in some arrangement.
pub(crate) fn is_contiguous(orders: &[i32]) -> bool {
    let mut sorted = orders.to_vec();
    sorted.sort_unstable();
    sorted
        .iter()
        .enumerate()
        .all(|(i, &order)| usize::try_from(order).is_ok_and(|o| o == i))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_contiguous() {
        assert!(is_contiguous(&[]));
        assert!(is_contiguous(&[2, 0, 1]));
        assert!(!is_contiguous(&[0, 2]));
        assert!(!is_contiguous(&[0, 0, 1]));
        assert!(!is_contiguous(&[1, 2]));
        assert!(!is_contiguous(&[-1, 0]));
    }
}
