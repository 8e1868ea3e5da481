//! Notification repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use plura_core::{AgencyId, NotificationId, SubAccountId, UserId};

use super::RepositoryError;
use super::users::UserRow;
use crate::models::{NewNotification, Notification, NotificationWithUser};

#[derive(Debug, sqlx::FromRow)]
struct NotificationRow {
    id: NotificationId,
    notification: String,
    agency_id: AgencyId,
    sub_account_id: Option<SubAccountId>,
    user_id: UserId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<NotificationRow> for Notification {
    fn from(row: NotificationRow) -> Self {
        Self {
            id: row.id,
            notification: row.notification,
            agency_id: row.agency_id,
            sub_account_id: row.sub_account_id,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// A notification row joined with its author.
#[derive(Debug, sqlx::FromRow)]
struct NotificationUserRow {
    #[sqlx(flatten)]
    notification: NotificationRow,
    #[sqlx(flatten)]
    user: AuthorRow,
}

/// Author columns, prefixed to keep them apart from the notification's.
#[derive(Debug, sqlx::FromRow)]
struct AuthorRow {
    #[sqlx(rename = "u_id")]
    id: UserId,
    #[sqlx(rename = "u_name")]
    name: String,
    #[sqlx(rename = "u_avatar_url")]
    avatar_url: String,
    #[sqlx(rename = "u_email")]
    email: String,
    #[sqlx(rename = "u_role")]
    role: plura_core::Role,
    #[sqlx(rename = "u_agency_id")]
    agency_id: Option<AgencyId>,
    #[sqlx(rename = "u_created_at")]
    created_at: DateTime<Utc>,
    #[sqlx(rename = "u_updated_at")]
    updated_at: DateTime<Utc>,
}

impl From<AuthorRow> for UserRow {
    fn from(row: AuthorRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            avatar_url: row.avatar_url,
            email: row.email,
            role: row.role,
            agency_id: row.agency_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for notification database operations.
pub struct NotificationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> NotificationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Append a notification.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a referenced row does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        notification: &NewNotification,
    ) -> Result<Notification, RepositoryError> {
        let row = sqlx::query_as::<_, NotificationRow>(
            r"
            INSERT INTO plura.notification (id, notification, agency_id, sub_account_id, user_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, notification, agency_id, sub_account_id, user_id, created_at, updated_at
            ",
        )
        .bind(&notification.id)
        .bind(&notification.notification)
        .bind(&notification.agency_id)
        .bind(&notification.sub_account_id)
        .bind(&notification.user_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }

    /// Notifications of an agency with their authors, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<NotificationWithUser>, RepositoryError> {
        let rows = sqlx::query_as::<_, NotificationUserRow>(
            r"
            SELECT n.id, n.notification, n.agency_id, n.sub_account_id, n.user_id,
                   n.created_at, n.updated_at,
                   u.id AS u_id, u.name AS u_name, u.avatar_url AS u_avatar_url,
                   u.email AS u_email, u.role AS u_role, u.agency_id AS u_agency_id,
                   u.created_at AS u_created_at, u.updated_at AS u_updated_at
            FROM plura.notification n
            JOIN plura.users u ON u.id = n.user_id
            WHERE n.agency_id = $1
            ORDER BY n.created_at DESC, n.id DESC
            ",
        )
        .bind(agency_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(NotificationWithUser {
                    notification: row.notification.into(),
                    user: UserRow::from(row.user).try_into()?,
                })
            })
            .collect()
    }
}
