//! Media repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use plura_core::{MediaId, SubAccountId};

use super::RepositoryError;
use crate::models::{Media, NewMedia};

#[derive(Debug, sqlx::FromRow)]
struct MediaRow {
    id: MediaId,
    #[sqlx(rename = "type")]
    media_type: Option<String>,
    name: String,
    link: String,
    sub_account_id: SubAccountId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<MediaRow> for Media {
    fn from(row: MediaRow) -> Self {
        Self {
            id: row.id,
            media_type: row.media_type,
            name: row.name,
            link: row.link,
            sub_account_id: row.sub_account_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for media database operations.
pub struct MediaRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> MediaRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Media of a sub-account, newest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_sub_account(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Vec<Media>, RepositoryError> {
        let rows = sqlx::query_as::<_, MediaRow>(
            r#"
            SELECT id, "type", name, link, sub_account_id, created_at, updated_at
            FROM plura.media
            WHERE sub_account_id = $1
            ORDER BY created_at DESC, id
            "#,
        )
        .bind(sub_account_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Add a media file to a sub-account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the link is already stored.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(
        &self,
        sub_account_id: &SubAccountId,
        media: &NewMedia,
    ) -> Result<Media, RepositoryError> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            INSERT INTO plura.media (id, "type", name, link, sub_account_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, "type", name, link, sub_account_id, created_at, updated_at
            "#,
        )
        .bind(&media.id)
        .bind(media.media_type.as_deref())
        .bind(&media.name)
        .bind(&media.link)
        .bind(sub_account_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }

    /// Delete a media file of a sub-account.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(
        &self,
        sub_account_id: &SubAccountId,
        id: &MediaId,
    ) -> Result<Option<Media>, RepositoryError> {
        let row = sqlx::query_as::<_, MediaRow>(
            r#"
            DELETE FROM plura.media
            WHERE id = $1 AND sub_account_id = $2
            RETURNING id, "type", name, link, sub_account_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .bind(sub_account_id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
