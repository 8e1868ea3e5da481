//! Funnel repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use plura_core::{FunnelId, SubAccountId};

use super::RepositoryError;
use crate::models::{Funnel, FunnelRecord};

#[derive(Debug, sqlx::FromRow)]
struct FunnelRow {
    id: FunnelId,
    name: String,
    description: Option<String>,
    published: bool,
    sub_domain_name: Option<String>,
    favicon: Option<String>,
    sub_account_id: SubAccountId,
    live_products: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<FunnelRow> for Funnel {
    fn from(row: FunnelRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            published: row.published,
            sub_domain_name: row.sub_domain_name,
            favicon: row.favicon,
            sub_account_id: row.sub_account_id,
            live_products: row.live_products,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for funnel database operations.
pub struct FunnelRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> FunnelRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Create or update a funnel of a sub-account.
    ///
    /// An existing funnel keeps its sub-account and published flag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the subdomain is taken.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(
        &self,
        sub_account_id: &SubAccountId,
        record: &FunnelRecord,
    ) -> Result<Funnel, RepositoryError> {
        let row = sqlx::query_as::<_, FunnelRow>(
            r"
            INSERT INTO plura.funnel (id, name, description, sub_domain_name, favicon,
                                      live_products, sub_account_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                description = EXCLUDED.description,
                sub_domain_name = EXCLUDED.sub_domain_name,
                favicon = EXCLUDED.favicon,
                live_products = EXCLUDED.live_products,
                updated_at = NOW()
            RETURNING id, name, description, published, sub_domain_name, favicon,
                      sub_account_id, live_products, created_at, updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(record.description.as_deref())
        .bind(record.sub_domain_name.as_deref())
        .bind(record.favicon.as_deref())
        .bind(&record.live_products)
        .bind(sub_account_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }
}
