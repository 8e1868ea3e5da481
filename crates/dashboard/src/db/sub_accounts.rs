//! Sub-account repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use plura_core::{AgencyId, PipelineId, SidebarOptionId, SubAccountId};

use super::RepositoryError;
use crate::models::{SubAccount, SubAccountRecord, SubAccountSeed};

#[derive(Debug, sqlx::FromRow)]
pub(super) struct SubAccountRow {
    id: SubAccountId,
    agency_id: AgencyId,
    connect_account_id: String,
    name: String,
    sub_account_logo: String,
    company_email: String,
    company_phone: String,
    address: String,
    city: String,
    zip_code: String,
    state: String,
    country: String,
    goal: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubAccountRow> for SubAccount {
    fn from(row: SubAccountRow) -> Self {
        Self {
            id: row.id,
            agency_id: row.agency_id,
            connect_account_id: row.connect_account_id,
            name: row.name,
            sub_account_logo: row.sub_account_logo,
            company_email: row.company_email,
            company_phone: row.company_phone,
            address: row.address,
            city: row.city,
            zip_code: row.zip_code,
            state: row.state,
            country: row.country,
            goal: row.goal,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for sub-account database operations.
pub struct SubAccountRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> SubAccountRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a sub-account by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(
        &self,
        id: &SubAccountId,
    ) -> Result<Option<SubAccount>, RepositoryError> {
        let row = sqlx::query_as::<_, SubAccountRow>(
            r"
            SELECT id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                   company_phone, address, city, zip_code, state, country, goal,
                   created_at, updated_at
            FROM plura.sub_account
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Get several sub-accounts by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[SubAccountId]) -> Result<Vec<SubAccount>, RepositoryError> {
        let ids: Vec<&str> = ids.iter().map(SubAccountId::as_str).collect();
        let rows = sqlx::query_as::<_, SubAccountRow>(
            r"
            SELECT id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                   company_phone, address, city, zip_code, state, country, goal,
                   created_at, updated_at
            FROM plura.sub_account
            WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Sub-accounts of an agency, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<SubAccount>, RepositoryError> {
        let rows = sqlx::query_as::<_, SubAccountRow>(
            r"
            SELECT id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                   company_phone, address, city, zip_code, state, country, goal,
                   created_at, updated_at
            FROM plura.sub_account
            WHERE agency_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(agency_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Update the sub-account if it exists; otherwise create it with the
    /// owner permission, default pipeline and sidebar from `seed`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a constraint violation.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(
        &self,
        record: &SubAccountRecord,
        seed: &SubAccountSeed,
    ) -> Result<SubAccount, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<SubAccountId> =
            sqlx::query_scalar("SELECT id FROM plura.sub_account WHERE id = $1 FOR UPDATE")
                .bind(&record.id)
                .fetch_optional(&mut *tx)
                .await?;

        let sql = if exists.is_some() {
            r"
            UPDATE plura.sub_account
            SET agency_id = $2, name = $3, sub_account_logo = $4, company_email = $5,
                company_phone = $6, address = $7, city = $8, zip_code = $9, state = $10,
                country = $11, connect_account_id = $12, goal = $13, updated_at = NOW()
            WHERE id = $1
            RETURNING id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                      company_phone, address, city, zip_code, state, country, goal,
                      created_at, updated_at
            "
        } else {
            r"
            INSERT INTO plura.sub_account (id, agency_id, name, sub_account_logo, company_email,
                                           company_phone, address, city, zip_code, state,
                                           country, connect_account_id, goal)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                      company_phone, address, city, zip_code, state, country, goal,
                      created_at, updated_at
            "
        };

        let row = sqlx::query_as::<_, SubAccountRow>(sql)
            .bind(&record.id)
            .bind(&record.agency_id)
            .bind(&record.name)
            .bind(&record.sub_account_logo)
            .bind(&record.company_email)
            .bind(&record.company_phone)
            .bind(&record.address)
            .bind(&record.city)
            .bind(&record.zip_code)
            .bind(&record.state)
            .bind(&record.country)
            .bind(&record.connect_account_id)
            .bind(record.goal)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from_write)?;

        if exists.is_none() {
            sqlx::query(
                r"
                INSERT INTO plura.permission (id, email, sub_account_id, access)
                VALUES ($1, $2, $3, TRUE)
                ON CONFLICT (email, sub_account_id) DO UPDATE SET access = TRUE
                ",
            )
            .bind(&seed.permission_id)
            .bind(&seed.owner_email)
            .bind(&record.id)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from_write)?;

            sqlx::query(
                "INSERT INTO plura.pipeline (id, name, sub_account_id) VALUES ($1, $2, $3)",
            )
            .bind(PipelineId::generate())
            .bind(&seed.pipeline_name)
            .bind(&record.id)
            .execute(&mut *tx)
            .await?;

            for (position, option) in (0_i32..).zip(&seed.sidebar) {
                sqlx::query(
                    r"
                    INSERT INTO plura.sub_account_sidebar_option
                        (id, name, icon, link, position, sub_account_id)
                    VALUES ($1, $2, $3, $4, $5, $6)
                    ",
                )
                .bind(SidebarOptionId::generate())
                .bind(option.name)
                .bind(option.icon)
                .bind(&option.link)
                .bind(position)
                .bind(&record.id)
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete a sub-account and everything scoped to it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: &SubAccountId) -> Result<Option<SubAccount>, RepositoryError> {
        let row = sqlx::query_as::<_, SubAccountRow>(
            r"
            DELETE FROM plura.sub_account
            WHERE id = $1
            RETURNING id, agency_id, connect_account_id, name, sub_account_logo, company_email,
                      company_phone, address, city, zip_code, state, country, goal,
                      created_at, updated_at
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }
}
