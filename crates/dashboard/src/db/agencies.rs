//! Agency repository.
//!
//! Creating an agency also materializes its sidebar and attaches the user
//! whose email is the agency's company email, in one transaction.

use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};

use plura_core::{AgencyId, SidebarOptionId, SubAccountId};

use super::RepositoryError;
use crate::models::{Agency, AgencyPatch, AgencyRecord, SidebarOption, SidebarSeed};

#[derive(Debug, sqlx::FromRow)]
struct AgencyRow {
    id: AgencyId,
    connect_account_id: String,
    name: String,
    agency_logo: String,
    company_email: String,
    company_phone: String,
    white_label: bool,
    address: String,
    city: String,
    zip_code: String,
    state: String,
    country: String,
    goal: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<AgencyRow> for Agency {
    fn from(row: AgencyRow) -> Self {
        Self {
            id: row.id,
            connect_account_id: row.connect_account_id,
            name: row.name,
            agency_logo: row.agency_logo,
            company_email: row.company_email,
            company_phone: row.company_phone,
            white_label: row.white_label,
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

/// Sidebar rows share one shape for both owners.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct SidebarOptionRow {
    id: SidebarOptionId,
    name: String,
    icon: String,
    link: String,
    created_at: DateTime<Utc>,
}

impl From<SidebarOptionRow> for SidebarOption {
    fn from(row: SidebarOptionRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            icon: row.icon,
            link: row.link,
            created_at: row.created_at,
        }
    }
}

/// Repository for agency database operations.
pub struct AgencyRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> AgencyRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get an agency by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: &AgencyId) -> Result<Option<Agency>, RepositoryError> {
        let row = sqlx::query_as::<_, AgencyRow>(
            r"
            SELECT id, connect_account_id, name, agency_logo, company_email, company_phone,
                   white_label, address, city, zip_code, state, country, goal,
                   created_at, updated_at
            FROM plura.agency
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Update the agency if it exists, otherwise create it with its sidebar.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` on a constraint violation.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(
        &self,
        record: &AgencyRecord,
        sidebar: &[SidebarSeed],
    ) -> Result<Agency, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let exists: Option<AgencyId> =
            sqlx::query_scalar("SELECT id FROM plura.agency WHERE id = $1 FOR UPDATE")
                .bind(&record.id)
                .fetch_optional(&mut *tx)
                .await?;

        let row = if exists.is_some() {
            sqlx::query_as::<_, AgencyRow>(
                r"
                UPDATE plura.agency
                SET name = $2, agency_logo = $3, company_email = $4, company_phone = $5,
                    white_label = $6, address = $7, city = $8, zip_code = $9, state = $10,
                    country = $11, connect_account_id = $12, goal = $13, updated_at = NOW()
                WHERE id = $1
                RETURNING id, connect_account_id, name, agency_logo, company_email,
                          company_phone, white_label, address, city, zip_code, state,
                          country, goal, created_at, updated_at
                ",
            )
            .bind(&record.id)
            .bind(&record.name)
            .bind(&record.agency_logo)
            .bind(&record.company_email)
            .bind(&record.company_phone)
            .bind(record.white_label)
            .bind(&record.address)
            .bind(&record.city)
            .bind(&record.zip_code)
            .bind(&record.state)
            .bind(&record.country)
            .bind(&record.connect_account_id)
            .bind(record.goal)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from_write)?
        } else {
            let row = sqlx::query_as::<_, AgencyRow>(
                r"
                INSERT INTO plura.agency (id, name, agency_logo, company_email, company_phone,
                                          white_label, address, city, zip_code, state, country,
                                          connect_account_id, goal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                RETURNING id, connect_account_id, name, agency_logo, company_email,
                          company_phone, white_label, address, city, zip_code, state,
                          country, goal, created_at, updated_at
                ",
            )
            .bind(&record.id)
            .bind(&record.name)
            .bind(&record.agency_logo)
            .bind(&record.company_email)
            .bind(&record.company_phone)
            .bind(record.white_label)
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

            insert_sidebar(&mut tx, &record.id, sidebar).await?;

            sqlx::query(
                "UPDATE plura.users SET agency_id = $1, updated_at = NOW() WHERE email = $2",
            )
            .bind(&record.id)
            .bind(&record.company_email)
            .execute(&mut *tx)
            .await?;

            row
        };

        tx.commit().await?;
        Ok(row.into())
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        id: &AgencyId,
        patch: &AgencyPatch,
    ) -> Result<Option<Agency>, RepositoryError> {
        let row = sqlx::query_as::<_, AgencyRow>(
            r"
            UPDATE plura.agency
            SET name = COALESCE($2, name),
                agency_logo = COALESCE($3, agency_logo),
                company_email = COALESCE($4, company_email),
                company_phone = COALESCE($5, company_phone),
                white_label = COALESCE($6, white_label),
                address = COALESCE($7, address),
                city = COALESCE($8, city),
                zip_code = COALESCE($9, zip_code),
                state = COALESCE($10, state),
                country = COALESCE($11, country),
                connect_account_id = COALESCE($12, connect_account_id),
                goal = COALESCE($13, goal),
                updated_at = NOW()
            WHERE id = $1
            RETURNING id, connect_account_id, name, agency_logo, company_email,
                      company_phone, white_label, address, city, zip_code, state,
                      country, goal, created_at, updated_at
            ",
        )
        .bind(id)
        .bind(patch.name.as_deref())
        .bind(patch.agency_logo.as_deref())
        .bind(patch.company_email.as_deref())
        .bind(patch.company_phone.as_deref())
        .bind(patch.white_label)
        .bind(patch.address.as_deref())
        .bind(patch.city.as_deref())
        .bind(patch.zip_code.as_deref())
        .bind(patch.state.as_deref())
        .bind(patch.country.as_deref())
        .bind(patch.connect_account_id.as_deref())
        .bind(patch.goal)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Delete an agency. Everything it owns goes with it.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: &AgencyId) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM plura.agency WHERE id = $1")
            .bind(id)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Sidebar options of an agency, in creation order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sidebar(&self, id: &AgencyId) -> Result<Vec<SidebarOption>, RepositoryError> {
        let rows = sqlx::query_as::<_, SidebarOptionRow>(
            r"
            SELECT id, name, icon, link, created_at
            FROM plura.agency_sidebar_option
            WHERE agency_id = $1
            ORDER BY position
            ",
        )
        .bind(id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Sidebar options of several sub-accounts, keyed by owner.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn sub_account_sidebars(
        &self,
        ids: &[SubAccountId],
    ) -> Result<Vec<(SubAccountId, SidebarOption)>, RepositoryError> {
        #[derive(sqlx::FromRow)]
        struct OwnedRow {
            sub_account_id: SubAccountId,
            #[sqlx(flatten)]
            option: SidebarOptionRow,
        }

        let ids: Vec<&str> = ids.iter().map(SubAccountId::as_str).collect();
        let rows = sqlx::query_as::<_, OwnedRow>(
            r"
            SELECT sub_account_id, id, name, icon, link, created_at
            FROM plura.sub_account_sidebar_option
            WHERE sub_account_id = ANY($1)
            ORDER BY sub_account_id, position
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| (r.sub_account_id, r.option.into()))
            .collect())
    }
}

async fn insert_sidebar(
    conn: &mut PgConnection,
    agency_id: &AgencyId,
    sidebar: &[SidebarSeed],
) -> Result<(), RepositoryError> {
    for (position, seed) in (0_i32..).zip(sidebar) {
        sqlx::query(
            r"
            INSERT INTO plura.agency_sidebar_option (id, name, icon, link, position, agency_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ",
        )
        .bind(SidebarOptionId::generate())
        .bind(seed.name)
        .bind(seed.icon)
        .bind(&seed.link)
        .bind(position)
        .bind(agency_id)
        .execute(&mut *conn)
        .await?;
    }
    Ok(())
}
