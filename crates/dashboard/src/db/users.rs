//! User and permission repository.

use chrono::{DateTime, Utc};
use sqlx::PgPool;

use plura_core::{AgencyId, Email, PermissionId, Role, SubAccountId, UserId};

use super::RepositoryError;
use crate::models::{NewUser, Permission, User, UserPatch};

/// Internal row type for user queries.
#[derive(Debug, sqlx::FromRow)]
pub(super) struct UserRow {
    pub(super) id: UserId,
    pub(super) name: String,
    pub(super) avatar_url: String,
    pub(super) email: String,
    pub(super) role: Role,
    pub(super) agency_id: Option<AgencyId>,
    pub(super) created_at: DateTime<Utc>,
    pub(super) updated_at: DateTime<Utc>,
}

impl TryFrom<UserRow> for User {
    type Error = RepositoryError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            name: row.name,
            avatar_url: row.avatar_url,
            email,
            role: row.role,
            agency_id: row.agency_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct PermissionRow {
    id: PermissionId,
    email: String,
    sub_account_id: SubAccountId,
    access: bool,
}

impl TryFrom<PermissionRow> for Permission {
    type Error = RepositoryError;

    fn try_from(row: PermissionRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            sub_account_id: row.sub_account_id,
            access: row.access,
        })
    }
}

/// Repository for user and permission database operations.
pub struct UserRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> UserRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// Get a user by email address.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, avatar_url, email, role, agency_id, created_at, updated_at
            FROM plura.users
            WHERE email = $1
            ",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get a user by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, avatar_url, email, role, agency_id, created_at, updated_at
            FROM plura.users
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Get several users by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_many(&self, ids: &[UserId]) -> Result<Vec<User>, RepositoryError> {
        let ids: Vec<&str> = ids.iter().map(UserId::as_str).collect();
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, avatar_url, email, role, agency_id, created_at, updated_at
            FROM plura.users
            WHERE id = ANY($1)
            ",
        )
        .bind(&ids)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Insert a user, or update the one already registered with that email.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the id belongs to another email.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, create: &NewUser, update: &UserPatch) -> Result<User, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            INSERT INTO plura.users (id, name, avatar_url, email, role, agency_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (email) DO UPDATE
            SET name = COALESCE($7, plura.users.name),
                avatar_url = COALESCE($8, plura.users.avatar_url),
                role = COALESCE($9, plura.users.role),
                agency_id = COALESCE($10, plura.users.agency_id),
                updated_at = NOW()
            RETURNING id, name, avatar_url, email, role, agency_id, created_at, updated_at
            ",
        )
        .bind(&create.id)
        .bind(&create.name)
        .bind(&create.avatar_url)
        .bind(&create.email)
        .bind(create.role)
        .bind(&create.agency_id)
        .bind(update.name.as_deref())
        .bind(update.avatar_url.as_deref())
        .bind(update.role)
        .bind(&update.agency_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.try_into()
    }

    /// Apply a partial update to the user with `email`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn update(
        &self,
        email: &Email,
        patch: &UserPatch,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            UPDATE plura.users
            SET name = COALESCE($2, name),
                avatar_url = COALESCE($3, avatar_url),
                role = COALESCE($4, role),
                agency_id = COALESCE($5, agency_id),
                updated_at = NOW()
            WHERE email = $1
            RETURNING id, name, avatar_url, email, role, agency_id, created_at, updated_at
            ",
        )
        .bind(email)
        .bind(patch.name.as_deref())
        .bind(patch.avatar_url.as_deref())
        .bind(patch.role)
        .bind(&patch.agency_id)
        .fetch_optional(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        row.map(TryInto::try_into).transpose()
    }

    /// Delete a user. Their permissions go with them.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: &UserId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            DELETE FROM plura.users
            WHERE id = $1
            RETURNING id, name, avatar_url, email, role, agency_id, created_at, updated_at
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// The agency owner of `agency_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn agency_owner(&self, agency_id: &AgencyId) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, avatar_url, email, role, agency_id, created_at, updated_at
            FROM plura.users
            WHERE agency_id = $1 AND role = 'AGENCY_OWNER'
            ORDER BY created_at
            LIMIT 1
            ",
        )
        .bind(agency_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Some user of the agency that owns `sub_account_id`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn any_in_sub_account_agency(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query_as::<_, UserRow>(
            r"
            SELECT u.id, u.name, u.avatar_url, u.email, u.role, u.agency_id,
                   u.created_at, u.updated_at
            FROM plura.users u
            JOIN plura.sub_account s ON s.agency_id = u.agency_id
            WHERE s.id = $1
            ORDER BY u.created_at
            LIMIT 1
            ",
        )
        .bind(sub_account_id)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Members of an agency, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_agency(&self, agency_id: &AgencyId) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query_as::<_, UserRow>(
            r"
            SELECT id, name, avatar_url, email, role, agency_id, created_at, updated_at
            FROM plura.users
            WHERE agency_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(agency_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Permissions granted to `email`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn permissions_for_email(
        &self,
        email: &Email,
    ) -> Result<Vec<Permission>, RepositoryError> {
        let rows = sqlx::query_as::<_, PermissionRow>(
            r"
            SELECT id, email, sub_account_id, access
            FROM plura.permission
            WHERE email = $1
            ORDER BY sub_account_id
            ",
        )
        .bind(email)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    /// Set a sub-account grant.
    ///
    /// Updates permission `id` when it exists; otherwise inserts or updates
    /// the grant for (`email`, `sub_account_id`).
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the user or sub-account does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert_permission(
        &self,
        id: &PermissionId,
        email: &Email,
        sub_account_id: &SubAccountId,
        access: bool,
    ) -> Result<Permission, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let updated = sqlx::query_as::<_, PermissionRow>(
            r"
            UPDATE plura.permission
            SET access = $2
            WHERE id = $1
            RETURNING id, email, sub_account_id, access
            ",
        )
        .bind(id)
        .bind(access)
        .fetch_optional(&mut *tx)
        .await?;

        let row = match updated {
            Some(row) => row,
            None => sqlx::query_as::<_, PermissionRow>(
                r"
                INSERT INTO plura.permission (id, email, sub_account_id, access)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (email, sub_account_id) DO UPDATE SET access = EXCLUDED.access
                RETURNING id, email, sub_account_id, access
                ",
            )
            .bind(id)
            .bind(email)
            .bind(sub_account_id)
            .bind(access)
            .fetch_one(&mut *tx)
            .await
            .map_err(RepositoryError::from_write)?,
        };

        tx.commit().await?;
        row.try_into()
    }
}
