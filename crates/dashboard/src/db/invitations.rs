//! Invitation repository.
//!
//! One pending invitation per email. Accepting an invitation deletes it.

use sqlx::PgPool;

use plura_core::{AgencyId, Email, InvitationId, InvitationStatus, Role};

use super::RepositoryError;
use crate::models::{Invitation, NewInvitation};

#[derive(Debug, sqlx::FromRow)]
struct InvitationRow {
    id: InvitationId,
    email: String,
    agency_id: AgencyId,
    status: InvitationStatus,
    role: Role,
}

impl TryFrom<InvitationRow> for Invitation {
    type Error = RepositoryError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        let email = Email::parse(&row.email).map_err(|e| {
            RepositoryError::DataCorruption(format!("invalid email in database: {e}"))
        })?;

        Ok(Self {
            id: row.id,
            email,
            agency_id: row.agency_id,
            status: row.status,
            role: row.role,
        })
    }
}

/// Repository for invitation database operations.
pub struct InvitationRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> InvitationRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    /// The pending invitation for `email`, if any.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_pending(&self, email: &Email) -> Result<Option<Invitation>, RepositoryError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r"
            SELECT id, email, agency_id, status, role
            FROM plura.invitation
            WHERE email = $1 AND status = 'PENDING'
            ",
        )
        .bind(email)
        .fetch_optional(self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Store a new pending invitation.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the email already has an invitation.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn create(&self, invitation: &NewInvitation) -> Result<Invitation, RepositoryError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r"
            INSERT INTO plura.invitation (id, email, agency_id, status, role)
            VALUES ($1, $2, $3, 'PENDING', $4)
            RETURNING id, email, agency_id, status, role
            ",
        )
        .bind(&invitation.id)
        .bind(&invitation.email)
        .bind(&invitation.agency_id)
        .bind(invitation.role)
        .fetch_one(self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return RepositoryError::Conflict("invitation already exists".to_owned());
            }
            RepositoryError::from_write(e)
        })?;

        row.try_into()
    }

    /// Delete the invitation for `email`. Returns whether a row was removed.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete_by_email(&self, email: &Email) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM plura.invitation WHERE email = $1")
            .bind(email)
            .execute(self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Invitations of an agency.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_agency(
        &self,
        agency_id: &AgencyId,
    ) -> Result<Vec<Invitation>, RepositoryError> {
        let rows = sqlx::query_as::<_, InvitationRow>(
            r"
            SELECT id, email, agency_id, status, role
            FROM plura.invitation
            WHERE agency_id = $1
            ORDER BY email
            ",
        )
        .bind(agency_id)
        .fetch_all(self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}
