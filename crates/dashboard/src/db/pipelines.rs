//! Pipeline, lane, ticket, tag and contact repository.
//!
//! `lane."order"` is unique per pipeline and `ticket."order"` unique per
//! lane. Both constraints are deferred to commit, so a transaction can move
//! rows through temporarily colliding positions. Every write that changes
//! positions checks that the touched siblings end up at `0..n` before it
//! commits.

use std::collections::{BTreeSet, HashMap};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgConnection, PgPool};

use plura_core::{ContactId, LaneId, PipelineId, SubAccountId, TagId, TicketId, UserId};

use super::users::UserRepository;
use super::{RepositoryError, is_contiguous};
use crate::models::{
    Contact, ContactRecord, Lane, LaneDetail, LaneOrder, LaneRecord, Pipeline, PipelineRecord,
    Tag, TagRecord, Ticket, TicketDetail, TicketOrder, TicketRecord,
};

#[derive(Debug, sqlx::FromRow)]
struct PipelineRow {
    id: PipelineId,
    name: String,
    sub_account_id: SubAccountId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<PipelineRow> for Pipeline {
    fn from(row: PipelineRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            sub_account_id: row.sub_account_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct LaneRow {
    id: LaneId,
    name: String,
    pipeline_id: PipelineId,
    order: i32,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<LaneRow> for Lane {
    fn from(row: LaneRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            pipeline_id: row.pipeline_id,
            order: row.order,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TicketRow {
    id: TicketId,
    name: String,
    lane_id: LaneId,
    order: i32,
    value: Option<Decimal>,
    description: Option<String>,
    customer_id: Option<ContactId>,
    assigned_user_id: Option<UserId>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TicketRow> for Ticket {
    fn from(row: TicketRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            lane_id: row.lane_id,
            order: row.order,
            value: row.value,
            description: row.description,
            customer_id: row.customer_id,
            assigned_user_id: row.assigned_user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TagRow {
    id: TagId,
    name: String,
    color: String,
    sub_account_id: SubAccountId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<TagRow> for Tag {
    fn from(row: TagRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            color: row.color,
            sub_account_id: row.sub_account_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct TicketTagRow {
    ticket_id: TicketId,
    #[sqlx(flatten)]
    tag: TagRow,
}

#[derive(Debug, sqlx::FromRow)]
struct ContactRow {
    id: ContactId,
    name: String,
    email: String,
    sub_account_id: SubAccountId,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<ContactRow> for Contact {
    fn from(row: ContactRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            email: row.email,
            sub_account_id: row.sub_account_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

/// Repository for pipeline database operations.
pub struct PipelineRepository<'a> {
    pool: &'a PgPool,
}

impl<'a> PipelineRepository<'a> {
    #[must_use]
    pub const fn new(pool: &'a PgPool) -> Self {
        Self { pool }
    }

    // =========================================================================
    // Pipelines
    // =========================================================================

    /// Get a pipeline by id.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn get_by_id(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r"
            SELECT id, name, sub_account_id, created_at, updated_at
            FROM plura.pipeline
            WHERE id = $1
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    /// Pipelines of a sub-account, oldest first.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn list_for_sub_account(
        &self,
        sub_account_id: &SubAccountId,
    ) -> Result<Vec<Pipeline>, RepositoryError> {
        let rows = sqlx::query_as::<_, PipelineRow>(
            r"
            SELECT id, name, sub_account_id, created_at, updated_at
            FROM plura.pipeline
            WHERE sub_account_id = $1
            ORDER BY created_at, id
            ",
        )
        .bind(sub_account_id)
        .fetch_all(self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    /// Create or rename a pipeline.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the sub-account does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert(&self, record: &PipelineRecord) -> Result<Pipeline, RepositoryError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r"
            INSERT INTO plura.pipeline (id, name, sub_account_id)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            RETURNING id, name, sub_account_id, created_at, updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.sub_account_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }

    /// Delete a pipeline with its lanes and tickets.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the query fails.
    pub async fn delete(&self, id: &PipelineId) -> Result<Option<Pipeline>, RepositoryError> {
        let row = sqlx::query_as::<_, PipelineRow>(
            r"
            DELETE FROM plura.pipeline
            WHERE id = $1
            RETURNING id, name, sub_account_id, created_at, updated_at
            ",
        )
        .bind(id)
        .fetch_optional(self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    // =========================================================================
    // Lanes and tickets
    // =========================================================================

    /// Lanes of a pipeline with their tickets, both in order.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn lanes_with_tickets(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Vec<LaneDetail>, RepositoryError> {
        let lanes = sqlx::query_as::<_, LaneRow>(
            r#"
            SELECT id, name, pipeline_id, "order", created_at, updated_at
            FROM plura.lane
            WHERE pipeline_id = $1
            ORDER BY "order"
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(self.pool)
        .await?;

        let tickets = sqlx::query_as::<_, TicketRow>(
            r#"
            SELECT t.id, t.name, t.lane_id, t."order", t.value, t.description,
                   t.customer_id, t.assigned_user_id, t.created_at, t.updated_at
            FROM plura.ticket t
            JOIN plura.lane l ON l.id = t.lane_id
            WHERE l.pipeline_id = $1
            ORDER BY t.lane_id, t."order"
            "#,
        )
        .bind(pipeline_id)
        .fetch_all(self.pool)
        .await?;

        let mut details = self.ticket_details(tickets).await?;

        Ok(lanes
            .into_iter()
            .map(|lane| {
                let lane: Lane = lane.into();
                let tickets = details.remove(&lane.id).unwrap_or_default();
                LaneDetail { lane, tickets }
            })
            .collect())
    }

    /// Attach tags, assignee and customer to tickets, grouped by lane.
    async fn ticket_details(
        &self,
        tickets: Vec<TicketRow>,
    ) -> Result<HashMap<LaneId, Vec<TicketDetail>>, RepositoryError> {
        let ticket_ids: Vec<&str> = tickets.iter().map(|t| t.id.as_str()).collect();
        let tag_rows = sqlx::query_as::<_, TicketTagRow>(
            r"
            SELECT tt.ticket_id, g.id, g.name, g.color, g.sub_account_id,
                   g.created_at, g.updated_at
            FROM plura.ticket_tag tt
            JOIN plura.tag g ON g.id = tt.tag_id
            WHERE tt.ticket_id = ANY($1)
            ORDER BY g.name, g.id
            ",
        )
        .bind(&ticket_ids)
        .fetch_all(self.pool)
        .await?;

        let mut tags: HashMap<TicketId, Vec<Tag>> = HashMap::new();
        for row in tag_rows {
            tags.entry(row.ticket_id).or_default().push(row.tag.into());
        }

        let user_ids: Vec<UserId> = tickets
            .iter()
            .filter_map(|t| t.assigned_user_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let users: HashMap<UserId, _> = UserRepository::new(self.pool)
            .get_many(&user_ids)
            .await?
            .into_iter()
            .map(|u| (u.id.clone(), u))
            .collect();

        let contact_ids: Vec<&str> = tickets
            .iter()
            .filter_map(|t| t.customer_id.as_ref().map(ContactId::as_str))
            .collect();
        let contacts: HashMap<ContactId, Contact> = sqlx::query_as::<_, ContactRow>(
            r"
            SELECT id, name, email, sub_account_id, created_at, updated_at
            FROM plura.contact
            WHERE id = ANY($1)
            ",
        )
        .bind(&contact_ids)
        .fetch_all(self.pool)
        .await?
        .into_iter()
        .map(|c| (c.id.clone(), c.into()))
        .collect();

        let mut by_lane: HashMap<LaneId, Vec<TicketDetail>> = HashMap::new();
        for row in tickets {
            let ticket: Ticket = row.into();
            let detail = TicketDetail {
                tags: tags.remove(&ticket.id).unwrap_or_default(),
                assigned: ticket
                    .assigned_user_id
                    .as_ref()
                    .and_then(|id| users.get(id).cloned()),
                customer: ticket
                    .customer_id
                    .as_ref()
                    .and_then(|id| contacts.get(id).cloned()),
                ticket,
            };
            by_lane
                .entry(detail.ticket.lane_id.clone())
                .or_default()
                .push(detail);
        }
        Ok(by_lane)
    }

    /// Rename a lane, or append a new one after the pipeline's last lane.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the pipeline does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert_lane(&self, record: &LaneRecord) -> Result<Lane, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Serializes appends to the same pipeline.
        sqlx::query("SELECT id FROM plura.pipeline WHERE id = $1 FOR UPDATE")
            .bind(&record.pipeline_id)
            .fetch_optional(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, LaneRow>(
            r#"
            INSERT INTO plura.lane (id, name, pipeline_id, "order")
            VALUES ($1, $2, $3,
                    (SELECT COUNT(*)::INTEGER FROM plura.lane WHERE pipeline_id = $3))
            ON CONFLICT (id) DO UPDATE SET name = EXCLUDED.name, updated_at = NOW()
            RETURNING id, name, pipeline_id, "order", created_at, updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.pipeline_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_write)?;

        tx.commit().await?;
        Ok(row.into())
    }

    /// Delete a lane (and its tickets) and shift the following lanes up.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn delete_lane(&self, id: &LaneId) -> Result<Option<Lane>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, LaneRow>(
            r#"
            DELETE FROM plura.lane
            WHERE id = $1
            RETURNING id, name, pipeline_id, "order", created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(lane) = &row {
            sqlx::query(
                r#"
                UPDATE plura.lane
                SET "order" = "order" - 1
                WHERE pipeline_id = $1 AND "order" > $2
                "#,
            )
            .bind(&lane.pipeline_id)
            .bind(lane.order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row.map(Into::into))
    }

    /// Update a ticket in place, or append a new one to the end of its lane.
    /// The ticket's tags are replaced by `record.tag_ids`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if a referenced row does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert_ticket(
        &self,
        record: &TicketRecord,
    ) -> Result<TicketDetail, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("SELECT id FROM plura.lane WHERE id = $1 FOR UPDATE")
            .bind(&record.lane_id)
            .fetch_optional(&mut *tx)
            .await?;

        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            INSERT INTO plura.ticket (id, name, lane_id, "order", value, description,
                                      customer_id, assigned_user_id)
            VALUES ($1, $2, $3,
                    (SELECT COUNT(*)::INTEGER FROM plura.ticket WHERE lane_id = $3),
                    $4, $5, $6, $7)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name,
                value = EXCLUDED.value,
                description = EXCLUDED.description,
                customer_id = EXCLUDED.customer_id,
                assigned_user_id = EXCLUDED.assigned_user_id,
                updated_at = NOW()
            RETURNING id, name, lane_id, "order", value, description,
                      customer_id, assigned_user_id, created_at, updated_at
            "#,
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.lane_id)
        .bind(record.value)
        .bind(record.description.as_deref())
        .bind(&record.customer_id)
        .bind(&record.assigned_user_id)
        .fetch_one(&mut *tx)
        .await
        .map_err(RepositoryError::from_write)?;

        replace_ticket_tags(&mut tx, &record.id, &record.tag_ids).await?;

        tx.commit().await?;

        let lane_id = row.lane_id.clone();
        let ticket_id = row.id.clone();
        let mut details = self.ticket_details(vec![row]).await?;
        details
            .remove(&lane_id)
            .and_then(|tickets| tickets.into_iter().find(|t| t.ticket.id == ticket_id))
            .ok_or(RepositoryError::NotFound)
    }

    /// Delete a ticket and shift the following tickets of its lane up.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if a query fails.
    pub async fn delete_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, TicketRow>(
            r#"
            DELETE FROM plura.ticket
            WHERE id = $1
            RETURNING id, name, lane_id, "order", value, description,
                      customer_id, assigned_user_id, created_at, updated_at
            "#,
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(ticket) = &row {
            sqlx::query(
                r#"
                UPDATE plura.ticket
                SET "order" = "order" - 1
                WHERE lane_id = $1 AND "order" > $2
                "#,
            )
            .bind(&ticket.lane_id)
            .bind(ticket.order)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(row.map(Into::into))
    }

    // =========================================================================
    // Tags and contacts
    // =========================================================================

    /// Create or update a tag.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the sub-account does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert_tag(&self, record: &TagRecord) -> Result<Tag, RepositoryError> {
        let row = sqlx::query_as::<_, TagRow>(
            r"
            INSERT INTO plura.tag (id, name, color, sub_account_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, color = EXCLUDED.color, updated_at = NOW()
            RETURNING id, name, color, sub_account_id, created_at, updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.color)
        .bind(&record.sub_account_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }

    /// Create or update a contact.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Conflict` if the sub-account does not exist.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn upsert_contact(&self, record: &ContactRecord) -> Result<Contact, RepositoryError> {
        let row = sqlx::query_as::<_, ContactRow>(
            r"
            INSERT INTO plura.contact (id, name, email, sub_account_id)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (id) DO UPDATE
            SET name = EXCLUDED.name, email = EXCLUDED.email, updated_at = NOW()
            RETURNING id, name, email, sub_account_id, created_at, updated_at
            ",
        )
        .bind(&record.id)
        .bind(&record.name)
        .bind(&record.email)
        .bind(&record.sub_account_id)
        .fetch_one(self.pool)
        .await
        .map_err(RepositoryError::from_write)?;

        Ok(row.into())
    }

    // =========================================================================
    // Ordering
    // =========================================================================

    /// Move lanes of one pipeline to new positions in a single transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if a lane is not in the pipeline.
    /// Returns `RepositoryError::Conflict` if the pipeline's lane orders
    /// would not be `0..n` afterwards.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_lanes_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[LaneOrder],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;

        for item in batch {
            let result = sqlx::query(
                r#"
                UPDATE plura.lane
                SET "order" = $1, updated_at = NOW()
                WHERE id = $2 AND pipeline_id = $3
                "#,
            )
            .bind(item.order)
            .bind(&item.id)
            .bind(pipeline_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }
        }

        let orders: Vec<i32> =
            sqlx::query_scalar(r#"SELECT "order" FROM plura.lane WHERE pipeline_id = $1"#)
                .bind(pipeline_id)
                .fetch_all(&mut *tx)
                .await?;
        if !is_contiguous(&orders) {
            return Err(RepositoryError::Conflict(format!(
                "lane orders of pipeline {pipeline_id} would not be contiguous"
            )));
        }

        tx.commit().await.map_err(RepositoryError::from_write)
    }

    /// Move tickets (possibly across lanes) within one pipeline in a single
    /// transaction.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::NotFound` if a ticket or target lane is not
    /// in the pipeline.
    /// Returns `RepositoryError::Conflict` if a touched lane's ticket orders
    /// would not be `0..n` afterwards.
    /// Returns `RepositoryError::Database` for other database errors.
    pub async fn update_tickets_order(
        &self,
        pipeline_id: &PipelineId,
        batch: &[TicketOrder],
    ) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await?;
        let mut touched: BTreeSet<LaneId> = BTreeSet::new();

        for item in batch {
            let previous_lane: Option<LaneId> = sqlx::query_scalar(
                r"
                SELECT t.lane_id
                FROM plura.ticket t
                JOIN plura.lane l ON l.id = t.lane_id
                WHERE t.id = $1 AND l.pipeline_id = $2
                FOR UPDATE OF t
                ",
            )
            .bind(&item.id)
            .bind(pipeline_id)
            .fetch_optional(&mut *tx)
            .await?;
            let Some(previous_lane) = previous_lane else {
                return Err(RepositoryError::NotFound);
            };

            let result = sqlx::query(
                r#"
                UPDATE plura.ticket
                SET "order" = $1, lane_id = $2, updated_at = NOW()
                WHERE id = $3
                  AND EXISTS (SELECT 1 FROM plura.lane WHERE id = $2 AND pipeline_id = $4)
                "#,
            )
            .bind(item.order)
            .bind(&item.lane_id)
            .bind(&item.id)
            .bind(pipeline_id)
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                return Err(RepositoryError::NotFound);
            }

            touched.insert(previous_lane);
            touched.insert(item.lane_id.clone());
        }

        for lane_id in &touched {
            if !lane_orders_contiguous(&mut tx, lane_id).await? {
                return Err(RepositoryError::Conflict(format!(
                    "ticket orders of lane {lane_id} would not be contiguous"
                )));
            }
        }

        tx.commit().await.map_err(RepositoryError::from_write)
    }
}

async fn lane_orders_contiguous(
    conn: &mut PgConnection,
    lane_id: &LaneId,
) -> Result<bool, RepositoryError> {
    let orders: Vec<i32> =
        sqlx::query_scalar(r#"SELECT "order" FROM plura.ticket WHERE lane_id = $1"#)
            .bind(lane_id)
            .fetch_all(&mut *conn)
            .await?;
    Ok(is_contiguous(&orders))
}

async fn replace_ticket_tags(
    conn: &mut PgConnection,
    ticket_id: &TicketId,
    tag_ids: &[TagId],
) -> Result<(), RepositoryError> {
    sqlx::query("DELETE FROM plura.ticket_tag WHERE ticket_id = $1")
        .bind(ticket_id)
        .execute(&mut *conn)
        .await?;

    for tag_id in tag_ids {
        sqlx::query(
            r"
            INSERT INTO plura.ticket_tag (ticket_id, tag_id)
            VALUES ($1, $2)
            ON CONFLICT DO NOTHING
            ",
        )
        .bind(ticket_id)
        .bind(tag_id)
        .execute(&mut *conn)
        .await
        .map_err(RepositoryError::from_write)?;
    }
    Ok(())
}
