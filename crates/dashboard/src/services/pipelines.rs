//! Sales pipelines: pipelines, lanes, tickets, tags and contacts.
//!
//! # Ordering
//!
//! Lanes are ordered within a pipeline and tickets within a lane. New lanes
//! and tickets go to the end, deletions close the gap, and a reorder is
//! applied as one batch: either every position in it is saved or none is.
//! Two reorders racing on the same pipeline resolve as last write wins.

use std::collections::HashSet;

use rust_decimal::Decimal;
use serde::Deserialize;
use tracing::{error, info, instrument};

use plura_core::{ContactId, LaneId, PipelineId, SubAccountId, TagId, TicketId, UserId};

use crate::db::Store;
use crate::error::AppError;
use crate::models::{
    Contact, ContactRecord, Lane, LaneDetail, LaneOrder, LaneRecord, Pipeline, PipelineRecord,
    Tag, TagRecord, Ticket, TicketDetail, TicketOrder, TicketRecord,
};
use crate::validation::{ValidationError, Validator};

/// Pipeline create-or-update request. A missing or blank id creates a new
/// pipeline.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertPipelineInput {
    #[serde(default)]
    pub id: Option<PipelineId>,
    pub name: String,
    pub sub_account_id: SubAccountId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertLaneInput {
    #[serde(default)]
    pub id: Option<LaneId>,
    pub name: String,
    pub pipeline_id: PipelineId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTicketInput {
    #[serde(default)]
    pub id: Option<TicketId>,
    pub name: String,
    pub lane_id: LaneId,
    #[serde(default)]
    pub value: Option<Decimal>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub customer_id: Option<ContactId>,
    #[serde(default)]
    pub assigned_user_id: Option<UserId>,
    #[serde(default)]
    pub tag_ids: Vec<TagId>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertTagInput {
    #[serde(default)]
    pub id: Option<TagId>,
    pub name: String,
    pub color: String,
    pub sub_account_id: SubAccountId,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpsertContactInput {
    #[serde(default)]
    pub id: Option<ContactId>,
    pub name: String,
    pub email: String,
    pub sub_account_id: SubAccountId,
}

/// The given id unless it is absent or blank, else a fresh one.
fn id_or_generate<T: AsRef<str>>(id: Option<&T>, generate: fn() -> T) -> T
where
    T: Clone,
{
    id.filter(|id| !id.as_ref().trim().is_empty())
        .cloned()
        .unwrap_or_else(generate)
}

impl UpsertPipelineInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<PipelineRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        v.required_id("subAccountId", &self.sub_account_id);
        v.finish(PipelineRecord {
            id: id_or_generate(self.id.as_ref(), PipelineId::generate),
            name,
            sub_account_id: self.sub_account_id.clone(),
        })
    }
}

impl UpsertLaneInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<LaneRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        v.required_id("pipelineId", &self.pipeline_id);
        v.finish(LaneRecord {
            id: id_or_generate(self.id.as_ref(), LaneId::generate),
            name,
            pipeline_id: self.pipeline_id.clone(),
        })
    }
}

impl UpsertTicketInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<TicketRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        v.required_id("laneId", &self.lane_id);
        v.check(
            self.value.is_none_or(|value| !value.is_sign_negative()),
            "value",
            "must not be negative",
        );
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())
            .map(str::to_string);
        v.finish(TicketRecord {
            id: id_or_generate(self.id.as_ref(), TicketId::generate),
            name,
            lane_id: self.lane_id.clone(),
            value: self.value,
            description,
            customer_id: self.customer_id.clone(),
            assigned_user_id: self.assigned_user_id.clone(),
            tag_ids: self.tag_ids.clone(),
        })
    }
}

impl UpsertTagInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<TagRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        let color = v.required("color", &self.color);
        v.required_id("subAccountId", &self.sub_account_id);
        v.finish(TagRecord {
            id: id_or_generate(self.id.as_ref(), TagId::generate),
            name,
            color,
            sub_account_id: self.sub_account_id.clone(),
        })
    }
}

impl UpsertContactInput {
    /// # Errors
    ///
    /// Returns every offending field.
    pub fn validate(&self) -> Result<ContactRecord, ValidationError> {
        let mut v = Validator::new();
        let name = v.required("name", &self.name);
        let email = v.email("email", &self.email);
        v.required_id("subAccountId", &self.sub_account_id);
        v.finish(ContactRecord {
            id: id_or_generate(self.id.as_ref(), ContactId::generate),
            name,
            email: email.map(String::from).unwrap_or_default(),
            sub_account_id: self.sub_account_id.clone(),
        })
    }
}

/// Check a lane reorder batch before it reaches the datastore.
fn check_lane_batch(batch: &[LaneOrder]) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    let mut ids = HashSet::new();
    let mut orders = HashSet::new();
    for item in batch {
        v.check(ids.insert(&item.id), "id", "lane listed twice");
        v.check(item.order >= 0, "order", "must not be negative");
        v.check(orders.insert(item.order), "order", "position used twice");
    }
    v.finish(())
}

/// Check a ticket reorder batch before it reaches the datastore.
fn check_ticket_batch(batch: &[TicketOrder]) -> Result<(), ValidationError> {
    let mut v = Validator::new();
    let mut ids = HashSet::new();
    let mut positions = HashSet::new();
    for item in batch {
        v.check(ids.insert(&item.id), "id", "ticket listed twice");
        v.check(item.order >= 0, "order", "must not be negative");
        v.check(
            positions.insert((&item.lane_id, item.order)),
            "order",
            "position used twice in one lane",
        );
    }
    v.finish(())
}

/// Pipeline service.
pub struct PipelineService<'a> {
    store: &'a dyn Store,
}

impl<'a> PipelineService<'a> {
    #[must_use]
    pub const fn new(store: &'a dyn Store) -> Self {
        Self { store }
    }

    // --- Pipelines ---

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn pipeline_details(&self, id: &PipelineId) -> Result<Option<Pipeline>, AppError> {
        Ok(self.store.pipeline(id).await?)
    }

    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn pipelines(&self, sub_account_id: &SubAccountId) -> Result<Vec<Pipeline>, AppError> {
        Ok(self.store.pipelines_for_sub_account(sub_account_id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for an unknown sub-account, or a database error.
    #[instrument(skip(self, input), fields(sub_account_id = %input.sub_account_id))]
    pub async fn upsert_pipeline(&self, input: &UpsertPipelineInput) -> Result<Pipeline, AppError> {
        let record = input.validate()?;
        let pipeline = self
            .store
            .upsert_pipeline(&record)
            .await
            .map_err(AppError::from_write)?;
        info!(pipeline_id = %pipeline.id, "Pipeline saved");
        Ok(pipeline)
    }

    /// Delete a pipeline with its lanes and tickets.
    ///
    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_pipeline(&self, id: &PipelineId) -> Result<Option<Pipeline>, AppError> {
        Ok(self.store.delete_pipeline(id).await?)
    }

    // --- Lanes and tickets ---

    /// Lanes in order, each with its tickets in order.
    ///
    /// # Errors
    ///
    /// Returns a database error if the lookup fails.
    pub async fn lanes_with_tickets(
        &self,
        pipeline_id: &PipelineId,
    ) -> Result<Vec<LaneDetail>, AppError> {
        Ok(self.store.lanes_with_tickets(pipeline_id).await?)
    }

    /// Rename a lane, or append a new one to its pipeline.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for an unknown pipeline, or a database error.
    #[instrument(skip(self, input), fields(pipeline_id = %input.pipeline_id))]
    pub async fn upsert_lane(&self, input: &UpsertLaneInput) -> Result<Lane, AppError> {
        let record = input.validate()?;
        self.store
            .upsert_lane(&record)
            .await
            .map_err(AppError::from_write)
    }

    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_lane(&self, id: &LaneId) -> Result<Option<Lane>, AppError> {
        Ok(self.store.delete_lane(id).await?)
    }

    /// Update a ticket in place, or append a new one to its lane.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for an unknown lane, contact, user or tag, or a database error.
    #[instrument(skip(self, input), fields(lane_id = %input.lane_id))]
    pub async fn upsert_ticket(&self, input: &UpsertTicketInput) -> Result<TicketDetail, AppError> {
        let record = input.validate()?;
        self.store
            .upsert_ticket(&record)
            .await
            .map_err(AppError::from_write)
    }

    /// # Errors
    ///
    /// Returns a database error if the delete fails.
    #[instrument(skip(self))]
    pub async fn delete_ticket(&self, id: &TicketId) -> Result<Option<Ticket>, AppError> {
        Ok(self.store.delete_ticket(id).await?)
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for an unknown sub-account, or a database error.
    pub async fn upsert_tag(&self, input: &UpsertTagInput) -> Result<Tag, AppError> {
        let record = input.validate()?;
        self.store
            .upsert_tag(&record)
            .await
            .map_err(AppError::from_write)
    }

    /// # Errors
    ///
    /// Returns `AppError::Validation` for bad input, `AppError::BadRequest`
    /// for an unknown sub-account, or a database error.
    pub async fn upsert_contact(&self, input: &UpsertContactInput) -> Result<Contact, AppError> {
        let record = input.validate()?;
        self.store
            .upsert_contact(&record)
            .await
            .map_err(AppError::from_write)
    }

    // --- Ordering ---

    /// Move lanes of one pipeline to new positions.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed batch, and
    /// `AppError::OrderNotSaved` if the datastore rejected it. In both cases
    /// no position has changed.
    #[instrument(skip(self, batch), fields(pipeline_id = %pipeline_id, lanes = batch.len()))]
    pub async fn reorder_lanes(
        &self,
        pipeline_id: &PipelineId,
        batch: &[LaneOrder],
    ) -> Result<(), AppError> {
        check_lane_batch(batch)?;
        if let Err(e) = self.store.update_lanes_order(pipeline_id, batch).await {
            error!(error = %e, "Could not save lane order");
            return Err(AppError::OrderNotSaved);
        }
        info!("Lanes reordered");
        Ok(())
    }

    /// Move tickets of one pipeline to new positions, possibly into other
    /// lanes.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for a malformed batch, and
    /// `AppError::OrderNotSaved` if the datastore rejected it. In both cases
    /// no position has changed.
    #[instrument(skip(self, batch), fields(pipeline_id = %pipeline_id, tickets = batch.len()))]
    pub async fn reorder_tickets(
        &self,
        pipeline_id: &PipelineId,
        batch: &[TicketOrder],
    ) -> Result<(), AppError> {
        check_ticket_batch(batch)?;
        if let Err(e) = self.store.update_tickets_order(pipeline_id, batch).await {
            error!(error = %e, "Could not save ticket order");
            return Err(AppError::OrderNotSaved);
        }
        info!("Tickets reordered");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::services::fixtures::{self, SUB_ACCOUNT};

    async fn lead_cycle(service: &PipelineService<'_>) -> PipelineId {
        service
            .pipelines(&SubAccountId::new(SUB_ACCOUNT))
            .await
            .unwrap()
            .remove(0)
            .id
    }

    async fn add_lane(service: &PipelineService<'_>, pipeline_id: &PipelineId, name: &str) -> Lane {
        service
            .upsert_lane(&UpsertLaneInput {
                id: None,
                name: name.to_string(),
                pipeline_id: pipeline_id.clone(),
            })
            .await
            .unwrap()
    }

    async fn add_ticket(service: &PipelineService<'_>, lane_id: &LaneId, name: &str) -> Ticket {
        service
            .upsert_ticket(&UpsertTicketInput {
                id: None,
                name: name.to_string(),
                lane_id: lane_id.clone(),
                value: Some(Decimal::new(1250, 2)),
                description: None,
                customer_id: None,
                assigned_user_id: None,
                tag_ids: Vec::new(),
            })
            .await
            .unwrap()
            .ticket
    }

    fn lane_names(lanes: &[LaneDetail]) -> Vec<(&str, i32)> {
        lanes
            .iter()
            .map(|l| (l.lane.name.as_str(), l.lane.order))
            .collect()
    }

    #[test]
    fn test_blank_id_generates() {
        let input = UpsertPipelineInput {
            id: Some(PipelineId::new("")),
            name: "Sales".to_string(),
            sub_account_id: SubAccountId::new(SUB_ACCOUNT),
        };
        let record = input.validate().unwrap();
        assert!(!record.id.is_blank());

        let input = UpsertPipelineInput {
            id: Some(PipelineId::new("p1")),
            ..input
        };
        assert_eq!(input.validate().unwrap().id.as_str(), "p1");
    }

    #[test]
    fn test_ticket_value_must_not_be_negative() {
        let input = UpsertTicketInput {
            id: None,
            name: "Deal".to_string(),
            lane_id: LaneId::new("l1"),
            value: Some(Decimal::new(-1, 0)),
            description: Some("   ".to_string()),
            customer_id: None,
            assigned_user_id: None,
            tag_ids: Vec::new(),
        };
        let err = input.validate().unwrap_err();
        assert!(err.has_field("value"));
    }

    #[test]
    fn test_lane_batch_rejects_duplicates() {
        let batch = vec![
            LaneOrder { id: LaneId::new("a"), order: 0 },
            LaneOrder { id: LaneId::new("a"), order: 1 },
            LaneOrder { id: LaneId::new("b"), order: 1 },
            LaneOrder { id: LaneId::new("c"), order: -1 },
        ];
        let err = check_lane_batch(&batch).unwrap_err();
        assert!(err.has_field("id"));
        assert!(err.has_field("order"));
        assert_eq!(err.fields.len(), 3);
    }

    #[test]
    fn test_ticket_batch_allows_same_order_in_different_lanes() {
        let batch = vec![
            TicketOrder { id: TicketId::new("t1"), lane_id: LaneId::new("a"), order: 0 },
            TicketOrder { id: TicketId::new("t2"), lane_id: LaneId::new("b"), order: 0 },
        ];
        assert!(check_ticket_batch(&batch).is_ok());
    }

    #[tokio::test]
    async fn test_lanes_append_and_compact() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;

        add_lane(&service, &pipeline_id, "New").await;
        let middle = add_lane(&service, &pipeline_id, "Qualified").await;
        add_lane(&service, &pipeline_id, "Won").await;
        assert_eq!(middle.order, 1);

        service.delete_lane(&middle.id).await.unwrap().unwrap();
        let lanes = service.lanes_with_tickets(&pipeline_id).await.unwrap();
        assert_eq!(lane_names(&lanes), vec![("New", 0), ("Won", 1)]);
    }

    #[tokio::test]
    async fn test_reorder_lanes_applies_batch() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;
        let a = add_lane(&service, &pipeline_id, "A").await;
        let b = add_lane(&service, &pipeline_id, "B").await;
        let c = add_lane(&service, &pipeline_id, "C").await;

        let batch = vec![
            LaneOrder { id: c.id, order: 0 },
            LaneOrder { id: a.id, order: 1 },
            LaneOrder { id: b.id, order: 2 },
        ];
        service.reorder_lanes(&pipeline_id, &batch).await.unwrap();

        let lanes = service.lanes_with_tickets(&pipeline_id).await.unwrap();
        assert_eq!(lane_names(&lanes), vec![("C", 0), ("A", 1), ("B", 2)]);
    }

    #[tokio::test]
    async fn test_failed_reorder_changes_nothing() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;
        let a = add_lane(&service, &pipeline_id, "A").await;
        let b = add_lane(&service, &pipeline_id, "B").await;

        let batch = vec![
            LaneOrder { id: b.id, order: 0 },
            LaneOrder { id: a.id, order: 1 },
            LaneOrder { id: LaneId::new("elsewhere"), order: 2 },
        ];
        let result = service.reorder_lanes(&pipeline_id, &batch).await;
        assert!(matches!(result, Err(AppError::OrderNotSaved)));
        assert_eq!(result.unwrap_err().to_string(), "could not save order");

        let lanes = service.lanes_with_tickets(&pipeline_id).await.unwrap();
        assert_eq!(lane_names(&lanes), vec![("A", 0), ("B", 1)]);
    }

    #[tokio::test]
    async fn test_reorder_tickets_across_lanes() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;
        let todo = add_lane(&service, &pipeline_id, "Todo").await;
        let done = add_lane(&service, &pipeline_id, "Done").await;
        let t1 = add_ticket(&service, &todo.id, "t1").await;
        let t2 = add_ticket(&service, &todo.id, "t2").await;
        assert_eq!(t2.order, 1);

        let batch = vec![
            TicketOrder { id: t1.id, lane_id: done.id.clone(), order: 0 },
            TicketOrder { id: t2.id.clone(), lane_id: todo.id.clone(), order: 0 },
        ];
        service.reorder_tickets(&pipeline_id, &batch).await.unwrap();

        let lanes = service.lanes_with_tickets(&pipeline_id).await.unwrap();
        let names: Vec<Vec<(&str, i32)>> = lanes
            .iter()
            .map(|l| {
                l.tickets
                    .iter()
                    .map(|t| (t.ticket.name.as_str(), t.ticket.order))
                    .collect()
            })
            .collect();
        assert_eq!(names, vec![vec![("t2", 0)], vec![("t1", 0)]]);
    }

    #[tokio::test]
    async fn test_ticket_delete_compacts_lane() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;
        let lane = add_lane(&service, &pipeline_id, "Todo").await;
        let first = add_ticket(&service, &lane.id, "first").await;
        add_ticket(&service, &lane.id, "second").await;

        service.delete_ticket(&first.id).await.unwrap().unwrap();
        let lanes = service.lanes_with_tickets(&pipeline_id).await.unwrap();
        assert_eq!(lanes[0].tickets.len(), 1);
        assert_eq!(lanes[0].tickets[0].ticket.order, 0);
    }

    #[tokio::test]
    async fn test_unknown_pipeline_is_bad_request() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);

        let result = service
            .upsert_lane(&UpsertLaneInput {
                id: None,
                name: "Orphan".to_string(),
                pipeline_id: PipelineId::new("missing"),
            })
            .await;
        assert!(matches!(result, Err(AppError::BadRequest(_))));
    }

    #[tokio::test]
    async fn test_ticket_with_tag_and_contact() {
        let f = fixtures::agency_with_sub_account().await;
        let service = PipelineService::new(&f.store);
        let pipeline_id = lead_cycle(&service).await;
        let lane = add_lane(&service, &pipeline_id, "Todo").await;
        let sub_account_id = SubAccountId::new(SUB_ACCOUNT);

        let tag = service
            .upsert_tag(&UpsertTagInput {
                id: None,
                name: "Hot".to_string(),
                color: "RED".to_string(),
                sub_account_id: sub_account_id.clone(),
            })
            .await
            .unwrap();
        let contact = service
            .upsert_contact(&UpsertContactInput {
                id: None,
                name: "Cory Customer".to_string(),
                email: "cory@z.com".to_string(),
                sub_account_id,
            })
            .await
            .unwrap();

        let detail = service
            .upsert_ticket(&UpsertTicketInput {
                id: None,
                name: "Deal".to_string(),
                lane_id: lane.id,
                value: None,
                description: Some("Big one".to_string()),
                customer_id: Some(contact.id.clone()),
                assigned_user_id: Some(f.owner_principal.id.clone()),
                tag_ids: vec![tag.id],
            })
            .await
            .unwrap();
        assert_eq!(detail.tags.len(), 1);
        assert_eq!(detail.customer.unwrap().id, contact.id);
        assert_eq!(detail.assigned.unwrap().name, "Olive Owner");
    }
}
