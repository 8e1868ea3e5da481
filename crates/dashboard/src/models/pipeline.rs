//! Sales pipelines: pipeline, lanes, tickets and the tags and contacts
//! tickets reference.
//!
//! Lanes are ordered within their pipeline and tickets within their lane by
//! an explicit `order` column. After any write the orders of siblings are
//! `0..n` with no gaps or duplicates.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use plura_core::{ContactId, LaneId, PipelineId, SubAccountId, TagId, TicketId, UserId};

use super::user::User;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pipeline {
    pub id: PipelineId,
    pub name: String,
    pub sub_account_id: SubAccountId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineRecord {
    pub id: PipelineId,
    pub name: String,
    pub sub_account_id: SubAccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lane {
    pub id: LaneId,
    pub name: String,
    pub pipeline_id: PipelineId,
    pub order: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Lane upsert. A new lane is appended after the last one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaneRecord {
    pub id: LaneId,
    pub name: String,
    pub pipeline_id: PipelineId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ticket {
    pub id: TicketId,
    pub name: String,
    pub lane_id: LaneId,
    pub order: i32,
    pub value: Option<Decimal>,
    pub description: Option<String>,
    pub customer_id: Option<ContactId>,
    pub assigned_user_id: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Ticket upsert. A new ticket is appended to the end of its lane; an
/// existing one keeps its position and its tag set is replaced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TicketRecord {
    pub id: TicketId,
    pub name: String,
    pub lane_id: LaneId,
    pub value: Option<Decimal>,
    pub description: Option<String>,
    pub customer_id: Option<ContactId>,
    pub assigned_user_id: Option<UserId>,
    pub tag_ids: Vec<TagId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub sub_account_id: SubAccountId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagRecord {
    pub id: TagId,
    pub name: String,
    pub color: String,
    pub sub_account_id: SubAccountId,
}

/// A customer a ticket can be linked to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contact {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub sub_account_id: SubAccountId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContactRecord {
    pub id: ContactId,
    pub name: String,
    pub email: String,
    pub sub_account_id: SubAccountId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketDetail {
    #[serde(flatten)]
    pub ticket: Ticket,
    pub tags: Vec<Tag>,
    pub assigned: Option<User>,
    pub customer: Option<Contact>,
}

/// A lane with its tickets in order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneDetail {
    #[serde(flatten)]
    pub lane: Lane,
    pub tickets: Vec<TicketDetail>,
}

/// Target position of one lane in a reorder batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LaneOrder {
    pub id: LaneId,
    pub order: i32,
}

/// Target lane and position of one ticket in a reorder batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketOrder {
    pub id: TicketId,
    pub lane_id: LaneId,
    pub order: i32,
}
