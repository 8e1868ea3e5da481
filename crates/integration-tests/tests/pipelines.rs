//! Integration tests for lane and ticket ordering.

#![allow(clippy::unwrap_used)]

use plura_core::{LaneId, PipelineId, SubAccountId};
use plura_dashboard::error::AppError;
use plura_dashboard::models::{LaneDetail, LaneOrder, TicketOrder};
use plura_dashboard::services::{PipelineService, UpsertLaneInput, UpsertTicketInput};
use plura_integration_tests::{SUB_ACCOUNT, TestContext};

async fn lead_cycle(service: &PipelineService<'_>) -> PipelineId {
    service
        .pipelines(&SubAccountId::new(SUB_ACCOUNT))
        .await
        .unwrap()
        .remove(0)
        .id
}

async fn add_lane(service: &PipelineService<'_>, pipeline_id: &PipelineId, name: &str) -> LaneId {
    service
        .upsert_lane(&UpsertLaneInput {
            id: None,
            name: name.to_string(),
            pipeline_id: pipeline_id.clone(),
        })
        .await
        .unwrap()
        .id
}

async fn add_ticket(service: &PipelineService<'_>, lane_id: &LaneId, name: &str) {
    service
        .upsert_ticket(&UpsertTicketInput {
            id: None,
            name: name.to_string(),
            lane_id: lane_id.clone(),
            value: None,
            description: None,
            customer_id: None,
            assigned_user_id: None,
            tag_ids: Vec::new(),
        })
        .await
        .unwrap();
}

fn lane_names(lanes: &[LaneDetail]) -> Vec<&str> {
    lanes.iter().map(|l| l.lane.name.as_str()).collect()
}

fn assert_contiguous(lanes: &[LaneDetail]) {
    for (i, lane) in lanes.iter().enumerate() {
        assert_eq!(usize::try_from(lane.lane.order).unwrap(), i);
        for (j, ticket) in lane.tickets.iter().enumerate() {
            assert_eq!(usize::try_from(ticket.ticket.order).unwrap(), j);
        }
    }
}

#[tokio::test]
async fn test_orders_stay_contiguous_through_deletes() {
    let ctx = TestContext::seeded().await;
    let service = PipelineService::new(ctx.state.store());
    let pipeline = lead_cycle(&service).await;
    let new = add_lane(&service, &pipeline, "New").await;
    let won = add_lane(&service, &pipeline, "Won").await;
    add_lane(&service, &pipeline, "Lost").await;
    for name in ["a", "b", "c"] {
        add_ticket(&service, &new, name).await;
    }

    service.delete_lane(&won).await.unwrap();
    let lanes = service.lanes_with_tickets(&pipeline).await.unwrap();
    let middle = lanes[0].tickets[1].ticket.id.clone();
    service.delete_ticket(&middle).await.unwrap();

    let lanes = service.lanes_with_tickets(&pipeline).await.unwrap();
    assert_eq!(lane_names(&lanes), ["New", "Lost"]);
    assert_eq!(lanes[0].tickets.len(), 2);
    assert_contiguous(&lanes);
}

#[tokio::test]
async fn test_reorder_moves_ticket_between_lanes() {
    let ctx = TestContext::seeded().await;
    let service = PipelineService::new(ctx.state.store());
    let pipeline = lead_cycle(&service).await;
    let todo = add_lane(&service, &pipeline, "Todo").await;
    let done = add_lane(&service, &pipeline, "Done").await;
    add_ticket(&service, &todo, "first").await;
    add_ticket(&service, &todo, "second").await;

    let lanes = service.lanes_with_tickets(&pipeline).await.unwrap();
    let first = lanes[0].tickets[0].ticket.id.clone();
    let second = lanes[0].tickets[1].ticket.id.clone();
    service
        .reorder_tickets(
            &pipeline,
            &[
                TicketOrder { id: second, lane_id: todo.clone(), order: 0 },
                TicketOrder { id: first.clone(), lane_id: done.clone(), order: 0 },
            ],
        )
        .await
        .unwrap();

    let lanes = service.lanes_with_tickets(&pipeline).await.unwrap();
    assert_eq!(lanes[1].tickets[0].ticket.id, first);
    assert_eq!(lanes[1].tickets[0].ticket.lane_id, done);
    assert_contiguous(&lanes);
}

#[tokio::test]
async fn test_rejected_batch_changes_nothing() {
    let ctx = TestContext::seeded().await;
    let service = PipelineService::new(ctx.state.store());
    let pipeline = lead_cycle(&service).await;
    let a = add_lane(&service, &pipeline, "A").await;
    let b = add_lane(&service, &pipeline, "B").await;
    let before = service.lanes_with_tickets(&pipeline).await.unwrap();

    // Two lanes in one slot
    let err = service
        .reorder_lanes(
            &pipeline,
            &[
                LaneOrder { id: a.clone(), order: 0 },
                LaneOrder { id: b.clone(), order: 0 },
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)), "got {err:?}");

    // Well-formed, but leaves a gap
    let err = service
        .reorder_lanes(&pipeline, &[LaneOrder { id: a, order: 5 }])
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::OrderNotSaved), "got {err:?}");

    let after = service.lanes_with_tickets(&pipeline).await.unwrap();
    assert_eq!(lane_names(&after), lane_names(&before));
    assert_contiguous(&after);
}
