use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use order_notify::{
    clients::{memory::MemoryStore, messaging::Messaging},
    error::{GatewayError, TriggerError},
    models::{
        notification::{DeliveryOutcome, DrainReport},
        order::OrderStatus,
    },
    services::delivery::{DeliveryEngine, DrainSettings, classify_failure},
};
use serde_json::json;

use crate::support::{
    FLAKY_TOKEN, Failure, FailingStore, STALE_TOKEN, ScriptedGateway, VALID_TOKEN, engine, order,
    pending,
};

fn engine_over(store: &Arc<FailingStore>, gateway: &Arc<ScriptedGateway>) -> DeliveryEngine {
    DeliveryEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(Messaging::ready(gateway.clone())),
        DrainSettings::default(),
    )
}

/// Test: Successful sends remove every record
#[tokio::test]
async fn test_successful_sends_remove_records() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    for _ in 0..3 {
        store.insert_pending(pending(VALID_TOKEN, 0)).await;
    }
    store.insert_pending(pending(VALID_TOKEN, 2)).await;

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(
        report,
        DrainReport {
            processed: 4,
            successful: 4,
            failed: 0,
            skipped: 0,
            over_budget: 0,
        }
    );
    assert!(store.pending().await.is_empty(), "No records should remain");
    assert_eq!(gateway.sent().len(), 4);
    assert_eq!(store.commit_count(), 1, "Batch should be committed once");

    Ok(())
}

/// Test: A retryable failure on the last allowed attempt deletes the record
#[tokio::test]
async fn test_retryable_failure_on_last_attempt_deletes_record() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new().with_failure(FLAKY_TOKEN, Failure::Transient));

    let record = pending(FLAKY_TOKEN, 2);
    let id = record.id;
    store.insert_pending(record).await;

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(report.failed, 1);
    assert_eq!(report.successful, 0);
    assert!(
        store.pending_by_id(id).await.is_none(),
        "Budget-exhausted record should be deleted, not incremented"
    );

    Ok(())
}

/// Test: A retryable failure with budget left increments the counter
#[tokio::test]
async fn test_retryable_failure_increments_attempts() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new().with_failure(FLAKY_TOKEN, Failure::Transient));

    let first = pending(FLAKY_TOKEN, 0);
    let second = pending(FLAKY_TOKEN, 1);
    let (first_id, second_id) = (first.id, second.id);
    store.insert_pending(first).await;
    store.insert_pending(second).await;

    let engine = engine(&store, &gateway);
    let report = engine.drain().await?;

    assert_eq!(report.failed, 2);
    assert_eq!(store.pending_by_id(first_id).await.map(|n| n.attempts), Some(1));
    assert_eq!(store.pending_by_id(second_id).await.map(|n| n.attempts), Some(2));

    // Third cycle exhausts the second record and advances the first.
    engine.drain().await?;
    assert!(store.pending_by_id(second_id).await.is_none());
    assert_eq!(store.pending_by_id(first_id).await.map(|n| n.attempts), Some(2));

    engine.drain().await?;
    assert!(store.pending().await.is_empty());

    Ok(())
}

/// Test: An invalid token deletes the record regardless of attempts
#[tokio::test]
async fn test_invalid_token_bypasses_retry_budget() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new().with_failure(STALE_TOKEN, Failure::InvalidToken));

    let record = pending(STALE_TOKEN, 0);
    let id = record.id;
    store.insert_pending(record).await;

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(report.failed, 1);
    assert!(store.pending_by_id(id).await.is_none());

    Ok(())
}

/// Test: An invalid token clears the token on the originating order
#[tokio::test]
async fn test_invalid_token_clears_order_token() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new().with_failure(STALE_TOKEN, Failure::InvalidToken));

    let mut snapshot = order(OrderStatus::Accepted);
    snapshot.customer_fcm_token = Some(STALE_TOKEN.to_string());
    store.insert_order("order-7", snapshot).await;

    let mut record = pending(STALE_TOKEN, 1);
    record.order_id = Some("order-7".to_string());
    store.insert_pending(record).await;

    engine(&store, &gateway).drain().await?;

    let order = store.order("order-7").await.expect("order exists");
    assert_eq!(order.customer_fcm_token, None);
    assert!(store.pending().await.is_empty());

    Ok(())
}

/// Test: Records without a token are dropped without a send
#[tokio::test]
async fn test_blank_token_is_dropped_without_send() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    store.insert_pending(pending("", 0)).await;
    store.insert_pending(pending("   ", 1)).await;
    store.insert_pending(pending(VALID_TOKEN, 0)).await;

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(report.skipped, 2);
    assert_eq!(report.successful, 1);
    assert_eq!(report.failed, 0);
    assert_eq!(report.processed, 1);
    assert_eq!(gateway.sent().len(), 1);
    assert!(store.pending().await.is_empty());

    Ok(())
}

/// Test: Draining an empty queue writes nothing
#[tokio::test]
async fn test_empty_queue_is_a_no_op() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(report, DrainReport::default());
    assert_eq!(store.commit_count(), 0, "Empty drain must not write");
    assert!(gateway.sent().is_empty());

    Ok(())
}

/// Test: Records at or over the budget are not picked up
#[tokio::test]
async fn test_records_over_budget_are_not_fetched() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    store.insert_pending(pending(VALID_TOKEN, 3)).await;
    store.insert_pending(pending(VALID_TOKEN, 5)).await;

    let report = engine(&store, &gateway).drain().await?;

    assert_eq!(
        report,
        DrainReport {
            over_budget: 2,
            ..DrainReport::default()
        }
    );
    assert!(gateway.sent().is_empty());
    assert_eq!(store.pending().await.len(), 2, "Over-budget records are left alone");
    assert_eq!(store.commit_count(), 0);

    Ok(())
}

/// Test: A drain handles at most the configured batch size
#[tokio::test]
async fn test_drain_respects_batch_limit() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    for _ in 0..5 {
        store.insert_pending(pending(VALID_TOKEN, 0)).await;
    }

    let engine = DeliveryEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(Messaging::ready(gateway.clone())),
        DrainSettings {
            max_batch: 2,
            max_attempts: 3,
        },
    );

    let report = engine.drain().await?;

    assert_eq!(report.successful, 2);
    assert_eq!(store.pending().await.len(), 3);

    Ok(())
}

/// Test: Data payloads are stringified and typed
#[tokio::test]
async fn test_payload_data_is_normalized() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new());

    store.insert_pending(pending(VALID_TOKEN, 0)).await;

    let mut typed = pending(VALID_TOKEN, 0);
    typed.data = json!({ "type": "promo", "discount": 15, "firstOrder": true })
        .as_object()
        .cloned()
        .unwrap_or_default();
    store.insert_pending(typed).await;

    engine(&store, &gateway).drain().await?;

    let sent = gateway.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].data.len(), 1);
    assert_eq!(sent[0].data.get("type").map(String::as_str), Some("general"));

    assert_eq!(sent[1].data.get("type").map(String::as_str), Some("promo"));
    assert_eq!(sent[1].data.get("discount").map(String::as_str), Some("15"));
    assert_eq!(sent[1].data.get("firstOrder").map(String::as_str), Some("true"));

    Ok(())
}

/// Test: Overlapping drains deliver every record at least once
#[tokio::test]
async fn test_concurrent_drains_deliver_at_least_once() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    let gateway = Arc::new(ScriptedGateway::new().yielding());

    let mut ids = HashSet::new();
    for _ in 0..10 {
        let record = pending(VALID_TOKEN, 0);
        ids.insert(record.id);
        store.insert_pending(record).await;
    }

    let first = engine(&store, &gateway);
    let second = engine(&store, &gateway);

    let (a, b) = tokio::join!(first.drain(), second.drain());
    let (a, b) = (a?, b?);

    assert!(
        a.successful + b.successful >= ids.len(),
        "Every record must be sent at least once"
    );
    assert!(gateway.sent().len() >= ids.len());
    assert!(store.pending().await.is_empty(), "No record may be orphaned");

    Ok(())
}

/// Test: An uninitialized gateway fails the drain before touching the store
#[tokio::test]
async fn test_uninitialized_gateway_rejects_drain() -> Result<()> {
    let store = Arc::new(MemoryStore::new());
    store.insert_pending(pending(VALID_TOKEN, 0)).await;

    let engine = DeliveryEngine::new(
        store.clone(),
        store.clone(),
        Arc::new(Messaging::new()),
        DrainSettings::default(),
    );

    let result = engine.drain().await;

    assert!(matches!(
        result,
        Err(TriggerError::Delivery(GatewayError::Unavailable))
    ));
    assert_eq!(store.pending().await.len(), 1);
    assert_eq!(store.commit_count(), 0);

    Ok(())
}

#[test]
fn test_failure_classification() {
    let transient = GatewayError::Transport("timeout".to_string());
    let invalid = GatewayError::InvalidToken("unregistered".to_string());

    assert_eq!(classify_failure(&transient, 0, 3), DeliveryOutcome::Retrying);
    assert_eq!(classify_failure(&transient, 1, 3), DeliveryOutcome::Retrying);
    assert_eq!(classify_failure(&transient, 2, 3), DeliveryOutcome::Exhausted);
    assert_eq!(classify_failure(&invalid, 0, 3), DeliveryOutcome::InvalidToken);
}

/// Test: An unreachable store fails the cycle before anything is sent
#[tokio::test]
async fn test_store_failure_fails_drain() -> Result<()> {
    let store = Arc::new(FailingStore::unreachable());
    let gateway = Arc::new(ScriptedGateway::new());

    let result = engine_over(&store, &gateway).drain().await;

    match result {
        Err(TriggerError::Store(e)) => assert_eq!(e.to_string(), "store unreachable"),
        other => panic!("Expected a store error, got {:?}", other),
    }
    assert!(gateway.sent().is_empty());

    Ok(())
}

/// Test: A failed batch commit is an error, and the records stay queued
#[tokio::test]
async fn test_commit_failure_fails_drain() -> Result<()> {
    let store = Arc::new(FailingStore::failing_commits());
    let gateway = Arc::new(ScriptedGateway::new());

    store.inner.insert_pending(pending(VALID_TOKEN, 0)).await;
    store.inner.insert_pending(pending(VALID_TOKEN, 1)).await;

    let result = engine_over(&store, &gateway).drain().await;

    assert!(
        matches!(result, Err(TriggerError::Store(_))),
        "Counts must not be reported when the batch was not written"
    );
    assert_eq!(gateway.sent().len(), 2, "Sends happen before the commit");
    assert_eq!(store.inner.pending().await.len(), 2);
    assert_eq!(store.inner.commit_count(), 0);

    Ok(())
}
