mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use notify_backend::domain::models::intent::{IntentStatus, NewIntent};
use serde_json::json;

#[tokio::test]
async fn test_enqueue_is_idempotent_per_key() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let first = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-1", "chat-9", json!({"n": 1})))
        .await
        .unwrap();
    let second = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-1", "chat-9", json!({"n": 2})))
        .await
        .unwrap();

    // same row, refreshed payload, no second ledger entry
    assert_eq!(first.id, second.id);
    assert_eq!(second.status, IntentStatus::Pending);
    assert_eq!(second.payload.0["n"], 2);

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM intents")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_different_kinds_are_distinct_intents() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let confirmed = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-1", "chat-9", json!({})))
        .await
        .unwrap();
    let reminder = repo
        .enqueue(&NewIntent::new("reminder-24h", "booking-1", "chat-9", json!({})))
        .await
        .unwrap();

    assert_ne!(confirmed.id, reminder.id);
}

#[tokio::test]
async fn test_enqueue_refresh_resets_retry_state() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-2", "chat-9", json!({})))
        .await
        .unwrap();

    // simulate a couple of failed attempts
    let claimed = repo.claim_batch(10, Utc::now() - Duration::minutes(5)).await.unwrap();
    assert_eq!(claimed.len(), 1);
    repo.mark_retry(&intent.id, Utc::now() + Duration::hours(1)).await.unwrap();

    let refreshed = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-2", "chat-9", json!({"v": 2})))
        .await
        .unwrap();

    assert_eq!(refreshed.id, intent.id);
    assert_eq!(refreshed.status, IntentStatus::Pending);
    assert_eq!(refreshed.attempts, 0);
    assert!(refreshed.next_retry_at.is_none());
    assert!(refreshed.last_error.is_none());
}

#[tokio::test]
async fn test_terminal_rows_are_never_resurrected() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-3", "chat-9", json!({"v": 1})))
        .await
        .unwrap();
    repo.claim_one(&intent.id, Utc::now() - Duration::minutes(5)).await.unwrap();
    repo.mark_sent(&intent.id).await.unwrap();

    let again = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-3", "chat-9", json!({"v": 2})))
        .await
        .unwrap();

    // the sent row comes back untouched
    assert_eq!(again.id, intent.id);
    assert_eq!(again.status, IntentStatus::Sent);
    assert_eq!(again.payload.0["v"], 1);
}

#[tokio::test]
async fn test_cancelled_rows_can_be_reenqueued() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("reminder-24h", "booking-4", "chat-9", json!({})))
        .await
        .unwrap();
    assert!(repo.cancel_pending(&intent.id).await.unwrap());

    let revived = repo
        .enqueue(&NewIntent::new("reminder-24h", "booking-4", "chat-9", json!({})))
        .await
        .unwrap();

    assert_eq!(revived.id, intent.id);
    assert_eq!(revived.status, IntentStatus::Pending);
}

#[tokio::test]
async fn test_future_dated_intent_is_not_claimable_until_due() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    repo.enqueue(
        &NewIntent::new("reminder-2h", "booking-5", "chat-9", json!({}))
            .not_before(Utc::now() + Duration::hours(2)),
    )
    .await
    .unwrap();

    let claimed = repo.claim_batch(10, Utc::now() - Duration::minutes(5)).await.unwrap();
    assert!(claimed.is_empty());
}

#[tokio::test]
async fn test_stale_locks_are_reclaimed() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-6", "chat-9", json!({})))
        .await
        .unwrap();
    let first = repo.claim_one(&intent.id, Utc::now() - Duration::minutes(5)).await.unwrap();
    assert!(first.is_some());

    // a fresh lock keeps other workers out
    let contended = repo.claim_one(&intent.id, Utc::now() - Duration::minutes(5)).await.unwrap();
    assert!(contended.is_none());

    // a lock older than the staleness cutoff is treated as abandoned
    let reclaimed = repo.claim_one(&intent.id, Utc::now() + Duration::seconds(1)).await.unwrap();
    let reclaimed = reclaimed.expect("stale lock should be reclaimable");
    assert_eq!(reclaimed.attempts, 2);
}

#[tokio::test]
async fn test_mark_operations_refuse_terminal_rows() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-declined", "booking-7", "chat-9", json!({})))
        .await
        .unwrap();
    repo.claim_one(&intent.id, Utc::now() - Duration::minutes(5)).await.unwrap();
    repo.mark_failed(&intent.id, "recipient blocked the bot").await.unwrap();

    let err = repo.mark_sent(&intent.id).await.unwrap_err();
    assert!(matches!(err, notify_backend::error::AppError::AlreadyTerminal(_)));

    let row = repo.find_by_id(&intent.id).await.unwrap().unwrap();
    assert_eq!(row.status, IntentStatus::Failed);
    assert_eq!(row.last_error.as_deref(), Some("recipient blocked the bot"));
}
