mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use notify_backend::domain::models::intent::NewIntent;
use notify_backend::publisher::IntentPublisher;
use serde_json::json;

#[tokio::test]
async fn test_publisher_mirrors_due_rows_exactly_once() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-1", "chat-9", json!({})))
        .await
        .unwrap();

    let mut publisher = IntentPublisher::new(app.state.clone());
    publisher.publish_cycle().await.unwrap();
    publisher.publish_cycle().await.unwrap();

    // one broker message despite two cycles
    assert_eq!(app.broker.depth(), 1);
    let row = repo.find_by_id(&intent.id).await.unwrap().unwrap();
    assert!(row.published_at.is_some());
}

#[tokio::test]
async fn test_publisher_skips_future_dated_rows() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    repo.enqueue(
        &NewIntent::new("reminder-24h", "booking-2", "chat-9", json!({}))
            .not_before(Utc::now() + Duration::hours(24)),
    )
    .await
    .unwrap();

    let mut publisher = IntentPublisher::new(app.state.clone());
    publisher.publish_cycle().await.unwrap();

    assert_eq!(app.broker.depth(), 0);
}

#[tokio::test]
async fn test_backlog_drain_republishes_stale_rows() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-3", "chat-9", json!({})))
        .await
        .unwrap();

    // a publish stamp from a previous process life, message long gone
    sqlx::query("UPDATE intents SET published_at = ? WHERE id = ?")
        .bind(Utc::now() - Duration::minutes(30))
        .bind(&intent.id)
        .execute(&app.pool)
        .await
        .unwrap();

    let mut publisher = IntentPublisher::new(app.state.clone());
    publisher.publish_cycle().await.unwrap();
    assert_eq!(app.broker.depth(), 0, "stamped row must not re-publish before the drain");

    let drained = publisher.drain_backlog().await.unwrap();
    assert_eq!(drained, 1);

    publisher.publish_cycle().await.unwrap();
    assert_eq!(app.broker.depth(), 1);
}

#[tokio::test]
async fn test_fresh_publish_stamps_survive_the_drain() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    repo.enqueue(&NewIntent::new("booking-confirmed", "booking-4", "chat-9", json!({})))
        .await
        .unwrap();

    let mut publisher = IntentPublisher::new(app.state.clone());
    publisher.publish_cycle().await.unwrap();
    assert_eq!(app.broker.depth(), 1);

    // just-published rows are inside the grace window
    let drained = publisher.drain_backlog().await.unwrap();
    assert_eq!(drained, 0);
}

#[tokio::test]
async fn test_retry_clears_publish_stamp_for_remirroring() {
    let app = TestApp::new().await;
    let repo = &app.state.intent_repo;

    let intent = repo
        .enqueue(&NewIntent::new("booking-confirmed", "booking-5", "chat-9", json!({})))
        .await
        .unwrap();

    let mut publisher = IntentPublisher::new(app.state.clone());
    publisher.publish_cycle().await.unwrap();
    assert_eq!(app.broker.depth(), 1);

    repo.claim_one(&intent.id, Utc::now() - Duration::minutes(5)).await.unwrap();
    repo.mark_retry(&intent.id, Utc::now()).await.unwrap();

    // the retried row is due and unpublished again
    publisher.publish_cycle().await.unwrap();
    assert_eq!(app.broker.depth(), 2);
}
