mod common;

use chrono::{Duration, Utc};
use common::TestApp;
use notify_backend::domain::models::intent::IntentStatus;
use notify_backend::domain::services::notification_service::{kinds, NotificationService};
use serde_json::json;

fn service(app: &TestApp) -> NotificationService {
    NotificationService::new(app.state.intent_repo.clone(), app.scheduler())
}

#[tokio::test]
async fn test_booking_confirmed_enqueues_confirmation_and_both_reminders() {
    let app = TestApp::new().await;
    let svc = service(&app);
    let start_time = Utc::now() + Duration::hours(48);

    svc.booking_confirmed("booking-1", "chat-9", json!({"name": "Ana", "time": "10:00"}), start_time)
        .await
        .unwrap();

    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM intents")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(count, 3);

    // confirmation goes out now, reminders wait for their fire time
    let mut worker = app.worker();
    worker.poll_cycle().await.unwrap();
    let calls = app.transport.calls();
    assert_eq!(calls.len(), 1);

    for kind in [kinds::REMINDER_24H, kinds::REMINDER_2H] {
        assert!(app.state.reminder_repo.find("booking-1", kind).await.unwrap().is_some());
    }
}

#[tokio::test]
async fn test_booking_soon_skips_elapsed_reminder_offsets() {
    let app = TestApp::new().await;
    let svc = service(&app);

    // starts in 3 hours: the 24h reminder window has already passed
    svc.booking_confirmed("booking-2", "chat-9", json!({}), Utc::now() + Duration::hours(3))
        .await
        .unwrap();

    assert!(app.state.reminder_repo.find("booking-2", kinds::REMINDER_24H).await.unwrap().is_none());
    assert!(app.state.reminder_repo.find("booking-2", kinds::REMINDER_2H).await.unwrap().is_some());
}

#[tokio::test]
async fn test_booking_declined_cancels_reminders() {
    let app = TestApp::new().await;
    let svc = service(&app);

    svc.booking_confirmed("booking-3", "chat-9", json!({}), Utc::now() + Duration::hours(48))
        .await
        .unwrap();
    svc.booking_declined("booking-3", "chat-9", json!({})).await.unwrap();

    assert!(app.state.reminder_repo.find("booking-3", kinds::REMINDER_24H).await.unwrap().is_none());
    assert!(app.state.reminder_repo.find("booking-3", kinds::REMINDER_2H).await.unwrap().is_none());

    // only the confirmation and the decline reach the transport
    let mut worker = app.worker();
    worker.poll_cycle().await.unwrap();
    assert_eq!(app.transport.calls().len(), 2);

    let cancelled: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM intents WHERE status = 'cancelled'")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(cancelled, 2);
}

#[tokio::test]
async fn test_booking_rescheduled_moves_reminders() {
    let app = TestApp::new().await;
    let svc = service(&app);

    svc.booking_confirmed("booking-4", "chat-9", json!({}), Utc::now() + Duration::hours(48))
        .await
        .unwrap();

    let new_start = Utc::now() + Duration::hours(72);
    svc.booking_rescheduled("booking-4", "chat-9", json!({}), new_start).await.unwrap();

    let binding = app
        .state
        .reminder_repo
        .find("booking-4", kinds::REMINDER_24H)
        .await
        .unwrap()
        .expect("binding survives the reschedule");
    assert_eq!(
        binding.scheduled_at.timestamp(),
        (new_start - Duration::hours(24)).timestamp()
    );

    // no duplicate reminder intents were created
    let reminder_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM intents WHERE kind LIKE 'reminder-%'")
            .fetch_one(&app.pool)
            .await
            .unwrap();
    assert_eq!(reminder_count, 2);
}

#[tokio::test]
async fn test_reschedule_into_the_past_cancels_the_elapsed_reminder() {
    let app = TestApp::new().await;
    let svc = service(&app);

    svc.booking_confirmed("booking-5", "chat-9", json!({}), Utc::now() + Duration::hours(48))
        .await
        .unwrap();

    // moved to start in one hour: both reminder offsets are in the past
    svc.booking_rescheduled("booking-5", "chat-9", json!({}), Utc::now() + Duration::hours(1))
        .await
        .unwrap();

    assert!(app.state.reminder_repo.find("booking-5", kinds::REMINDER_24H).await.unwrap().is_none());
    assert!(app.state.reminder_repo.find("booking-5", kinds::REMINDER_2H).await.unwrap().is_none());
}

#[tokio::test]
async fn test_repeated_confirmation_does_not_duplicate_sends() {
    let app = TestApp::new().await;
    let svc = service(&app);
    let start_time = Utc::now() + Duration::hours(48);

    svc.booking_confirmed("booking-6", "chat-9", json!({}), start_time).await.unwrap();

    let mut worker = app.worker();
    worker.poll_cycle().await.unwrap();
    assert_eq!(app.transport.calls().len(), 1);

    // workflow retries the whole transition (crash between steps, double
    // click, queue replay): the confirmation key is already sent
    svc.booking_confirmed("booking-6", "chat-9", json!({}), start_time).await.unwrap();
    worker.poll_cycle().await.unwrap();
    assert_eq!(app.transport.calls().len(), 1);

    let sent: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM intents WHERE status = 'sent'")
        .fetch_one(&app.pool)
        .await
        .unwrap();
    assert_eq!(sent, 1);
}
