use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;
use tracing::info;

use crate::domain::models::intent::{Intent, NewIntent};
use crate::domain::ports::IntentRepository;
use crate::domain::services::scheduler::ReminderScheduler;
use crate::error::AppError;

pub mod kinds {
    pub const BOOKING_CONFIRMED: &str = "booking-confirmed";
    pub const BOOKING_DECLINED: &str = "booking-declined";
    pub const BOOKING_RESCHEDULED: &str = "booking-rescheduled";
    pub const REMINDER_24H: &str = "reminder-24h";
    pub const REMINDER_2H: &str = "reminder-2h";
}

/// Facade the workflow module calls on booking lifecycle transitions. Each
/// call records intents durably; nothing here waits for the actual send.
pub struct NotificationService {
    intent_repo: Arc<dyn IntentRepository>,
    scheduler: ReminderScheduler,
}

impl NotificationService {
    pub fn new(intent_repo: Arc<dyn IntentRepository>, scheduler: ReminderScheduler) -> Self {
        Self { intent_repo, scheduler }
    }

    pub async fn enqueue(
        &self,
        kind: &str,
        subject_id: &str,
        recipient_id: &str,
        payload: Value,
    ) -> Result<Intent, AppError> {
        let intent = self
            .intent_repo
            .enqueue(&NewIntent::new(kind, subject_id, recipient_id, payload))
            .await?;
        info!(kind, subject_id, intent_id = %intent.id, correlation_id = %intent.correlation_id, "Intent recorded");
        Ok(intent)
    }

    /// Booking approved: confirmation now, reminders at T-24h and T-2h.
    /// Reminders whose fire time is already in the past are skipped.
    pub async fn booking_confirmed(
        &self,
        booking_id: &str,
        recipient_id: &str,
        payload: Value,
        start_time: DateTime<Utc>,
    ) -> Result<Intent, AppError> {
        let intent = self
            .enqueue(kinds::BOOKING_CONFIRMED, booking_id, recipient_id, payload.clone())
            .await?;

        let now = Utc::now();
        for (kind, offset) in [
            (kinds::REMINDER_24H, Duration::hours(24)),
            (kinds::REMINDER_2H, Duration::hours(2)),
        ] {
            let fire_at = start_time - offset;
            if fire_at > now {
                self.scheduler
                    .schedule(booking_id, kind, recipient_id, payload.clone(), fire_at)
                    .await?;
            }
        }

        Ok(intent)
    }

    pub async fn booking_declined(
        &self,
        booking_id: &str,
        recipient_id: &str,
        payload: Value,
    ) -> Result<Intent, AppError> {
        self.cancel_reminders(booking_id).await?;
        self.enqueue(kinds::BOOKING_DECLINED, booking_id, recipient_id, payload)
            .await
    }

    pub async fn booking_rescheduled(
        &self,
        booking_id: &str,
        recipient_id: &str,
        payload: Value,
        new_start_time: DateTime<Utc>,
    ) -> Result<Intent, AppError> {
        let intent = self
            .enqueue(kinds::BOOKING_RESCHEDULED, booking_id, recipient_id, payload.clone())
            .await?;

        let now = Utc::now();
        for (kind, offset) in [
            (kinds::REMINDER_24H, Duration::hours(24)),
            (kinds::REMINDER_2H, Duration::hours(2)),
        ] {
            let fire_at = new_start_time - offset;
            if fire_at > now {
                // schedule() replaces any existing binding for the key
                self.scheduler
                    .schedule(booking_id, kind, recipient_id, payload.clone(), fire_at)
                    .await?;
            } else {
                self.scheduler.cancel(booking_id, kind).await?;
            }
        }

        Ok(intent)
    }

    pub async fn cancel_reminders(&self, booking_id: &str) -> Result<(), AppError> {
        self.scheduler.cancel(booking_id, kinds::REMINDER_24H).await?;
        self.scheduler.cancel(booking_id, kinds::REMINDER_2H).await?;
        Ok(())
    }
}
