use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::info;

use crate::domain::models::intent::{Intent, IntentStatus, NewIntent};
use crate::domain::models::reminder::ReminderBinding;
use crate::domain::ports::{IntentRepository, ReminderRepository};
use crate::error::AppError;

/// Result of a schedule/reschedule call. Never silent: a reminder whose
/// intent already reached a terminal state reports `AlreadyFinished`
/// instead of erroring, since the event-vs-fire race is expected.
#[derive(Debug)]
pub enum ScheduleOutcome {
    Scheduled(Intent),
    AlreadyFinished(Intent),
}

#[derive(Debug, PartialEq, Eq)]
pub enum CancelOutcome {
    Cancelled,
    /// The delivery attempt is already running; it is allowed to complete.
    InFlight,
    AlreadyFinished,
    NotScheduled,
}

/// Creates and tears down future-dated reminder intents in lockstep with a
/// booking's lifecycle. At most one active binding per `(subject_id, kind)`.
pub struct ReminderScheduler {
    intent_repo: Arc<dyn IntentRepository>,
    reminder_repo: Arc<dyn ReminderRepository>,
}

impl ReminderScheduler {
    pub fn new(intent_repo: Arc<dyn IntentRepository>, reminder_repo: Arc<dyn ReminderRepository>) -> Self {
        Self { intent_repo, reminder_repo }
    }

    pub async fn schedule(
        &self,
        subject_id: &str,
        kind: &str,
        recipient_id: &str,
        payload: Value,
        fire_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError> {
        let new = NewIntent::new(kind, subject_id, recipient_id, payload).not_before(fire_at);
        let intent = self.intent_repo.enqueue(&new).await?;

        // Enqueue is the single reuse-or-create path: a still-pending
        // reminder was just refreshed with the new fire time, a terminal one
        // came back unmodified and must not be resurrected.
        if matches!(intent.status, IntentStatus::Sent | IntentStatus::Failed) {
            info!(subject_id, kind, intent_id = %intent.id, "Reminder already finished, schedule is a no-op");
            return Ok(ScheduleOutcome::AlreadyFinished(intent));
        }

        let binding = ReminderBinding::new(subject_id, kind, recipient_id, fire_at, &intent.id);
        self.reminder_repo.upsert(&binding).await?;
        info!(subject_id, kind, intent_id = %intent.id, fire_at = %fire_at, "Reminder scheduled");
        Ok(ScheduleOutcome::Scheduled(intent))
    }

    /// Replaces the binding, keeping the recipient and payload of the prior
    /// intent. A reminder that already fired stands: the sent message is not
    /// un-sent and no new intent is created.
    pub async fn reschedule(
        &self,
        subject_id: &str,
        kind: &str,
        new_fire_at: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, AppError> {
        let binding = self
            .reminder_repo
            .find(subject_id, kind)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No reminder binding for {} / {}", subject_id, kind)))?;

        let prior = self
            .intent_repo
            .find_by_id(&binding.intent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Intent {} not found", binding.intent_id)))?;

        self.schedule(subject_id, kind, &binding.recipient_id, prior.payload.0.clone(), new_fire_at)
            .await
    }

    pub async fn cancel(&self, subject_id: &str, kind: &str) -> Result<CancelOutcome, AppError> {
        let Some(binding) = self.reminder_repo.find(subject_id, kind).await? else {
            return Ok(CancelOutcome::NotScheduled);
        };

        self.reminder_repo.delete(subject_id, kind).await?;

        if self.intent_repo.cancel_pending(&binding.intent_id).await? {
            info!(subject_id, kind, intent_id = %binding.intent_id, "Reminder cancelled");
            return Ok(CancelOutcome::Cancelled);
        }

        // Cancellation is advisory for anything already claimed or done.
        match self.intent_repo.find_by_id(&binding.intent_id).await? {
            Some(intent) if intent.status == IntentStatus::InFlight => {
                info!(subject_id, kind, intent_id = %binding.intent_id, "Reminder in flight, cancellation is advisory");
                Ok(CancelOutcome::InFlight)
            }
            _ => {
                info!(subject_id, kind, intent_id = %binding.intent_id, "Reminder already finished, cancel is a no-op");
                Ok(CancelOutcome::AlreadyFinished)
            }
        }
    }
}
