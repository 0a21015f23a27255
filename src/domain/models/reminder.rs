use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Binding between a booking and a future-dated reminder intent.
/// At most one active binding per `(subject_id, kind)`.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct ReminderBinding {
    pub id: String,
    pub subject_id: String,
    pub kind: String,
    pub recipient_id: String,
    pub scheduled_at: DateTime<Utc>,
    pub intent_id: String,
    pub created_at: DateTime<Utc>,
}

impl ReminderBinding {
    pub fn new(subject_id: &str, kind: &str, recipient_id: &str, scheduled_at: DateTime<Utc>, intent_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            subject_id: subject_id.to_string(),
            kind: kind.to_string(),
            recipient_id: recipient_id.to_string(),
            scheduled_at,
            intent_id: intent_id.to_string(),
            created_at: Utc::now(),
        }
    }
}
