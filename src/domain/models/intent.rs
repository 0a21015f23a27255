use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

/// Closed status set for an outbox intent. Exhaustive matches at every
/// transition site; the status string never travels as free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "intent_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    Pending,
    InFlight,
    Sent,
    Failed,
    Cancelled,
}

impl IntentStatus {
    /// Terminal rows are immutable: a `sent` or `failed` intent must never be
    /// resurrected to `pending`, that is the duplicate-send defect. A
    /// cancelled reminder may be re-enqueued (nothing was ever sent for it).
    pub fn is_terminal(&self) -> bool {
        matches!(self, IntentStatus::Sent | IntentStatus::Failed | IntentStatus::Cancelled)
    }

    pub fn is_reusable(&self) -> bool {
        matches!(self, IntentStatus::Pending | IntentStatus::InFlight | IntentStatus::Cancelled)
    }
}

/// Identity of a notification: one key, at most one effective external send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentKey {
    pub kind: String,
    pub subject_id: String,
    pub recipient_id: String,
}

impl IntentKey {
    pub fn new(kind: &str, subject_id: &str, recipient_id: &str) -> Self {
        Self {
            kind: kind.to_string(),
            subject_id: subject_id.to_string(),
            recipient_id: recipient_id.to_string(),
        }
    }

    /// Stable fingerprint used as the unique column of the delivery ledger.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.kind.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.subject_id.as_bytes());
        hasher.update(b"\x1f");
        hasher.update(self.recipient_id.as_bytes());
        hex::encode(hasher.finalize())
    }
}

/// Durable record of a send that must happen (outbox entry). The row is the
/// source of truth; broker messages are merely delivery hints.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct Intent {
    pub id: String,
    pub kind: String,
    pub subject_id: String,
    pub recipient_id: String,
    pub payload: Json<serde_json::Value>,
    pub status: IntentStatus,
    pub attempts: i32,
    pub correlation_id: String,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub locked_at: Option<DateTime<Utc>>,
    pub next_retry_at: Option<DateTime<Utc>>,
    pub published_at: Option<DateTime<Utc>>,
}

impl Intent {
    pub fn key(&self) -> IntentKey {
        IntentKey::new(&self.kind, &self.subject_id, &self.recipient_id)
    }
}

/// Enqueue parameters supplied by the workflow module.
#[derive(Debug, Clone)]
pub struct NewIntent {
    pub kind: String,
    pub subject_id: String,
    pub recipient_id: String,
    pub payload: serde_json::Value,
    pub correlation_id: String,
    /// Not-before timestamp for future-dated reminders; the claim query
    /// skips the row until it is due.
    pub not_before: Option<DateTime<Utc>>,
}

impl NewIntent {
    pub fn new(kind: &str, subject_id: &str, recipient_id: &str, payload: serde_json::Value) -> Self {
        Self {
            kind: kind.to_string(),
            subject_id: subject_id.to_string(),
            recipient_id: recipient_id.to_string(),
            payload,
            correlation_id: Uuid::new_v4().to_string(),
            not_before: None,
        }
    }

    pub fn not_before(mut self, at: DateTime<Utc>) -> Self {
        self.not_before = Some(at);
        self
    }

    pub fn key(&self) -> IntentKey {
        IntentKey::new(&self.kind, &self.subject_id, &self.recipient_id)
    }
}
