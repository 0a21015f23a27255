use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::intent::Intent;

/// Proof-of-delivery record. Written exactly once per idempotency key, in
/// the same transaction that marks the intent `sent`. Its presence is the
/// authority that a redelivered broker message must not be re-sent.
#[derive(Debug, Serialize, Deserialize, FromRow, Clone)]
pub struct DeliveryReceipt {
    pub id: String,
    pub key_hash: String,
    pub kind: String,
    pub subject_id: String,
    pub recipient_id: String,
    pub intent_id: String,
    pub correlation_id: String,
    pub delivered_at: DateTime<Utc>,
}

impl DeliveryReceipt {
    pub fn for_intent(intent: &Intent) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            key_hash: intent.key().fingerprint(),
            kind: intent.kind.clone(),
            subject_id: intent.subject_id.clone(),
            recipient_id: intent.recipient_id.clone(),
            intent_id: intent.id.clone(),
            correlation_id: intent.correlation_id.clone(),
            delivered_at: Utc::now(),
        }
    }
}
