use crate::domain::models::{
    intent::{Intent, NewIntent},
    message::{BrokerMessage, Envelope},
    receipt::DeliveryReceipt,
    reminder::ReminderBinding,
};
use crate::error::AppError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// The outbox. Single source of truth for "what must be sent"; mutated only
/// through these operations.
#[async_trait]
pub trait IntentRepository: Send + Sync {
    /// Single reuse-or-create path, idempotent per `(kind, subject_id,
    /// recipient_id)`. A `pending`/`in_flight`/`cancelled` row is refreshed
    /// and returned; a `sent`/`failed` row is returned unmodified. Safe
    /// under concurrent callers for the same key: the unique index decides
    /// the insert race and the loser re-reads the winner's row.
    async fn enqueue(&self, intent: &NewIntent) -> Result<Intent, AppError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<Intent>, AppError>;

    /// Atomically flips up to `limit` due pending rows to `in_flight`,
    /// stamping `locked_at` and counting the attempt. Also reclaims
    /// `in_flight` rows whose lock is older than `stale_before` (abandoned
    /// by a crashed worker).
    async fn claim_batch(&self, limit: i32, stale_before: DateTime<Utc>) -> Result<Vec<Intent>, AppError>;

    /// Claim a single row by id (broker-driven path). Returns `None` when
    /// the row is not claimable: terminal, not yet due, or freshly locked
    /// by another worker.
    async fn claim_one(&self, id: &str, stale_before: DateTime<Utc>) -> Result<Option<Intent>, AppError>;

    async fn mark_sent(&self, id: &str) -> Result<(), AppError>;
    /// Reschedules the row; clears `published_at` so the publisher
    /// re-mirrors it when it next becomes due.
    async fn mark_retry(&self, id: &str, next_retry_at: DateTime<Utc>) -> Result<(), AppError>;
    /// Terminal failure with an operator-readable reason.
    async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), AppError>;

    /// Cancels a still-pending row. Returns false when the row was already
    /// claimed or terminal (advisory cancellation, no preemption).
    async fn cancel_pending(&self, id: &str) -> Result<bool, AppError>;

    /// Publisher support: due pending rows not yet mirrored into the broker.
    async fn find_unpublished_due(&self, limit: i32) -> Result<Vec<Intent>, AppError>;
    async fn mark_published(&self, id: &str) -> Result<(), AppError>;
    /// Backlog drain: forget publishes older than the grace period so the
    /// rows are mirrored again. Recovers intents published while the broker
    /// was down; harmless when the broker still holds the message.
    async fn reset_stale_publishes(&self, older_than: DateTime<Utc>) -> Result<u64, AppError>;

    async fn count_backlog(&self) -> Result<i64, AppError>;
    async fn list_failed(&self, limit: i32) -> Result<Vec<Intent>, AppError>;
}

/// The idempotency ledger: proof-of-delivery store gating duplicate sends.
#[async_trait]
pub trait ReceiptRepository: Send + Sync {
    /// Records delivery and marks the intent `sent` in one transaction.
    /// Fully idempotent: the receipt insert is conflict-free and the status
    /// flip skips rows already terminal.
    async fn confirm_delivery(&self, receipt: &DeliveryReceipt) -> Result<(), AppError>;
    async fn exists(&self, key_hash: &str) -> Result<bool, AppError>;
    async fn count(&self) -> Result<i64, AppError>;
}

#[async_trait]
pub trait ReminderRepository: Send + Sync {
    async fn find(&self, subject_id: &str, kind: &str) -> Result<Option<ReminderBinding>, AppError>;
    /// Replaces any existing binding for `(subject_id, kind)`.
    async fn upsert(&self, binding: &ReminderBinding) -> Result<ReminderBinding, AppError>;
    async fn delete(&self, subject_id: &str, kind: &str) -> Result<bool, AppError>;
}

/// At-least-once queueing layer between intent creation and delivery.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Appends a message. Must fail fast when the backend is unreachable so
    /// the caller can fall back to the ledger path.
    async fn publish(&self, envelope: &Envelope) -> Result<(), AppError>;
    /// Claims up to `batch` messages for a consumer group member.
    /// Unacknowledged messages become visible again after `visibility`.
    async fn consume(&self, consumer: &str, batch: usize, visibility: Duration) -> Result<Vec<BrokerMessage>, AppError>;
    async fn ack(&self, message: &BrokerMessage) -> Result<(), AppError>;
    async fn dead_letter(&self, message: &BrokerMessage, reason: &str) -> Result<(), AppError>;
}

/// Outcome of one external send attempt. Classification is explicit so it
/// does not depend on any transport library's error hierarchy.
#[derive(Debug, Clone)]
pub enum SendOutcome {
    Delivered,
    Retryable { retry_after: Option<Duration>, reason: String },
    Permanent { reason: String },
}

/// Black-box external messaging API.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, recipient_id: &str, body: &str) -> SendOutcome;
}
