use crate::domain::models::receipt::DeliveryReceipt;
use crate::domain::ports::ReceiptRepository;
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresReceiptRepo {
    pool: PgPool,
}

impl PostgresReceiptRepo {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl ReceiptRepository for PostgresReceiptRepo {
    async fn confirm_delivery(&self, receipt: &DeliveryReceipt) -> Result<(), AppError> {
        // Receipt insert and status flip share one transaction, so a crash
        // between them re-observes the intent as not-yet-confirmed.
        let mut tx = self.pool.begin().await.map_err(AppError::Database)?;

        sqlx::query(
            "INSERT INTO delivery_receipts (id, key_hash, kind, subject_id, recipient_id, intent_id, correlation_id, delivered_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (key_hash) DO NOTHING"
        )
            .bind(&receipt.id)
            .bind(&receipt.key_hash)
            .bind(&receipt.kind)
            .bind(&receipt.subject_id)
            .bind(&receipt.recipient_id)
            .bind(&receipt.intent_id)
            .bind(&receipt.correlation_id)
            .bind(receipt.delivered_at)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        sqlx::query(
            "UPDATE intents SET status = 'sent', locked_at = NULL, next_retry_at = NULL \
             WHERE id = $1 AND status IN ('pending', 'in_flight')"
        )
            .bind(&receipt.intent_id)
            .execute(&mut *tx)
            .await
            .map_err(AppError::Database)?;

        tx.commit().await.map_err(AppError::Database)
    }

    async fn exists(&self, key_hash: &str) -> Result<bool, AppError> {
        sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM delivery_receipts WHERE key_hash = $1)")
            .bind(key_hash)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn count(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM delivery_receipts")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
