use crate::domain::models::intent::{Intent, NewIntent};
use crate::domain::ports::IntentRepository;
use crate::error::AppError;
use crate::infra::repositories::is_unique_violation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;
use uuid::Uuid;

pub struct SqliteIntentRepo {
    pool: SqlitePool,
}

impl SqliteIntentRepo {
    pub fn new(pool: SqlitePool) -> Self { Self { pool } }

    async fn find_by_key(&self, intent: &NewIntent) -> Result<Intent, AppError> {
        sqlx::query_as::<_, Intent>(
            "SELECT * FROM intents WHERE kind = ? AND subject_id = ? AND recipient_id = ?"
        )
            .bind(&intent.kind)
            .bind(&intent.subject_id)
            .bind(&intent.recipient_id)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    /// Distinguishes a missing row from a terminal one after a guarded
    /// UPDATE matched nothing. AlreadyTerminal is not fatal to callers.
    async fn explain_no_update(&self, id: &str) -> AppError {
        match self.find_by_id(id).await {
            Ok(Some(intent)) => AppError::AlreadyTerminal(format!(
                "Intent {} is {:?} and cannot be modified", id, intent.status
            )),
            Ok(None) => AppError::NotFound(format!("Intent {} not found", id)),
            Err(e) => e,
        }
    }
}

#[async_trait]
impl IntentRepository for SqliteIntentRepo {
    async fn enqueue(&self, intent: &NewIntent) -> Result<Intent, AppError> {
        // Insert first; the unique key index decides the create-vs-reuse race.
        let inserted = sqlx::query_as::<_, Intent>(
            "INSERT INTO intents (id, kind, subject_id, recipient_id, payload, status, attempts, correlation_id, created_at, next_retry_at) \
             VALUES (?, ?, ?, ?, ?, 'pending', 0, ?, ?, ?) RETURNING *"
        )
            .bind(Uuid::new_v4().to_string())
            .bind(&intent.kind)
            .bind(&intent.subject_id)
            .bind(&intent.recipient_id)
            .bind(Json(&intent.payload))
            .bind(&intent.correlation_id)
            .bind(Utc::now())
            .bind(intent.not_before)
            .fetch_one(&self.pool)
            .await;

        match inserted {
            Ok(row) => Ok(row),
            Err(e) if is_unique_violation(&e) => {
                // Reuse path: refresh a reusable row. Terminal rows must come
                // back unmodified, never resurrected to pending.
                let refreshed = sqlx::query_as::<_, Intent>(
                    "UPDATE intents SET payload = ?, attempts = 0, correlation_id = ?, last_error = NULL, \
                     locked_at = NULL, next_retry_at = ?, published_at = NULL, status = 'pending' \
                     WHERE kind = ? AND subject_id = ? AND recipient_id = ? \
                     AND status IN ('pending', 'in_flight', 'cancelled') RETURNING *"
                )
                    .bind(Json(&intent.payload))
                    .bind(&intent.correlation_id)
                    .bind(intent.not_before)
                    .bind(&intent.kind)
                    .bind(&intent.subject_id)
                    .bind(&intent.recipient_id)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(AppError::Database)?;

                match refreshed {
                    Some(row) => Ok(row),
                    None => self.find_by_key(intent).await,
                }
            }
            Err(e) => Err(AppError::Database(e)),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<Intent>, AppError> {
        sqlx::query_as::<_, Intent>("SELECT * FROM intents WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn claim_batch(&self, limit: i32, stale_before: DateTime<Utc>) -> Result<Vec<Intent>, AppError> {
        let now = Utc::now();
        sqlx::query_as::<_, Intent>(
            "UPDATE intents SET status = 'in_flight', attempts = attempts + 1, locked_at = ? \
             WHERE id IN ( \
                 SELECT id FROM intents \
                 WHERE (status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?)) \
                    OR (status = 'in_flight' AND locked_at <= ?) \
                 ORDER BY created_at ASC \
                 LIMIT ? \
             ) RETURNING *"
        )
            .bind(now)
            .bind(now)
            .bind(stale_before)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn claim_one(&self, id: &str, stale_before: DateTime<Utc>) -> Result<Option<Intent>, AppError> {
        let now = Utc::now();
        sqlx::query_as::<_, Intent>(
            "UPDATE intents SET status = 'in_flight', attempts = attempts + 1, locked_at = ? \
             WHERE id = ? \
             AND ((status = 'pending' AND (next_retry_at IS NULL OR next_retry_at <= ?)) \
               OR (status = 'in_flight' AND locked_at <= ?)) \
             RETURNING *"
        )
            .bind(now)
            .bind(id)
            .bind(now)
            .bind(stale_before)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn mark_sent(&self, id: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE intents SET status = 'sent', locked_at = NULL, next_retry_at = NULL \
             WHERE id = ? AND status IN ('pending', 'in_flight')"
        )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_no_update(id).await);
        }
        Ok(())
    }

    async fn mark_retry(&self, id: &str, next_retry_at: DateTime<Utc>) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE intents SET status = 'pending', locked_at = NULL, \
             next_retry_at = ?, published_at = NULL \
             WHERE id = ? AND status IN ('pending', 'in_flight')"
        )
            .bind(next_retry_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_no_update(id).await);
        }
        Ok(())
    }

    async fn mark_failed(&self, id: &str, reason: &str) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE intents SET status = 'failed', locked_at = NULL, \
             next_retry_at = NULL, last_error = ? \
             WHERE id = ? AND status IN ('pending', 'in_flight')"
        )
            .bind(reason)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;

        if result.rows_affected() == 0 {
            return Err(self.explain_no_update(id).await);
        }
        Ok(())
    }

    async fn cancel_pending(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query(
            "UPDATE intents SET status = 'cancelled', locked_at = NULL, next_retry_at = NULL, published_at = NULL \
             WHERE id = ? AND status = 'pending'"
        )
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }

    async fn find_unpublished_due(&self, limit: i32) -> Result<Vec<Intent>, AppError> {
        sqlx::query_as::<_, Intent>(
            "SELECT * FROM intents \
             WHERE status = 'pending' AND published_at IS NULL \
             AND (next_retry_at IS NULL OR next_retry_at <= ?) \
             ORDER BY created_at ASC LIMIT ?"
        )
            .bind(Utc::now())
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn mark_published(&self, id: &str) -> Result<(), AppError> {
        sqlx::query("UPDATE intents SET published_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(())
    }

    async fn reset_stale_publishes(&self, older_than: DateTime<Utc>) -> Result<u64, AppError> {
        let result = sqlx::query(
            "UPDATE intents SET published_at = NULL \
             WHERE status = 'pending' AND published_at IS NOT NULL AND published_at <= ?"
        )
            .bind(older_than)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected())
    }

    async fn count_backlog(&self) -> Result<i64, AppError> {
        sqlx::query_scalar("SELECT COUNT(*) FROM intents WHERE status IN ('pending', 'in_flight')")
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn list_failed(&self, limit: i32) -> Result<Vec<Intent>, AppError> {
        sqlx::query_as::<_, Intent>(
            "SELECT * FROM intents WHERE status = 'failed' ORDER BY created_at DESC LIMIT ?"
        )
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(AppError::Database)
    }
}
