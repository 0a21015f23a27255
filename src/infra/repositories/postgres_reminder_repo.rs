use crate::domain::models::reminder::ReminderBinding;
use crate::domain::ports::ReminderRepository;
use crate::error::AppError;
use async_trait::async_trait;
use sqlx::PgPool;

pub struct PostgresReminderRepo {
    pool: PgPool,
}

impl PostgresReminderRepo {
    pub fn new(pool: PgPool) -> Self { Self { pool } }
}

#[async_trait]
impl ReminderRepository for PostgresReminderRepo {
    async fn find(&self, subject_id: &str, kind: &str) -> Result<Option<ReminderBinding>, AppError> {
        sqlx::query_as::<_, ReminderBinding>(
            "SELECT * FROM reminder_bindings WHERE subject_id = $1 AND kind = $2"
        )
            .bind(subject_id)
            .bind(kind)
            .fetch_optional(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn upsert(&self, binding: &ReminderBinding) -> Result<ReminderBinding, AppError> {
        sqlx::query_as::<_, ReminderBinding>(
            "INSERT INTO reminder_bindings (id, subject_id, kind, recipient_id, scheduled_at, intent_id, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7) \
             ON CONFLICT (subject_id, kind) DO UPDATE SET \
                recipient_id = excluded.recipient_id, \
                scheduled_at = excluded.scheduled_at, \
                intent_id = excluded.intent_id \
             RETURNING *"
        )
            .bind(&binding.id)
            .bind(&binding.subject_id)
            .bind(&binding.kind)
            .bind(&binding.recipient_id)
            .bind(binding.scheduled_at)
            .bind(&binding.intent_id)
            .bind(binding.created_at)
            .fetch_one(&self.pool)
            .await
            .map_err(AppError::Database)
    }

    async fn delete(&self, subject_id: &str, kind: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM reminder_bindings WHERE subject_id = $1 AND kind = $2")
            .bind(subject_id)
            .bind(kind)
            .execute(&self.pool)
            .await
            .map_err(AppError::Database)?;
        Ok(result.rows_affected() > 0)
    }
}
