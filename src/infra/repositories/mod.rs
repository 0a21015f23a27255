pub mod postgres_intent_repo;
pub mod postgres_receipt_repo;
pub mod postgres_reminder_repo;
pub mod sqlite_intent_repo;
pub mod sqlite_receipt_repo;
pub mod sqlite_reminder_repo;

/// 2067 = SQLite unique constraint, 23505 = PostgreSQL unique violation.
pub(crate) fn is_unique_violation(e: &sqlx::Error) -> bool {
    if let Some(db_err) = e.as_database_error() {
        let code = db_err.code().unwrap_or_default();
        return code == "2067" || code == "1555" || code == "23505";
    }
    false
}
