use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use sqlx::{postgres::{PgPoolOptions, PgConnectOptions}, sqlite::{SqlitePoolOptions, SqliteJournalMode, SqliteConnectOptions}};
use sqlx::{PgPool, SqlitePool, ConnectOptions};
use tracing::{info, warn};
use tracing::log::LevelFilter;

use crate::config::Config;
use crate::domain::ports::Broker;
use crate::domain::services::render::MessageRenderer;
use crate::infra::broker::in_process::InProcessBroker;
use crate::infra::broker::redis_stream::RedisStreamBroker;
use crate::infra::repositories::{
    postgres_intent_repo::PostgresIntentRepo, postgres_receipt_repo::PostgresReceiptRepo,
    postgres_reminder_repo::PostgresReminderRepo,
    sqlite_intent_repo::SqliteIntentRepo, sqlite_receipt_repo::SqliteReceiptRepo,
    sqlite_reminder_repo::SqliteReminderRepo,
};
use crate::infra::transport::http_transport::HttpChatTransport;
use crate::state::AppState;
use crate::stats::PipelineStats;

const INTENT_STREAM: &str = "notify:intents";

pub async fn bootstrap_state(config: &Config) -> AppState {
    let database_url = &config.database_url;

    let transport = Arc::new(HttpChatTransport::new(
        config.chat_api_url.clone(),
        config.chat_api_token.clone(),
        config.send_timeout,
    ));
    let renderer = Arc::new(MessageRenderer::with_default_templates());
    let stats = Arc::new(PipelineStats::new(config.pipeline_enabled));
    let broker = build_broker(config).await;

    if database_url.starts_with("postgres://") || database_url.starts_with("postgresql://") {
        info!("Initializing PostgreSQL connection...");

        let mut opts: PgConnectOptions = database_url.parse().expect("Invalid Postgres URL");
        opts = opts.log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect_with(opts)
            .await
            .expect("Failed to connect to Postgres");

        run_postgres_migrations(&pool).await;

        AppState {
            config: config.clone(),
            intent_repo: Arc::new(PostgresIntentRepo::new(pool.clone())),
            receipt_repo: Arc::new(PostgresReceiptRepo::new(pool.clone())),
            reminder_repo: Arc::new(PostgresReminderRepo::new(pool.clone())),
            broker,
            transport,
            renderer,
            stats,
        }
    } else {
        info!("Initializing SQLite connection with WAL Mode...");

        let opts = SqliteConnectOptions::from_str(database_url)
            .expect("Invalid SQLite connection string")
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5))
            .log_statements(LevelFilter::Debug)
            .log_slow_statements(LevelFilter::Warn, Duration::from_millis(500));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(opts)
            .await
            .expect("Failed to connect to SQLite");

        run_sqlite_migrations(&pool).await;

        AppState {
            config: config.clone(),
            intent_repo: Arc::new(SqliteIntentRepo::new(pool.clone())),
            receipt_repo: Arc::new(SqliteReceiptRepo::new(pool.clone())),
            reminder_repo: Arc::new(SqliteReminderRepo::new(pool.clone())),
            broker,
            transport,
            renderer,
            stats,
        }
    }
}

/// Redis Streams when configured, in-process queue otherwise. A Redis URL
/// that is configured but unreachable still yields the Redis broker: the
/// worker's fallback path covers the outage and recovery needs no restart.
async fn build_broker(config: &Config) -> Arc<dyn Broker> {
    match &config.broker_redis_url {
        Some(redis_url) => {
            info!("Initializing Redis Streams broker...");
            let redis_config = deadpool_redis::Config::from_url(redis_url);
            let pool = redis_config
                .create_pool(Some(deadpool_redis::Runtime::Tokio1))
                .expect("Invalid Redis broker configuration");

            let broker = RedisStreamBroker::new(pool, INTENT_STREAM, &config.consumer_group);
            if let Err(e) = broker.ensure_group().await {
                warn!("Consumer group not created, broker consume will fail over to the ledger until Redis is back: {:?}", e);
            }
            Arc::new(broker)
        }
        None => {
            info!("No BROKER_REDIS_URL set, using in-process broker");
            Arc::new(InProcessBroker::new())
        }
    }
}

async fn run_postgres_migrations(pool: &PgPool) {
    sqlx::migrate!("./migrations/postgres")
        .run(pool)
        .await
        .expect("Failed to run Postgres migrations");
}

async fn run_sqlite_migrations(pool: &SqlitePool) {
    sqlx::migrate!("./migrations/sqlite")
        .run(pool)
        .await
        .expect("Failed to run SQLite migrations");
}
