use notify_backend::{
    api::router::create_router,
    config::Config,
    domain::ports::{ChatTransport, SendOutcome},
    domain::services::render::MessageRenderer,
    domain::services::scheduler::ReminderScheduler,
    infra::broker::in_process::InProcessBroker,
    infra::repositories::{
        sqlite_intent_repo::SqliteIntentRepo, sqlite_receipt_repo::SqliteReceiptRepo,
        sqlite_reminder_repo::SqliteReminderRepo,
    },
    state::AppState,
    stats::PipelineStats,
    worker::DeliveryWorker,
};
use async_trait::async_trait;
use axum::Router;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use uuid::Uuid;

/// Transport with a scripted sequence of outcomes. Once the script runs dry
/// every send is `Delivered`, so tests only script the interesting part.
pub struct MockTransport {
    script: Mutex<VecDeque<SendOutcome>>,
    calls: Mutex<Vec<(String, String)>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn push_outcome(&self, outcome: SendOutcome) {
        self.script.lock().unwrap().push_back(outcome);
    }

    pub fn calls(&self) -> Vec<(String, String)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn send(&self, recipient_id: &str, body: &str) -> SendOutcome {
        self.calls
            .lock()
            .unwrap()
            .push((recipient_id.to_string(), body.to_string()));
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(SendOutcome::Delivered)
    }
}

#[allow(dead_code)]
pub struct TestApp {
    pub router: Router,
    pub pool: Pool<Sqlite>,
    pub db_filename: String,
    pub state: Arc<AppState>,
    pub transport: Arc<MockTransport>,
    pub broker: Arc<InProcessBroker>,
}

/// Pipeline knobs tuned for determinism: no jitter delay, no fallback
/// hysteresis, a breaker and limiter too generous to interfere. Tests that
/// exercise those controls override the relevant fields.
pub fn test_config(db_url: &str) -> Config {
    Config {
        database_url: db_url.to_string(),
        port: 0,
        chat_api_url: "http://localhost".to_string(),
        chat_api_token: "token".to_string(),
        broker_redis_url: None,
        consumer_group: "test-workers".to_string(),
        pipeline_enabled: true,
        batch_size: 10,
        poll_interval: Duration::from_millis(10),
        publish_interval: Duration::from_millis(10),
        rate_limit_per_sec: 10_000.0,
        rate_limit_burst: 10_000,
        retry_base: Duration::from_millis(0),
        retry_max: Duration::from_millis(0),
        max_attempts: 5,
        breaker_threshold: 1_000,
        breaker_cooldown: Duration::from_secs(60),
        lock_staleness: Duration::from_secs(300),
        fallback_after_cycles: 0,
        publish_grace: Duration::from_secs(10),
        send_timeout: Duration::from_secs(5),
    }
}

#[allow(dead_code)]
impl TestApp {
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    pub async fn with_config(adjust: impl FnOnce(&mut Config)) -> Self {
        let db_filename = format!("test_{}.db", Uuid::new_v4());
        let db_url = format!("sqlite://{}?mode=rwc", db_filename);

        let connection_options = SqliteConnectOptions::from_str(&db_url)
            .unwrap()
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .connect_with(connection_options)
            .await
            .expect("Failed to connect to test db");

        sqlx::migrate!("./migrations/sqlite")
            .run(&pool)
            .await
            .expect("Failed to migrate test db");

        let mut config = test_config(&db_url);
        adjust(&mut config);

        let transport = Arc::new(MockTransport::new());
        let broker = Arc::new(InProcessBroker::new());

        let state = Arc::new(AppState {
            config: config.clone(),
            intent_repo: Arc::new(SqliteIntentRepo::new(pool.clone())),
            receipt_repo: Arc::new(SqliteReceiptRepo::new(pool.clone())),
            reminder_repo: Arc::new(SqliteReminderRepo::new(pool.clone())),
            broker: broker.clone(),
            transport: transport.clone(),
            renderer: Arc::new(MessageRenderer::with_default_templates()),
            stats: Arc::new(PipelineStats::new(config.pipeline_enabled)),
        });

        let router = create_router(state.clone());

        Self {
            router,
            pool,
            db_filename,
            state,
            transport,
            broker,
        }
    }

    pub fn worker(&self) -> DeliveryWorker {
        DeliveryWorker::new(self.state.clone())
    }

    pub fn scheduler(&self) -> ReminderScheduler {
        ReminderScheduler::new(self.state.intent_repo.clone(), self.state.reminder_repo.clone())
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.db_filename);
    }
}
