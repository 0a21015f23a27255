use std::env;
use std::time::Duration;

#[derive(Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub chat_api_url: String,
    pub chat_api_token: String,
    /// Redis connection string for the persistent broker. When unset the
    /// pipeline runs on the in-process broker (development / degraded mode).
    pub broker_redis_url: Option<String>,
    pub consumer_group: String,
    /// Initial state of the pipeline switch. Can be flipped at runtime via
    /// the operational API.
    pub pipeline_enabled: bool,
    pub batch_size: i32,
    pub poll_interval: Duration,
    pub publish_interval: Duration,
    /// Token bucket: sustained sends per second and burst capacity.
    pub rate_limit_per_sec: f64,
    pub rate_limit_burst: u32,
    pub retry_base: Duration,
    pub retry_max: Duration,
    pub max_attempts: i32,
    pub breaker_threshold: u32,
    pub breaker_cooldown: Duration,
    /// An in_flight lock older than this is treated as abandoned.
    pub lock_staleness: Duration,
    /// Consecutive empty/unreachable broker cycles before direct-ledger fallback.
    pub fallback_after_cycles: u32,
    /// Pending rows older than this are republished by the backlog drain.
    pub publish_grace: Duration,
    pub send_timeout: Duration,
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            database_url: env::var("DATABASE_URL").expect("DATABASE_URL must be set"),
            port: env::var("PORT").unwrap_or_else(|_| "3000".to_string()).parse().expect("PORT must be a number"),
            chat_api_url: env::var("CHAT_API_URL").unwrap_or_else(|_| "http://localhost:8000/api/v1/messages".to_string()),
            chat_api_token: env::var("CHAT_API_TOKEN").unwrap_or_else(|_| "test-token-1".to_string()),
            broker_redis_url: env::var("BROKER_REDIS_URL").ok(),
            consumer_group: env::var("BROKER_CONSUMER_GROUP").unwrap_or_else(|_| "notify-workers".to_string()),
            pipeline_enabled: env::var("PIPELINE_ENABLED").map(|v| v != "false" && v != "0").unwrap_or(true),
            batch_size: env_u64("WORKER_BATCH_SIZE", 10) as i32,
            poll_interval: Duration::from_millis(env_u64("WORKER_POLL_INTERVAL_MS", 5000)),
            publish_interval: Duration::from_millis(env_u64("PUBLISH_INTERVAL_MS", 2000)),
            rate_limit_per_sec: env::var("RATE_LIMIT_PER_SEC").ok().and_then(|v| v.parse().ok()).unwrap_or(25.0),
            rate_limit_burst: env_u64("RATE_LIMIT_BURST", 25) as u32,
            retry_base: Duration::from_secs(env_u64("RETRY_BASE_SECS", 30)),
            retry_max: Duration::from_secs(env_u64("RETRY_MAX_SECS", 3600)),
            max_attempts: env_u64("MAX_ATTEMPTS", 8) as i32,
            breaker_threshold: env_u64("BREAKER_THRESHOLD", 5) as u32,
            breaker_cooldown: Duration::from_secs(env_u64("BREAKER_COOLDOWN_SECS", 60)),
            lock_staleness: Duration::from_secs(env_u64("LOCK_STALENESS_SECS", 300)),
            fallback_after_cycles: env_u64("FALLBACK_AFTER_CYCLES", 3) as u32,
            publish_grace: Duration::from_secs(env_u64("PUBLISH_GRACE_SECS", 10)),
            send_timeout: Duration::from_secs(env_u64("SEND_TIMEOUT_SECS", 15)),
        }
    }
}
