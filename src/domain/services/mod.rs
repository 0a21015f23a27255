pub mod backoff;
pub mod circuit_breaker;
pub mod notification_service;
pub mod rate_limit;
pub mod render;
pub mod scheduler;
