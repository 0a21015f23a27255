use std::time::Duration;
use tokio::time::Instant;

/// Pauses all sends after a streak of transient failures, so a degraded
/// external API is not hammered. Process-local, owned by the worker.
pub struct CircuitBreaker {
    threshold: u32,
    cooldown: Duration,
    streak: u32,
    open_until: Option<Instant>,
}

impl CircuitBreaker {
    pub fn new(threshold: u32, cooldown: Duration) -> Self {
        Self {
            threshold: threshold.max(1),
            cooldown,
            streak: 0,
            open_until: None,
        }
    }

    pub fn record_success(&mut self) {
        self.streak = 0;
        self.open_until = None;
    }

    /// Returns true when this failure opened the breaker.
    pub fn record_failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak >= self.threshold && self.open_until.is_none() {
            self.open_until = Some(Instant::now() + self.cooldown);
            return true;
        }
        false
    }

    pub fn is_open(&mut self) -> bool {
        match self.open_until {
            Some(until) if Instant::now() < until => true,
            Some(_) => {
                // cooldown elapsed, half-open: allow traffic again
                self.open_until = None;
                self.streak = 0;
                false
            }
            None => false,
        }
    }

    pub fn remaining(&self) -> Option<Duration> {
        self.open_until
            .map(|until| until.saturating_duration_since(Instant::now()))
    }
}
