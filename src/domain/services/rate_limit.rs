use std::time::Duration;
use tokio::time::Instant;

/// Process-local token bucket bounding the external send rate. Each worker
/// instance limits itself; under multi-instance deployment the effective
/// external rate is the sum across instances, so size the bucket accordingly.
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_per_sec: f64,
    last_refill: Instant,
}

impl TokenBucket {
    pub fn new(refill_per_sec: f64, burst: u32) -> Self {
        let capacity = burst.max(1) as f64;
        Self {
            capacity,
            tokens: capacity,
            refill_per_sec: refill_per_sec.max(0.001),
            last_refill: Instant::now(),
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        self.last_refill = now;
    }

    pub fn try_acquire(&mut self) -> bool {
        self.refill();
        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Waits until a token is available. The wait is bounded by the refill
    /// rate: at most `1 / refill_per_sec` seconds per call once drained.
    pub async fn acquire(&mut self) {
        loop {
            if self.try_acquire() {
                return;
            }
            let deficit = 1.0 - self.tokens;
            let wait = Duration::from_secs_f64(deficit / self.refill_per_sec);
            tokio::time::sleep(wait).await;
        }
    }
}
