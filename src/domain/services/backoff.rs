use rand::Rng;
use std::time::Duration;

/// Exponential backoff with equal jitter: delay doubles per attempt, capped
/// at `max`, then jittered into `[capped/2, capped]`. The lower bound of
/// attempt N+1 equals the upper bound of attempt N, so delays are
/// non-decreasing until the cap.
pub fn retry_delay(base: Duration, max: Duration, attempts: i32) -> Duration {
    let exp = attempts.clamp(0, 20);
    let raw = base.as_secs_f64() * 2f64.powi(exp);
    let capped = raw.min(max.as_secs_f64()).max(0.001);
    let jittered = rand::thread_rng().gen_range((capped / 2.0)..=capped);
    Duration::from_secs_f64(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delays_are_non_decreasing_until_cap() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(3600);
        let mut prev = Duration::ZERO;
        for attempt in 0..6 {
            let d = retry_delay(base, max, attempt);
            assert!(d >= prev, "attempt {} produced {:?} < {:?}", attempt, d, prev);
            // the next attempt's floor is this attempt's ceiling
            prev = Duration::from_secs_f64(base.as_secs_f64() * 2f64.powi(attempt) / 2.0);
        }
    }

    #[test]
    fn delay_never_exceeds_cap() {
        let base = Duration::from_secs(30);
        let max = Duration::from_secs(120);
        for attempt in 0..30 {
            assert!(retry_delay(base, max, attempt) <= max);
        }
    }
}
