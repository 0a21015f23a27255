use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::models::intent::Intent;
use crate::domain::models::message::BrokerMessage;
use crate::domain::models::receipt::DeliveryReceipt;
use crate::domain::ports::SendOutcome;
use crate::domain::services::backoff::retry_delay;
use crate::domain::services::circuit_breaker::CircuitBreaker;
use crate::domain::services::rate_limit::TokenBucket;
use crate::error::AppError;
use crate::state::AppState;
use crate::stats::DeliverySource;

/// The delivery worker. Owns its token bucket, circuit breaker and fallback
/// streak; constructed by the process entry point and passed into the loop,
/// no ambient state. Multiple instances may run against the same broker
/// group and ledger: per-row claims plus the receipt gate keep that correct.
pub struct DeliveryWorker {
    state: Arc<AppState>,
    limiter: TokenBucket,
    breaker: CircuitBreaker,
    consumer_name: String,
    empty_broker_cycles: u32,
}

impl DeliveryWorker {
    pub fn new(state: Arc<AppState>) -> Self {
        let config = &state.config;
        Self {
            limiter: TokenBucket::new(config.rate_limit_per_sec, config.rate_limit_burst),
            breaker: CircuitBreaker::new(config.breaker_threshold, config.breaker_cooldown),
            consumer_name: format!("worker-{}", Uuid::new_v4()),
            empty_broker_cycles: 0,
            state,
        }
    }

    pub async fn run(mut self) {
        info!(consumer = %self.consumer_name, "Starting delivery worker...");

        loop {
            if !self.state.stats.is_enabled() {
                sleep(self.state.config.poll_interval).await;
                continue;
            }

            if self.breaker.is_open() {
                if let Some(remaining) = self.breaker.remaining() {
                    warn!("Circuit breaker open, pausing sends for {:?}", remaining);
                    sleep(remaining).await;
                }
                continue;
            }

            if let Err(e) = self.poll_cycle().await {
                // Ledger down. Back off and retry the whole cycle; rows we
                // claimed but did not finish come back via stale-lock
                // reclamation rather than being dropped.
                error!("Poll cycle aborted: {:?}", e);
            }

            sleep(self.state.config.poll_interval).await;
        }
    }

    /// One full cycle: gather a batch (broker first, ledger fallback),
    /// update gauges, process each intent. Public so integration tests can
    /// drive the pipeline deterministically without the sleep loop.
    pub async fn poll_cycle(&mut self) -> Result<(), AppError> {
        let state = self.state.clone();
        let config = &state.config;
        let stale_before = Utc::now()
            - chrono::Duration::from_std(config.lock_staleness)
                .unwrap_or_else(|_| chrono::Duration::seconds(300));

        let mut batch: Vec<(Intent, Option<BrokerMessage>)> = Vec::new();

        match state
            .broker
            .consume(&self.consumer_name, config.batch_size as usize, config.lock_staleness)
            .await
        {
            Ok(messages) if messages.is_empty() => {
                self.empty_broker_cycles += 1;
            }
            Ok(messages) => {
                self.empty_broker_cycles = 0;
                self.switch_source(DeliverySource::Broker);
                for message in messages {
                    match state.intent_repo.claim_one(&message.envelope.intent_id, stale_before).await? {
                        Some(intent) => batch.push((intent, Some(message))),
                        None => {
                            // terminal, cancelled, or held by another worker;
                            // the ledger is authoritative, the hint is spent
                            if let Err(e) = state.broker.ack(&message).await {
                                warn!("Failed to ack stale broker message: {:?}", e);
                            }
                        }
                    }
                }
            }
            Err(e) => {
                // infrastructure, not per-intent: go straight to fallback
                self.empty_broker_cycles = self.empty_broker_cycles.max(config.fallback_after_cycles);
                if self.switch_source(DeliverySource::Fallback) {
                    warn!("Broker unreachable, switching to ledger fallback: {:?}", e);
                }
            }
        }

        if self.empty_broker_cycles >= config.fallback_after_cycles {
            let claimed = state.intent_repo.claim_batch(config.batch_size, stale_before).await?;
            if !claimed.is_empty() && self.switch_source(DeliverySource::Fallback) {
                info!("Broker idle for {} cycles, claiming directly from ledger", self.empty_broker_cycles);
            }
            for intent in claimed {
                batch.push((intent, None));
            }
        }

        state.stats.record_poll();

        for (intent, message) in batch {
            let span = info_span!(
                "delivery",
                intent_id = %intent.id,
                kind = %intent.kind,
                correlation_id = %intent.correlation_id,
            );
            self.process(intent, message).instrument(span).await?;
        }

        if let Ok(depth) = state.intent_repo.count_backlog().await {
            state.stats.set_queue_depth(depth);
        }

        Ok(())
    }

    /// One intent, outcome isolated from the rest of the batch. Only ledger
    /// failures propagate. The broker message is acked strictly after the
    /// ledger write (ack-after-commit), so a crash in between yields
    /// redelivery, which the receipt gate turns into a no-op.
    async fn process(&mut self, intent: Intent, message: Option<BrokerMessage>) -> Result<(), AppError> {
        let state = self.state.clone();
        let config = &state.config;

        // duplicate-send gate: a receipt means some worker already delivered
        // this key; redelivered queue messages end here
        if state.receipt_repo.exists(&intent.key().fingerprint()).await? {
            info!("Delivery already confirmed, skipping transport call");
            self.tolerate_terminal(state.intent_repo.mark_sent(&intent.id).await)?;
            self.ack(message.as_ref()).await;
            return Ok(());
        }

        if self.breaker.is_open() {
            // opened mid-batch: leave the row in_flight and the message
            // unacked; visibility timeout and stale-lock reclaim re-surface
            // it after the cooldown
            return Ok(());
        }

        self.limiter.acquire().await;

        let body = state.renderer.render(&intent.kind, &intent.payload.0);
        let outcome = state.transport.send(&intent.recipient_id, &body).await;

        match outcome {
            SendOutcome::Delivered => {
                self.breaker.record_success();
                let receipt = DeliveryReceipt::for_intent(&intent);
                state.receipt_repo.confirm_delivery(&receipt).await?;
                state.stats.record_sent(&intent.kind);
                info!(attempts = intent.attempts, "Message delivered");
                self.ack(message.as_ref()).await;
            }
            SendOutcome::Retryable { retry_after, reason } => {
                if self.breaker.record_failure() {
                    warn!(
                        "Transient failure streak reached {}, opening circuit breaker for {:?}",
                        config.breaker_threshold, config.breaker_cooldown
                    );
                }

                if intent.attempts >= config.max_attempts {
                    warn!(attempts = intent.attempts, "Attempt ceiling reached, escalating to permanent");
                    self.fail(&intent, &format!("Retries exhausted: {}", reason), message.as_ref()).await?;
                } else {
                    let delay = retry_after.unwrap_or_else(|| {
                        retry_delay(config.retry_base, config.retry_max, intent.attempts - 1)
                    });
                    let next_retry_at = Utc::now()
                        + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::seconds(30));
                    warn!(attempts = intent.attempts, "Transient failure, retrying in {:?}: {}", delay, reason);
                    self.tolerate_terminal(state.intent_repo.mark_retry(&intent.id, next_retry_at).await)?;
                    self.ack(message.as_ref()).await;
                }
            }
            SendOutcome::Permanent { reason } => {
                error!("Permanent failure: {}", reason);
                self.fail(&intent, &reason, message.as_ref()).await?;
            }
        }

        Ok(())
    }

    async fn fail(&self, intent: &Intent, reason: &str, message: Option<&BrokerMessage>) -> Result<(), AppError> {
        self.tolerate_terminal(self.state.intent_repo.mark_failed(&intent.id, reason).await)?;
        self.state.stats.record_failed(&intent.kind);
        self.state.stats.record_dead_letter();
        if let Some(message) = message {
            if let Err(e) = self.state.broker.dead_letter(message, reason).await {
                warn!("Failed to dead-letter broker message: {:?}", e);
            }
        }
        Ok(())
    }

    /// A duplicate completion racing another worker is expected, not fatal.
    fn tolerate_terminal(&self, result: Result<(), AppError>) -> Result<(), AppError> {
        match result {
            Ok(()) => Ok(()),
            Err(AppError::AlreadyTerminal(msg)) => {
                info!("{}", msg);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    async fn ack(&self, message: Option<&BrokerMessage>) {
        if let Some(message) = message {
            if let Err(e) = self.state.broker.ack(message).await {
                // redelivery is absorbed by the receipt gate
                warn!("Failed to ack broker message {}: {:?}", message.delivery_id, e);
            }
        }
    }

    fn switch_source(&mut self, source: DeliverySource) -> bool {
        self.state.stats.set_source(source)
    }
}
