use std::sync::Arc;

use chrono::Utc;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::domain::models::message::Envelope;
use crate::state::AppState;

/// Mirrors due ledger rows into the broker. The ledger write in `enqueue`
/// already durably accepted the intent, so a publish failure here loses
/// nothing: the row stays pending and unpublished until the broker is back.
pub struct IntentPublisher {
    state: Arc<AppState>,
    broker_down: bool,
}

impl IntentPublisher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state, broker_down: false }
    }

    pub async fn run(mut self) {
        info!("Starting intent publisher...");

        match self.drain_backlog().await {
            Ok(0) => {}
            Ok(n) => info!("Requeued {} stale published intents for mirroring", n),
            Err(e) => error!("Failed to reset stale publishes: {:?}", e),
        }

        loop {
            if let Err(e) = self.publish_cycle().await {
                error!("Publish cycle aborted: {:?}", e);
            }
            sleep(self.state.config.publish_interval).await;
        }
    }

    /// Startup recovery. Rows published before a crash may never have
    /// reached the broker, or reached it and been lost with the backend.
    /// Forget old publish stamps so those rows are mirrored again;
    /// duplicates collapse on the delivery side.
    pub async fn drain_backlog(&self) -> Result<u64, crate::error::AppError> {
        let grace_cutoff = Utc::now()
            - chrono::Duration::from_std(self.state.config.publish_grace)
                .unwrap_or_else(|_| chrono::Duration::minutes(10));
        self.state.intent_repo.reset_stale_publishes(grace_cutoff).await
    }

    /// Mirrors one batch of due, not-yet-published rows. Public so tests can
    /// drive the outbox deterministically without the sleep loop.
    pub async fn publish_cycle(&mut self) -> Result<(), crate::error::AppError> {
        let state = &self.state;
        let due = state.intent_repo.find_unpublished_due(state.config.batch_size).await?;

        for intent in due {
            let envelope = Envelope::new(&intent.id, &intent.correlation_id);
            match state.broker.publish(&envelope).await {
                Ok(()) => {
                    if self.broker_down {
                        self.broker_down = false;
                        info!("Broker reachable again, resuming mirroring");
                    }
                    state.intent_repo.mark_published(&intent.id).await?;
                }
                Err(e) => {
                    // log the transition once, not every cycle
                    if !self.broker_down {
                        self.broker_down = true;
                        warn!("Broker publish failed, rows stay pending for fallback delivery: {:?}", e);
                    }
                    break;
                }
            }
        }

        Ok(())
    }
}
