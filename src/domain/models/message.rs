use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What the publisher appends to the broker. Ephemeral: losing it is safe
/// (the backlog drain recovers from the ledger), duplicating it is safe
/// (the delivery ledger absorbs it).
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Envelope {
    pub intent_id: String,
    pub correlation_id: String,
    pub enqueued_at: DateTime<Utc>,
}

impl Envelope {
    pub fn new(intent_id: &str, correlation_id: &str) -> Self {
        Self {
            intent_id: intent_id.to_string(),
            correlation_id: correlation_id.to_string(),
            enqueued_at: Utc::now(),
        }
    }
}

/// A claimed broker message plus backend delivery metadata.
#[derive(Debug, Clone)]
pub struct BrokerMessage {
    pub envelope: Envelope,
    /// Backend-specific id used to ack (stream entry id / queue ticket).
    pub delivery_id: String,
    pub redeliveries: u32,
}
