use crate::domain::models::message::{BrokerMessage, Envelope};
use crate::domain::ports::Broker;
use crate::error::AppError;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;
use tokio::time::Instant;

struct InFlightEntry {
    message: BrokerMessage,
    visible_at: Instant,
}

struct Inner {
    ready: VecDeque<BrokerMessage>,
    in_flight: HashMap<String, InFlightEntry>,
    dead: Vec<(BrokerMessage, String)>,
    next_id: u64,
}

/// In-memory FIFO used in development and tests. Not durable across
/// restarts; visibility timeouts still apply so an unacked message is
/// redelivered within the process.
pub struct InProcessBroker {
    inner: Mutex<Inner>,
}

impl InProcessBroker {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                ready: VecDeque::new(),
                in_flight: HashMap::new(),
                dead: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn dead_letters(&self) -> Vec<(BrokerMessage, String)> {
        self.inner.lock().unwrap().dead.clone()
    }

    pub fn depth(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.ready.len() + inner.in_flight.len()
    }
}

impl Default for InProcessBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for InProcessBroker {
    async fn publish(&self, envelope: &Envelope) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let delivery_id = inner.next_id.to_string();
        inner.ready.push_back(BrokerMessage {
            envelope: envelope.clone(),
            delivery_id,
            redeliveries: 0,
        });
        Ok(())
    }

    async fn consume(&self, _consumer: &str, batch: usize, visibility: Duration) -> Result<Vec<BrokerMessage>, AppError> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        // expired claims become visible again (simulated consumer crash)
        let expired: Vec<String> = inner
            .in_flight
            .iter()
            .filter(|(_, e)| e.visible_at <= now)
            .map(|(id, _)| id.clone())
            .collect();
        for id in expired {
            if let Some(mut entry) = inner.in_flight.remove(&id) {
                entry.message.redeliveries += 1;
                inner.ready.push_back(entry.message);
            }
        }

        let mut claimed = Vec::new();
        while claimed.len() < batch {
            let Some(message) = inner.ready.pop_front() else { break };
            inner.in_flight.insert(
                message.delivery_id.clone(),
                InFlightEntry {
                    message: message.clone(),
                    visible_at: now + visibility,
                },
            );
            claimed.push(message);
        }
        Ok(claimed)
    }

    async fn ack(&self, message: &BrokerMessage) -> Result<(), AppError> {
        self.inner.lock().unwrap().in_flight.remove(&message.delivery_id);
        Ok(())
    }

    async fn dead_letter(&self, message: &BrokerMessage, reason: &str) -> Result<(), AppError> {
        let mut inner = self.inner.lock().unwrap();
        inner.in_flight.remove(&message.delivery_id);
        inner.dead.push((message.clone(), reason.to_string()));
        Ok(())
    }
}
