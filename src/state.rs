use std::sync::Arc;

use crate::config::Config;
use crate::domain::ports::{Broker, ChatTransport, IntentRepository, ReceiptRepository, ReminderRepository};
use crate::domain::services::render::MessageRenderer;
use crate::stats::PipelineStats;

#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub intent_repo: Arc<dyn IntentRepository>,
    pub receipt_repo: Arc<dyn ReceiptRepository>,
    pub reminder_repo: Arc<dyn ReminderRepository>,
    pub broker: Arc<dyn Broker>,
    pub transport: Arc<dyn ChatTransport>,
    pub renderer: Arc<MessageRenderer>,
    pub stats: Arc<PipelineStats>,
}
