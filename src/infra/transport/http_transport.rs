use crate::domain::ports::{ChatTransport, SendOutcome};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use std::time::Duration;
use tracing::error;

/// HTTP client for the external messaging API. Classification of failures
/// happens here, against status codes, so the rest of the pipeline never
/// sees reqwest at all.
pub struct HttpChatTransport {
    client: Client,
    api_url: String,
    api_key: String,
}

impl HttpChatTransport {
    pub fn new(api_url: String, api_key: String, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self { client, api_url, api_key }
    }
}

#[derive(Serialize)]
struct MessagePayload<'a> {
    chat_id: &'a str,
    text: &'a str,
}

fn parse_retry_after(response: &reqwest::Response) -> Option<Duration> {
    response
        .headers()
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

#[async_trait]
impl ChatTransport for HttpChatTransport {
    async fn send(&self, recipient_id: &str, body: &str) -> SendOutcome {
        let payload = MessagePayload { chat_id: recipient_id, text: body };

        let response = match self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await
        {
            Ok(res) => res,
            Err(e) => {
                // network blip or timeout, worth retrying
                return SendOutcome::Retryable {
                    retry_after: None,
                    reason: format!("Chat API connection error: {}", e),
                };
            }
        };

        let status = response.status();
        if status.is_success() {
            return SendOutcome::Delivered;
        }

        if status == StatusCode::TOO_MANY_REQUESTS {
            let retry_after = parse_retry_after(&response);
            return SendOutcome::Retryable {
                retry_after,
                reason: "Chat API rate limit".to_string(),
            };
        }

        let text = response.text().await.unwrap_or_default();
        if status.is_client_error() {
            // invalid recipient, revoked authorization, rejected payload
            let reason = format!("Chat API rejected send. Status: {}, Body: {}", status, text);
            error!("{}", reason);
            return SendOutcome::Permanent { reason };
        }

        SendOutcome::Retryable {
            retry_after: None,
            reason: format!("Chat API failed. Status: {}, Body: {}", status, text),
        }
    }
}
