use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, error, info};

use crate::config::MessengerConfig;
use crate::outbound::OutboundMessage;

/// What happened to one Send API call. Never retried or surfaced to users.
#[derive(Debug, Clone, PartialEq)]
pub enum DeliveryOutcome {
    Delivered {
        recipient_id: String,
        message_id: String,
    },
    /// The platform took the message but returned no message id
    Accepted { recipient_id: Option<String> },
    Failed { reason: String },
}

impl DeliveryOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self, DeliveryOutcome::Failed { .. })
    }
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    recipient_id: Option<String>,
    message_id: Option<String>,
}

#[async_trait]
pub trait SendApi: Send + Sync {
    async fn send(&self, message: &OutboundMessage) -> DeliveryOutcome;
}

pub struct SendGateway {
    client: reqwest::Client,
    url: String,
    access_token: String,
}

impl SendGateway {
    pub fn new(config: &MessengerConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: &MessengerConfig) -> Self {
        Self {
            client,
            url: config.send_api_url.clone(),
            access_token: config.page_access_token.clone(),
        }
    }

    async fn post(&self, message: &OutboundMessage) -> DeliveryOutcome {
        debug!("Calling Send API for recipient {}", message.recipient_id);

        let response = match self
            .client
            .post(&self.url)
            .query(&[("access_token", &self.access_token)])
            .json(&message.to_wire())
            .send()
            .await
        {
            Ok(r) => r,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    reason: format!("transport error: {}", e),
                }
            }
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                return DeliveryOutcome::Failed {
                    reason: format!("Send API response ({}) could not be read: {}", status, e),
                }
            }
        };
        if status != StatusCode::OK {
            return DeliveryOutcome::Failed {
                reason: format!("Send API error ({}): {}", status, body),
            };
        }

        match serde_json::from_str::<SendResponse>(&body) {
            Ok(SendResponse {
                recipient_id: Some(recipient_id),
                message_id: Some(message_id),
            }) => DeliveryOutcome::Delivered {
                recipient_id,
                message_id,
            },
            Ok(parsed) => DeliveryOutcome::Accepted {
                recipient_id: parsed.recipient_id,
            },
            Err(e) => DeliveryOutcome::Failed {
                reason: format!("unrecognized Send API response: {}", e),
            },
        }
    }
}

#[async_trait]
impl SendApi for SendGateway {
    async fn send(&self, message: &OutboundMessage) -> DeliveryOutcome {
        let outcome = self.post(message).await;
        match &outcome {
            DeliveryOutcome::Delivered {
                recipient_id,
                message_id,
            } => info!(
                "Successfully sent message with id {} to recipient {}",
                message_id, recipient_id
            ),
            DeliveryOutcome::Accepted { recipient_id } => info!(
                "Successfully called Send API for recipient {} (message id unknown)",
                recipient_id.as_deref().unwrap_or(&message.recipient_id)
            ),
            DeliveryOutcome::Failed { reason } => error!(
                "Failed calling Send API for recipient {}: {}",
                message.recipient_id, reason
            ),
        }
        outcome
    }
}
