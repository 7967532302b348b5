use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::compose::{Reply, ResponseComposer};
use crate::intent::{resolve_postback, IntentResolver};
use crate::outbound::OutboundMessage;
use crate::platform::{EventKind, InboundEvent, MessagePayload};
use crate::send::{DeliveryOutcome, SendApi};

/// Handles for the outbound work started by one webhook batch.
/// Dropping it leaves the tasks running; joining it collects their outcomes.
#[derive(Debug, Default)]
pub struct BatchReceipt {
    tasks: Vec<JoinHandle<Vec<DeliveryOutcome>>>,
}

impl BatchReceipt {
    /// Number of events that produced outbound work
    pub fn dispatched(&self) -> usize {
        self.tasks.len()
    }

    /// Wait for every task and return all outcomes, per event in send order.
    pub async fn join(self) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::new();
        for result in join_all(self.tasks).await {
            match result {
                Ok(event_outcomes) => outcomes.extend(event_outcomes),
                Err(e) => error!("Outbound task did not complete: {}", e),
            }
        }
        outcomes
    }

    pub async fn log_summary(self) {
        let tasks = self.dispatched();
        if tasks == 0 {
            return;
        }
        let outcomes = self.join().await;
        let failed = outcomes.iter().filter(|o| o.is_failure()).count();
        info!(
            "Batch finished: {} event(s), {} message(s) sent, {} failed",
            tasks,
            outcomes.len() - failed,
            failed
        );
    }
}

pub struct EventRouter {
    resolver: IntentResolver,
    composer: ResponseComposer,
    sender: Arc<dyn SendApi>,
}

impl EventRouter {
    pub fn new(
        resolver: IntentResolver,
        composer: ResponseComposer,
        sender: Arc<dyn SendApi>,
    ) -> Self {
        Self {
            resolver,
            composer,
            sender,
        }
    }

    /// Start outbound work for every event and return without waiting on it.
    /// Messages of one event go out strictly in order; separate events run
    /// independently.
    pub fn route_batch(self: &Arc<Self>, events: Vec<InboundEvent>) -> BatchReceipt {
        let mut receipt = BatchReceipt::default();
        for event in events {
            let Some(reply) = self.plan(&event) else {
                continue;
            };
            let router = Arc::clone(self);
            let recipient = event.sender_id;
            receipt
                .tasks
                .push(tokio::spawn(async move { router.deliver(&recipient, reply).await }));
        }
        receipt
    }

    async fn deliver(&self, recipient: &str, reply: Reply) -> Vec<DeliveryOutcome> {
        let mut outcomes = self.send_all(&reply.messages).await;
        if let Some(follow_up) = &reply.follow_up {
            let later = self.composer.complete(recipient, follow_up).await;
            outcomes.extend(self.send_all(&later).await);
        }
        outcomes
    }

    async fn send_all(&self, messages: &[OutboundMessage]) -> Vec<DeliveryOutcome> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for message in messages {
            outcomes.push(self.sender.send(message).await);
        }
        outcomes
    }

    /// Decide what, if anything, an event should be answered with.
    fn plan(&self, event: &InboundEvent) -> Option<Reply> {
        let sender = event.sender_id.as_str();
        let recipient = event.recipient_id.as_str();
        let at = describe_time(event.timestamp);
        debug!("Routing {} event from {}", event.kind.label(), sender);

        match &event.kind {
            EventKind::Authentication(optin) => {
                info!(
                    "Received authentication for user {} and page {} with pass through param '{}' at {}",
                    sender,
                    recipient,
                    optin.reference.as_deref().unwrap_or(""),
                    at
                );
                Some(Reply {
                    messages: vec![OutboundMessage::tagged_text(sender, "Authentication successful")],
                    follow_up: None,
                })
            }
            EventKind::Message(message) => {
                info!(
                    "Received message for user {} and page {} at {}",
                    sender, recipient, at
                );
                self.plan_message(sender, message)
            }
            EventKind::Delivery(delivery) => {
                for mid in &delivery.mids {
                    debug!("Received delivery confirmation for message ID: {}", mid);
                }
                info!(
                    "All messages before {} were delivered (sequence {})",
                    describe_time(Some(delivery.watermark)),
                    delivery.seq.unwrap_or_default()
                );
                None
            }
            EventKind::Postback(postback) => {
                info!(
                    "Received postback for user {} and page {} with payload '{}' ({}) at {}",
                    sender,
                    recipient,
                    postback.payload,
                    postback.title.as_deref().unwrap_or("untitled"),
                    at
                );
                let intent = resolve_postback(&postback.payload);
                Some(self.composer.compose(sender, &intent))
            }
            EventKind::Read(read) => {
                info!(
                    "Received message read event for watermark {} and sequence number {}",
                    describe_time(Some(read.watermark)),
                    read.seq.unwrap_or_default()
                );
                None
            }
            EventKind::AccountLink(link) => {
                info!(
                    "Received account link event for user {} with status {} and auth code {}",
                    sender,
                    link.status,
                    link.authorization_code.as_deref().unwrap_or("none")
                );
                None
            }
            EventKind::Unknown => {
                warn!("Webhook received unknown messaging event from {}", sender);
                None
            }
        }
    }

    fn plan_message(&self, sender: &str, message: &MessagePayload) -> Option<Reply> {
        let mid = message.mid.as_deref().unwrap_or("unknown");

        if message.is_echo {
            info!(
                "Received echo for message {} and app {} with metadata {}",
                mid,
                message.app_id.unwrap_or_default(),
                message.metadata.as_deref().unwrap_or("")
            );
            return None;
        }

        if let Some(quick_reply) = &message.quick_reply {
            info!(
                "Quick reply for message {} with payload {}",
                mid, quick_reply.payload
            );
            return Some(Reply {
                messages: vec![OutboundMessage::tagged_text(sender, "Quick reply tapped")],
                follow_up: None,
            });
        }

        if let Some(text) = message.text.as_deref().filter(|t| !t.is_empty()) {
            let intent = self.resolver.resolve(text);
            debug!("Message {} resolved to intent {}", mid, intent.name());
            return Some(self.composer.compose(sender, &intent));
        }

        if !message.attachments.is_empty() {
            return Some(Reply {
                messages: vec![OutboundMessage::tagged_text(
                    sender,
                    "Message with attachment received",
                )],
                follow_up: None,
            });
        }

        debug!("Message {} has neither text nor attachments", mid);
        None
    }
}

fn describe_time(millis: Option<i64>) -> String {
    millis
        .and_then(DateTime::<Utc>::from_timestamp_millis)
        .map(|t| t.to_rfc3339())
        .unwrap_or_else(|| "unknown time".to_string())
}
