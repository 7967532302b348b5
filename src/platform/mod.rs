//! Inbound webhook payloads and event classification.
//!
//! A delivery is a batch of page entries, each carrying messaging events.
//! Every event is assigned exactly one [`EventKind`] by the first significant
//! field it carries, in the order `optin`, `message`, `delivery`, `postback`,
//! `read`, `account_linking`.

use serde::Deserialize;
use tracing::{debug, warn};

/// The `object` value of batches this service handles.
pub const PAGE_OBJECT: &str = "page";

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookBatch {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<PageEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PageEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub time: i64,
    /// Decoded one by one in [`WebhookBatch::events`] so a single odd event
    /// does not sink the rest of the batch.
    #[serde(default)]
    pub messaging: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Participant {
    pub id: String,
}

/// One messaging event as it arrives on the wire
#[derive(Debug, Clone, Deserialize)]
pub struct RawEvent {
    pub sender: Option<Participant>,
    pub recipient: Option<Participant>,
    pub timestamp: Option<i64>,
    pub optin: Option<Optin>,
    pub message: Option<MessagePayload>,
    pub delivery: Option<DeliveryPayload>,
    pub postback: Option<PostbackPayload>,
    pub read: Option<ReadPayload>,
    pub account_linking: Option<AccountLinkPayload>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Optin {
    #[serde(rename = "ref")]
    pub reference: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct MessagePayload {
    pub mid: Option<String>,
    pub text: Option<String>,
    #[serde(default)]
    pub attachments: Vec<serde_json::Value>,
    pub quick_reply: Option<QuickReply>,
    #[serde(default)]
    pub is_echo: bool,
    pub app_id: Option<u64>,
    pub metadata: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct QuickReply {
    pub payload: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DeliveryPayload {
    #[serde(default)]
    pub mids: Vec<String>,
    #[serde(default)]
    pub watermark: i64,
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct PostbackPayload {
    #[serde(default)]
    pub payload: String,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ReadPayload {
    #[serde(default)]
    pub watermark: i64,
    pub seq: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AccountLinkPayload {
    #[serde(default)]
    pub status: String,
    pub authorization_code: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Authentication(Optin),
    Message(MessagePayload),
    Delivery(DeliveryPayload),
    Postback(PostbackPayload),
    Read(ReadPayload),
    AccountLink(AccountLinkPayload),
    Unknown,
}

impl EventKind {
    pub fn label(&self) -> &'static str {
        match self {
            EventKind::Authentication(_) => "authentication",
            EventKind::Message(_) => "message",
            EventKind::Delivery(_) => "delivery",
            EventKind::Postback(_) => "postback",
            EventKind::Read(_) => "read",
            EventKind::AccountLink(_) => "account_link",
            EventKind::Unknown => "unknown",
        }
    }
}

/// A classified messaging event, ready for routing
#[derive(Debug, Clone, PartialEq)]
pub struct InboundEvent {
    pub sender_id: String,
    pub recipient_id: String,
    pub timestamp: Option<i64>,
    pub kind: EventKind,
}

impl WebhookBatch {
    pub fn is_page(&self) -> bool {
        self.object == PAGE_OBJECT
    }

    /// Classify every event of every entry, in delivery order.
    /// Events without a sender cannot be answered and are dropped here.
    pub fn events(self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        for entry in self.entry {
            debug!(
                "Page entry {} at {} with {} event(s)",
                entry.id,
                entry.time,
                entry.messaging.len()
            );
            events.extend(
                entry
                    .messaging
                    .into_iter()
                    .filter_map(decode_event)
                    .filter_map(classify),
            );
        }
        events
    }
}

fn decode_event(value: serde_json::Value) -> Option<RawEvent> {
    match serde_json::from_value(value) {
        Ok(raw) => Some(raw),
        Err(e) => {
            warn!("Dropping malformed messaging event: {}", e);
            None
        }
    }
}

pub fn classify(raw: RawEvent) -> Option<InboundEvent> {
    let sender_id = match raw.sender {
        Some(sender) if !sender.id.is_empty() => sender.id,
        _ => {
            warn!("Dropping messaging event without a sender id");
            return None;
        }
    };
    let recipient_id = raw.recipient.map(|r| r.id).unwrap_or_default();

    let kind = if let Some(optin) = raw.optin {
        EventKind::Authentication(optin)
    } else if let Some(message) = raw.message {
        EventKind::Message(message)
    } else if let Some(delivery) = raw.delivery {
        EventKind::Delivery(delivery)
    } else if let Some(postback) = raw.postback {
        EventKind::Postback(postback)
    } else if let Some(read) = raw.read {
        EventKind::Read(read)
    } else if let Some(link) = raw.account_linking {
        EventKind::AccountLink(link)
    } else {
        EventKind::Unknown
    };

    Some(InboundEvent {
        sender_id,
        recipient_id,
        timestamp: raw.timestamp,
        kind,
    })
}
