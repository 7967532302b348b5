use serde_json::{json, Value};

pub const DEVELOPER_METADATA: &str = "DEVELOPER_DEFINED_METADATA";

#[derive(Debug, Clone, PartialEq)]
pub enum Button {
    Postback { title: String, payload: String },
    PhoneNumber { title: String, number: String },
    WebUrl { title: String, url: String },
    AccountLink { url: String },
}

impl Button {
    pub fn postback(title: &str, payload: &str) -> Self {
        Button::Postback {
            title: title.to_string(),
            payload: payload.to_string(),
        }
    }

    pub fn phone(title: &str, number: &str) -> Self {
        Button::PhoneNumber {
            title: title.to_string(),
            number: number.to_string(),
        }
    }

    pub fn web_url(title: &str, url: &str) -> Self {
        Button::WebUrl {
            title: title.to_string(),
            url: url.to_string(),
        }
    }

    fn to_wire(&self) -> Value {
        match self {
            Button::Postback { title, payload } => {
                json!({ "type": "postback", "title": title, "payload": payload })
            }
            Button::PhoneNumber { title, number } => {
                json!({ "type": "phone_number", "title": title, "payload": number })
            }
            Button::WebUrl { title, url } => {
                json!({ "type": "web_url", "url": url, "title": title })
            }
            Button::AccountLink { url } => json!({ "type": "account_link", "url": url }),
        }
    }
}

/// One element of a generic template
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Card {
    pub title: String,
    pub subtitle: Option<String>,
    pub item_url: Option<String>,
    pub image_url: Option<String>,
    pub buttons: Vec<Button>,
}

impl Card {
    fn to_wire(&self) -> Value {
        let mut element = json!({
            "title": self.title,
            "buttons": self.buttons.iter().map(Button::to_wire).collect::<Vec<_>>(),
        });
        if let Some(subtitle) = &self.subtitle {
            element["subtitle"] = json!(subtitle);
        }
        if let Some(item_url) = &self.item_url {
            element["item_url"] = json!(item_url);
        }
        if let Some(image_url) = &self.image_url {
            element["image_url"] = json!(image_url);
        }
        element
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text {
        text: String,
        metadata: Option<String>,
    },
    TypingOn,
    ButtonTemplate {
        text: String,
        buttons: Vec<Button>,
    },
    GenericTemplate {
        cards: Vec<Card>,
    },
}

/// A message addressed to one user, in Send API shape
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub recipient_id: String,
    pub content: Content,
}

impl OutboundMessage {
    pub fn text(recipient_id: &str, text: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            content: Content::Text {
                text: text.into(),
                metadata: None,
            },
        }
    }

    /// Text message tagged with the developer metadata marker
    pub fn tagged_text(recipient_id: &str, text: impl Into<String>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            content: Content::Text {
                text: text.into(),
                metadata: Some(DEVELOPER_METADATA.to_string()),
            },
        }
    }

    pub fn typing_on(recipient_id: &str) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            content: Content::TypingOn,
        }
    }

    pub fn buttons(recipient_id: &str, text: impl Into<String>, buttons: Vec<Button>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            content: Content::ButtonTemplate {
                text: text.into(),
                buttons,
            },
        }
    }

    pub fn cards(recipient_id: &str, cards: Vec<Card>) -> Self {
        Self {
            recipient_id: recipient_id.to_string(),
            content: Content::GenericTemplate { cards },
        }
    }

    /// Request body for the Send API
    pub fn to_wire(&self) -> Value {
        let recipient = json!({ "id": self.recipient_id });
        match &self.content {
            Content::Text { text, metadata } => {
                let mut message = json!({ "text": text });
                if let Some(metadata) = metadata {
                    message["metadata"] = json!(metadata);
                }
                json!({ "recipient": recipient, "message": message })
            }
            Content::TypingOn => json!({ "recipient": recipient, "sender_action": "typing_on" }),
            Content::ButtonTemplate { text, buttons } => json!({
                "recipient": recipient,
                "message": {
                    "attachment": {
                        "type": "template",
                        "payload": {
                            "template_type": "button",
                            "text": text,
                            "buttons": buttons.iter().map(Button::to_wire).collect::<Vec<_>>(),
                        }
                    }
                }
            }),
            Content::GenericTemplate { cards } => json!({
                "recipient": recipient,
                "message": {
                    "attachment": {
                        "type": "template",
                        "payload": {
                            "template_type": "generic",
                            "elements": cards.iter().map(Card::to_wire).collect::<Vec<_>>(),
                        }
                    }
                }
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_wire_shape() {
        let wire = OutboundMessage::tagged_text("user-1", "hello").to_wire();
        assert_eq!(
            wire,
            json!({
                "recipient": { "id": "user-1" },
                "message": { "text": "hello", "metadata": "DEVELOPER_DEFINED_METADATA" }
            })
        );
        let plain = OutboundMessage::text("user-1", "hello").to_wire();
        assert!(plain["message"].get("metadata").is_none());
    }

    #[test]
    fn test_typing_wire_shape() {
        let wire = OutboundMessage::typing_on("user-1").to_wire();
        assert_eq!(wire["sender_action"], "typing_on");
        assert!(wire.get("message").is_none());
    }

    #[test]
    fn test_button_template_wire_shape() {
        let wire = OutboundMessage::buttons(
            "user-1",
            "Pick one",
            vec![
                Button::postback("Yes", "YES"),
                Button::phone("Call", "+15550000"),
                Button::web_url("Open", "https://example.com"),
                Button::AccountLink {
                    url: "https://bot.example.com/authorize".to_string(),
                },
            ],
        )
        .to_wire();
        let payload = &wire["message"]["attachment"]["payload"];
        assert_eq!(wire["message"]["attachment"]["type"], "template");
        assert_eq!(payload["template_type"], "button");
        assert_eq!(payload["text"], "Pick one");
        let buttons = payload["buttons"].as_array().unwrap();
        assert_eq!(buttons[0], json!({ "type": "postback", "title": "Yes", "payload": "YES" }));
        assert_eq!(buttons[1]["type"], "phone_number");
        assert_eq!(buttons[1]["payload"], "+15550000");
        assert_eq!(buttons[2]["url"], "https://example.com");
        assert_eq!(buttons[3]["type"], "account_link");
    }

    #[test]
    fn test_generic_template_keeps_card_order_and_skips_empty_fields() {
        let wire = OutboundMessage::cards(
            "user-1",
            vec![
                Card {
                    title: "First".to_string(),
                    subtitle: Some("sub".to_string()),
                    image_url: Some("https://img/1".to_string()),
                    ..Default::default()
                },
                Card {
                    title: "Second".to_string(),
                    ..Default::default()
                },
            ],
        )
        .to_wire();
        let elements = wire["message"]["attachment"]["payload"]["elements"]
            .as_array()
            .unwrap();
        assert_eq!(elements.len(), 2);
        assert_eq!(elements[0]["title"], "First");
        assert_eq!(elements[0]["image_url"], "https://img/1");
        assert_eq!(elements[1]["title"], "Second");
        assert!(elements[1].get("subtitle").is_none());
        assert!(elements[1].get("item_url").is_none());
    }
}
