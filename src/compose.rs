//! Maps resolved intents to the messages sent back to the user.

use std::sync::Arc;

use tracing::{info, warn};

use crate::config::Config;
use crate::directory::{AgentDirectory, AgentRecord};
use crate::intent::{
    AgentLocation, Intent, AGENT_FINDER_PAYLOAD, CONTACT_CORRECT_PAYLOAD,
    CONTACT_INCORRECT_PAYLOAD,
};
use crate::outbound::{Button, Card, OutboundMessage};

/// Cards shown per agent list
const MAX_AGENT_CARDS: usize = 2;

/// Work that has to wait on the agent directory
#[derive(Debug, Clone, PartialEq)]
pub enum FollowUp {
    AgentList(AgentLocation),
}

/// Messages to send now, in order, and optionally more once a lookup ends
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Reply {
    pub messages: Vec<OutboundMessage>,
    pub follow_up: Option<FollowUp>,
}

impl Reply {
    fn now(messages: Vec<OutboundMessage>) -> Self {
        Self {
            messages,
            follow_up: None,
        }
    }
}

/// Monthly premium for a coverage amount
pub fn monthly_premium(amount: f64, rate: f64) -> f64 {
    amount * rate
}

/// Whole amounts print without cents, anything else with two places.
fn format_coverage(amount: f64) -> String {
    if amount.fract() == 0.0 {
        format!("{:.0}", amount)
    } else {
        format!("{:.2}", amount)
    }
}

pub fn quote_summary(amount: f64, rate: f64) -> String {
    format!(
        "${:.2}/Monthly\n${} Coverage",
        monthly_premium(amount, rate),
        format_coverage(amount)
    )
}

pub struct ResponseComposer {
    config: Arc<Config>,
    directory: Arc<dyn AgentDirectory>,
}

impl ResponseComposer {
    pub fn new(config: Arc<Config>, directory: Arc<dyn AgentDirectory>) -> Self {
        Self { config, directory }
    }

    pub fn compose(&self, recipient: &str, intent: &Intent) -> Reply {
        let brand = &self.config.branding;
        match intent {
            Intent::Help => Reply::now(vec![OutboundMessage::buttons(
                recipient,
                format!(
                    "Hi, I'm the {} assistant and I'm here to help \n\
                     To get started, simply select one of the menu options below or type a \
                     question or phrase. If you need any assistance at any time, just type 'help'",
                    brand.company_name
                ),
                vec![
                    Button::postback("Got it", "Got it"),
                    Button::postback("Get Live Help", "Get Live Help"),
                ],
            )]),
            Intent::CustomerSupport => Reply::now(vec![OutboundMessage::buttons(
                recipient,
                brand.company_name.clone(),
                vec![
                    Button::web_url("Open Web URL", &brand.website_url),
                    Button::phone("Call Phone Number", &brand.support_phone),
                ],
            )]),
            Intent::Generic => Reply::now(vec![self.generic_cards(recipient)]),
            Intent::AccountLinking => Reply::now(vec![OutboundMessage::buttons(
                recipient,
                "Welcome. Link your account.",
                vec![Button::AccountLink {
                    url: self.config.asset_url("/authorize"),
                }],
            )]),
            Intent::LiveHelp => Reply::now(vec![OutboundMessage::buttons(
                recipient,
                "No problem! Would you rather talk here through messenger or chat with \
                 someone over the phone?",
                vec![
                    Button::postback("Use Messenger", "Use Messenger"),
                    Button::phone("Call Customer Service", &brand.support_phone),
                ],
            )]),
            Intent::GotIt => Reply::now(vec![OutboundMessage::cards(
                recipient,
                vec![Card {
                    title: "Lets get started".to_string(),
                    subtitle: Some(
                        "Select one of the options below or type a message to begin".to_string(),
                    ),
                    image_url: Some(self.config.asset_url(&brand.hero_image)),
                    buttons: vec![Button::postback("Agent Finder", AGENT_FINDER_PAYLOAD)],
                    ..Default::default()
                }],
            )]),
            Intent::AgentFinder => Reply::now(vec![OutboundMessage::text(
                recipient,
                "Please enter your zip code and statecode, as 'zipcode:78745,state:IL'",
            )]),
            Intent::AgentLookup(location) => Reply {
                messages: vec![OutboundMessage::text(
                    recipient,
                    "Wait for a moment, finding agents near you",
                )],
                follow_up: Some(FollowUp::AgentList(location.clone())),
            },
            Intent::AgentList(location) => Reply {
                messages: Vec::new(),
                follow_up: Some(FollowUp::AgentList(location.clone())),
            },
            Intent::QuoteHelp => Reply::now(vec![OutboundMessage::tagged_text(
                recipient,
                "Okay! Which product do you want a quote for",
            )]),
            Intent::RenterQuote => Reply::now(vec![
                OutboundMessage::tagged_text(recipient, "starting your quote"),
                OutboundMessage::tagged_text(recipient, "Contact Info \nName: on file"),
                OutboundMessage::buttons(
                    recipient,
                    "Is this information accurate?",
                    vec![
                        Button::postback("Nope", CONTACT_INCORRECT_PAYLOAD),
                        Button::postback("Yes", CONTACT_CORRECT_PAYLOAD),
                    ],
                ),
            ]),
            Intent::PropertyType => Reply::now(vec![OutboundMessage::buttons(
                recipient,
                "What type of property is it?",
                vec![
                    Button::postback("House", "House"),
                    Button::postback("Apartment", "Apartment"),
                    Button::postback("Dorm", "Dorm"),
                ],
            )]),
            Intent::PropertySelected => Reply::now(vec![OutboundMessage::text(
                recipient,
                "Please enter the amount would you like to insure the content for, \
                 example Amount: 6000",
            )]),
            Intent::ContactInfoCorrect => Reply::now(vec![OutboundMessage::tagged_text(
                recipient,
                "OK, great now I need some info on where you currently live \n\
                 Please enter your current primary residence address",
            )]),
            Intent::ContactInfoIncorrect => Reply::now(vec![OutboundMessage::tagged_text(
                recipient,
                "No problem, please type your correct name and contact details",
            )]),
            Intent::AmountQuote { amount } => Reply::now(vec![
                OutboundMessage::text(recipient, "Great, thanks for all the info!"),
                OutboundMessage::typing_on(recipient),
                self.quote_card(recipient, *amount),
            ]),
            Intent::Echo(text) => {
                Reply::now(vec![OutboundMessage::tagged_text(recipient, text.clone())])
            }
        }
    }

    /// Run a follow-up lookup. Directory failures and empty results produce
    /// no messages; the user is never told about them.
    pub async fn complete(&self, recipient: &str, follow_up: &FollowUp) -> Vec<OutboundMessage> {
        match follow_up {
            FollowUp::AgentList(location) => self.agent_list(recipient, location).await,
        }
    }

    async fn agent_list(&self, recipient: &str, location: &AgentLocation) -> Vec<OutboundMessage> {
        let agents = match self.directory.find_agents(location).await {
            Ok(agents) => agents,
            Err(e) => {
                warn!(
                    "Agent lookup for {} {} failed, sending nothing: {}",
                    location.zipcode, location.state, e
                );
                return Vec::new();
            }
        };

        if agents.is_empty() {
            warn!(
                "Directory returned no agents for {} {}",
                location.zipcode, location.state
            );
            return Vec::new();
        }
        if agents.len() < MAX_AGENT_CARDS {
            info!("Only {} agent(s) found, sending a short list", agents.len());
        }

        let cards = agents
            .iter()
            .take(MAX_AGENT_CARDS)
            .enumerate()
            .map(|(slot, agent)| self.agent_card(slot, agent))
            .collect();
        vec![OutboundMessage::cards(recipient, cards)]
    }

    fn agent_card(&self, slot: usize, agent: &AgentRecord) -> Card {
        let brand = &self.config.branding;
        let image_url = agent
            .image_url
            .clone()
            .filter(|url| !url.is_empty())
            .or_else(|| brand.agent_image(slot).map(|p| self.config.asset_url(p)));
        let phone = agent
            .phone_number
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(&brand.support_phone);

        Card {
            title: agent.name.clone(),
            subtitle: Some(brand.company_name.clone()),
            item_url: Some(brand.website_url.clone()),
            image_url,
            buttons: vec![
                Button::phone("Call", phone),
                Button::postback("Email", &agent.email_address),
                Button::web_url("View Agent's Website", &brand.website_url),
            ],
        }
    }

    fn quote_card(&self, recipient: &str, amount: f64) -> OutboundMessage {
        OutboundMessage::cards(
            recipient,
            vec![Card {
                title: "Renter Insurance Quote".to_string(),
                subtitle: Some(quote_summary(amount, self.config.quote.monthly_rate)),
                image_url: Some(self.config.asset_url(&self.config.branding.hero_image)),
                buttons: vec![
                    Button::postback("Send to Agent", "Send to agent"),
                    Button::postback("Purchase", "Purchase"),
                ],
                ..Default::default()
            }],
        )
    }

    fn generic_cards(&self, recipient: &str) -> OutboundMessage {
        let brand = &self.config.branding;
        let image = self.config.asset_url(&brand.hero_image);
        OutboundMessage::cards(
            recipient,
            vec![
                Card {
                    title: brand.company_name.clone(),
                    subtitle: Some(brand.company_name.clone()),
                    item_url: Some(brand.website_url.clone()),
                    image_url: Some(image.clone()),
                    buttons: vec![
                        Button::web_url("Open Web URL", &brand.website_url),
                        Button::postback("Call Postback", "Payload for first bubble"),
                    ],
                },
                Card {
                    title: "Auto".to_string(),
                    subtitle: Some("Get Auto Insurance".to_string()),
                    item_url: Some(brand.product_url.clone()),
                    image_url: Some(image),
                    buttons: vec![
                        Button::web_url("Open Web URL", &brand.product_url),
                        Button::postback("Call Postback", "Payload for second bubble"),
                    ],
                },
            ],
        )
    }
}
