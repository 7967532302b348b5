//! Free-text and postback intent resolution.
//!
//! Text goes through an ordered list of keyword rules. Each rule whose
//! keyword appears in the lowercased text fires in turn: it may extract
//! parameters and it replaces the working command with its own token. The
//! rule that fires last therefore decides the command, regardless of where
//! the keywords sit in the text. The final command is then looked up in a
//! closed table; anything else is echoed back unchanged.

use tracing::debug;

use crate::config::Config;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentLocation {
    pub zipcode: String,
    pub state: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    Help,
    CustomerSupport,
    Generic,
    AccountLinking,
    LiveHelp,
    GotIt,
    AgentFinder,
    AgentLookup(AgentLocation),
    AgentList(AgentLocation),
    QuoteHelp,
    RenterQuote,
    PropertyType,
    AmountQuote { amount: f64 },
    PropertySelected,
    ContactInfoCorrect,
    ContactInfoIncorrect,
    Echo(String),
}

impl Intent {
    pub fn name(&self) -> &'static str {
        match self {
            Intent::Help => "help",
            Intent::CustomerSupport => "customer_support",
            Intent::Generic => "generic",
            Intent::AccountLinking => "account_linking",
            Intent::LiveHelp => "live_help",
            Intent::GotIt => "got_it",
            Intent::AgentFinder => "agent_finder",
            Intent::AgentLookup(_) => "agent_lookup",
            Intent::AgentList(_) => "agent_list",
            Intent::QuoteHelp => "quote_help",
            Intent::RenterQuote => "renter_quote",
            Intent::PropertyType => "property_type",
            Intent::AmountQuote { .. } => "amount_quote",
            Intent::PropertySelected => "property_selected",
            Intent::ContactInfoCorrect => "contact_info_correct",
            Intent::ContactInfoIncorrect => "contact_info_incorrect",
            Intent::Echo(_) => "echo",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Extract {
    None,
    Location,
    Amount,
}

struct Rule {
    keyword: &'static str,
    extract: Extract,
}

/// Applied in this order; see the module docs for why order matters.
const RULES: [Rule; 6] = [
    Rule { keyword: "zipcode", extract: Extract::Location },
    Rule { keyword: "agent", extract: Extract::None },
    Rule { keyword: "quote", extract: Extract::None },
    Rule { keyword: "renter", extract: Extract::None },
    Rule { keyword: "address", extract: Extract::None },
    Rule { keyword: "amount", extract: Extract::Amount },
];

/// Literal payloads of the buttons this service sends
pub const AGENT_FINDER_PAYLOAD: &str = "Allstate agent";
pub const CONTACT_CORRECT_PAYLOAD: &str = "ContactInfoCorrect";
pub const CONTACT_INCORRECT_PAYLOAD: &str = "ContactInfoIncorrect";

#[derive(Debug, Clone)]
pub struct IntentResolver {
    default_location: AgentLocation,
    default_amount: f64,
}

impl IntentResolver {
    pub fn new(default_location: AgentLocation, default_amount: f64) -> Self {
        Self {
            default_location,
            default_amount,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            AgentLocation {
                zipcode: config.directory.default_zipcode.clone(),
                state: config.directory.default_state.clone(),
            },
            config.quote.default_amount,
        )
    }

    pub fn resolve(&self, text: &str) -> Intent {
        let lowered = text.to_lowercase();
        let mut command = lowered.trim().to_string();
        let mut location = self.default_location.clone();
        let mut amount = self.default_amount;

        for rule in &RULES {
            if !lowered.contains(rule.keyword) {
                continue;
            }
            match rule.extract {
                Extract::None => {}
                Extract::Location => {
                    location = parse_location(text).unwrap_or_else(|| {
                        debug!("Unparseable location in {:?}, using default", text);
                        self.default_location.clone()
                    });
                }
                Extract::Amount => {
                    amount = parse_amount(&lowered).unwrap_or_else(|| {
                        debug!("Unparseable amount in {:?}, using default", text);
                        self.default_amount
                    });
                }
            }
            command = rule.keyword.to_string();
        }

        match command.as_str() {
            "user_defined_payload" | "hi" | "hello" => Intent::Help,
            "customer support" => Intent::CustomerSupport,
            "generic" => Intent::Generic,
            "account linking" => Intent::AccountLinking,
            "help" | "get live help" => Intent::LiveHelp,
            "got it" => Intent::GotIt,
            "agent" => Intent::AgentFinder,
            "zipcode" => Intent::AgentLookup(location),
            // Shadowed by the "agent" rule for free text, kept for parity
            // with the command table.
            "agents" => Intent::AgentList(location),
            "quote" => Intent::QuoteHelp,
            "renter" => Intent::RenterQuote,
            "address" => Intent::PropertyType,
            "amount" => Intent::AmountQuote { amount },
            _ => Intent::Echo(text.to_string()),
        }
    }
}

/// Postback payloads skip the keyword rules and match whole literals.
pub fn resolve_postback(payload: &str) -> Intent {
    match payload.trim().to_lowercase().as_str() {
        "user_defined_payload" => Intent::Help,
        "get live help" => Intent::LiveHelp,
        "got it" => Intent::GotIt,
        "allstate agent" => Intent::AgentFinder,
        "contactinfocorrect" => Intent::ContactInfoCorrect,
        "contactinfoincorrect" => Intent::ContactInfoIncorrect,
        "house" | "apartment" | "dorm" | "condo" => Intent::PropertySelected,
        _ => Intent::Echo(payload.to_string()),
    }
}

/// `zipcode:<zip>,state:<state>`; keys are case-insensitive, values keep
/// their spelling except the state, which is upper-cased.
fn parse_location(text: &str) -> Option<AgentLocation> {
    let (zip_part, state_part) = text.split_once(',')?;
    if state_part.contains(',') {
        return None;
    }
    let (zip_key, zipcode) = zip_part.split_once(':')?;
    let (state_key, state) = state_part.split_once(':')?;
    if !zip_key.trim().to_lowercase().ends_with("zipcode")
        || state_key.trim().to_lowercase() != "state"
    {
        return None;
    }
    let zipcode = zipcode.trim();
    let state = state.trim();
    if zipcode.is_empty() || state.is_empty() {
        return None;
    }
    Some(AgentLocation {
        zipcode: zipcode.to_string(),
        state: state.to_uppercase(),
    })
}

/// `amount:<number>` with exactly one colon. A leading `$` and thousands
/// separators are tolerated; the value must be finite and not negative.
fn parse_amount(lowered: &str) -> Option<f64> {
    let (_, value) = lowered.split_once(':')?;
    if value.contains(':') {
        return None;
    }
    let value = value.trim();
    let digits: String = value
        .strip_prefix('$')
        .unwrap_or(value)
        .trim_start()
        .chars()
        .filter(|c| *c != ',')
        .collect();
    digits
        .parse::<f64>()
        .ok()
        .filter(|amount| amount.is_finite() && *amount >= 0.0)
}
