use anyhow::{Context, Result};
use serde::Deserialize;
use std::net::SocketAddr;
use std::path::Path;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    pub messenger: MessengerConfig,
    pub directory: DirectoryConfig,
    #[serde(default = "default_quote_config")]
    pub quote: QuoteConfig,
    #[serde(default = "default_branding_config")]
    pub branding: BrandingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct MessengerConfig {
    /// Shared secret the platform signs webhook bodies with
    #[serde(default)]
    pub app_secret: String,
    /// Token the platform echoes back during webhook subscription
    #[serde(default)]
    pub validation_token: String,
    #[serde(default)]
    pub page_access_token: String,
    /// Public URL of this service, used for images and the account-link page
    #[serde(default)]
    pub server_url: String,
    #[serde(default = "default_send_api_url")]
    pub send_api_url: String,
    /// Accept webhook deliveries that carry no signature header at all.
    /// Off by default; a present but wrong signature is always rejected.
    #[serde(default)]
    pub allow_unsigned: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    pub session_url: String,
    pub agents_url: String,
    #[serde(default = "default_product")]
    pub product: String,
    #[serde(default = "default_street_placeholder")]
    pub street_placeholder: String,
    #[serde(default = "default_zipcode")]
    pub default_zipcode: String,
    #[serde(default = "default_state")]
    pub default_state: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct QuoteConfig {
    #[serde(default = "default_amount")]
    pub default_amount: f64,
    #[serde(default = "default_monthly_rate")]
    pub monthly_rate: f64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct BrandingConfig {
    #[serde(default = "default_company_name")]
    pub company_name: String,
    #[serde(default = "default_website_url")]
    pub website_url: String,
    #[serde(default = "default_product_url")]
    pub product_url: String,
    #[serde(default = "default_support_phone")]
    pub support_phone: String,
    /// Path under `server_url` of the image used on quote and welcome cards
    #[serde(default = "default_hero_image")]
    pub hero_image: String,
    /// Fallback images for agent cards, by position
    #[serde(default = "default_agent_images")]
    pub agent_images: Vec<String>,
}

fn default_bind() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    5000
}

fn default_send_api_url() -> String {
    "https://graph.facebook.com/v2.6/me/messages".to_string()
}

fn default_product() -> String {
    "RENTERS".to_string()
}

fn default_street_placeholder() -> String {
    "sad".to_string()
}

fn default_zipcode() -> String {
    "60660".to_string()
}

fn default_state() -> String {
    "IL".to_string()
}

fn default_amount() -> f64 {
    6000.0
}

fn default_monthly_rate() -> f64 {
    0.00333
}

fn default_company_name() -> String {
    "Insurance Company".to_string()
}

fn default_website_url() -> String {
    "https://www.example.com/".to_string()
}

fn default_product_url() -> String {
    "https://www.example.com/auto-insurance".to_string()
}

fn default_support_phone() -> String {
    "+16505551234".to_string()
}

fn default_hero_image() -> String {
    "/assets/hero_large.jpg".to_string()
}

fn default_agent_images() -> Vec<String> {
    vec![
        "/assets/agent2.jpg".to_string(),
        "/assets/agent1.png".to_string(),
    ]
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        bind: default_bind(),
        port: default_port(),
    }
}

fn default_quote_config() -> QuoteConfig {
    QuoteConfig {
        default_amount: default_amount(),
        monthly_rate: default_monthly_rate(),
    }
}

fn default_branding_config() -> BrandingConfig {
    BrandingConfig {
        company_name: default_company_name(),
        website_url: default_website_url(),
        product_url: default_product_url(),
        support_phone: default_support_phone(),
        hero_image: default_hero_image(),
        agent_images: default_agent_images(),
    }
}

impl BrandingConfig {
    /// Fallback image for the agent card at `slot`, wrapping around the list.
    pub fn agent_image(&self, slot: usize) -> Option<&str> {
        if self.agent_images.is_empty() {
            return None;
        }
        Some(&self.agent_images[slot % self.agent_images.len()])
    }
}

impl Config {
    /// Absolute URL for an asset path served next to this service.
    pub fn asset_url(&self, path: &str) -> String {
        format!("{}{}", self.messenger.server_url.trim_end_matches('/'), path)
    }

    pub fn listen_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.server.bind, self.server.port)
            .parse()
            .with_context(|| {
                format!(
                    "Invalid listen address {}:{}",
                    self.server.bind, self.server.port
                )
            })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config = Self::parse(&content)?;
        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Secrets and the public URL may come from the environment instead of
    /// the file; a non-empty variable wins over the file value.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("MESSENGER_APP_SECRET") {
            self.messenger.app_secret = v;
        }
        if let Some(v) = get("MESSENGER_VALIDATION_TOKEN") {
            self.messenger.validation_token = v;
        }
        if let Some(v) = get("MESSENGER_PAGE_ACCESS_TOKEN") {
            self.messenger.page_access_token = v;
        }
        if let Some(v) = get("SERVER_URL") {
            self.messenger.server_url = v;
        }
        if let Some(v) = get("PORT") {
            self.server.port = v
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {}", v))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        let required = [
            ("messenger.app_secret", &self.messenger.app_secret),
            ("messenger.validation_token", &self.messenger.validation_token),
            ("messenger.page_access_token", &self.messenger.page_access_token),
            ("messenger.server_url", &self.messenger.server_url),
        ];
        let missing: Vec<&str> = required
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            anyhow::bail!("Missing config values: {}", missing.join(", "));
        }
        Ok(())
    }
}

#[cfg(test)]
pub(crate) fn test_config() -> Config {
    Config::parse(
        r#"
[messenger]
app_secret = "app-secret"
validation_token = "verify-me"
page_access_token = "page-token"
server_url = "https://bot.example.com"

[directory]
session_url = "http://127.0.0.1:9/session"
agents_url = "http://127.0.0.1:9/agents"
"#,
    )
    .unwrap()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults_applied() {
        let config = test_config();
        assert_eq!(config.server.port, 5000);
        assert_eq!(config.directory.product, "RENTERS");
        assert_eq!(config.directory.default_zipcode, "60660");
        assert_eq!(config.directory.default_state, "IL");
        assert_eq!(config.quote.default_amount, 6000.0);
        assert!(!config.messenger.allow_unsigned);
        assert!(config.messenger.send_api_url.ends_with("/me/messages"));
    }

    #[test]
    fn test_example_config_parses() {
        let config = Config::parse(include_str!("../config.example.toml")).unwrap();
        assert_eq!(config.branding.agent_images.len(), 2);
        // Secrets are left blank in the example
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides_win() {
        let mut config = test_config();
        let env: HashMap<&str, &str> = [
            ("MESSENGER_APP_SECRET", "from-env"),
            ("SERVER_URL", "https://other.example.com"),
            ("PORT", "8080"),
            ("MESSENGER_VALIDATION_TOKEN", ""),
        ]
        .into_iter()
        .collect();
        config
            .apply_env_overrides(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.messenger.app_secret, "from-env");
        assert_eq!(config.messenger.server_url, "https://other.example.com");
        assert_eq!(config.server.port, 8080);
        // Empty variables are ignored
        assert_eq!(config.messenger.validation_token, "verify-me");
    }

    #[test]
    fn test_bad_port_rejected() {
        let mut config = test_config();
        let result = config.apply_env_overrides(|k| (k == "PORT").then(|| "nope".to_string()));
        assert!(result.is_err());
    }

    #[test]
    fn test_missing_values_reported() {
        let mut config = test_config();
        config.messenger.page_access_token.clear();
        config.messenger.server_url = "  ".to_string();
        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("Missing config values"));
        assert!(err.contains("messenger.page_access_token"));
        assert!(err.contains("messenger.server_url"));
        assert!(!err.contains("app_secret"));
    }

    #[test]
    fn test_asset_url_joins_cleanly() {
        let mut config = test_config();
        config.messenger.server_url = "https://bot.example.com/".to_string();
        assert_eq!(
            config.asset_url("/assets/a.jpg"),
            "https://bot.example.com/assets/a.jpg"
        );
    }

    #[test]
    fn test_agent_image_wraps() {
        let config = test_config();
        assert_eq!(config.branding.agent_image(0), Some("/assets/agent2.jpg"));
        assert_eq!(config.branding.agent_image(2), Some("/assets/agent2.jpg"));
    }
}
