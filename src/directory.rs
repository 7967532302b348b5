//! Client for the external agent directory.
//!
//! A lookup is two calls in strict sequence: a bodiless GET that opens a
//! session and hands back a correlation token in a response header, then a
//! POST carrying that token plus the caller's location. Nothing is retried
//! or cached; every lookup does the full round trip.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::DirectoryConfig;
use crate::intent::AgentLocation;

/// Response header carrying the session correlation token
pub const SESSION_HEADER: &str = "x-tid";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AgentRecord {
    #[serde(default)]
    pub name: String,
    #[serde(rename = "imageURL")]
    pub image_url: Option<String>,
    #[serde(rename = "emailAddress", default)]
    pub email_address: String,
    #[serde(rename = "phoneNumber")]
    pub phone_number: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AgentListResponse {
    #[serde(default)]
    agents: Vec<AgentRecord>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AgentQuery<'a> {
    zip_code: &'a str,
    street: &'a str,
}

/// Opaque token from the session call. Consumed by exactly one query.
#[derive(Debug, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Error)]
pub enum DirectoryError {
    #[error("session request failed: {0}")]
    SessionTransport(#[source] reqwest::Error),
    #[error("session request returned {0}")]
    SessionStatus(StatusCode),
    #[error("session response had no x-tid header")]
    MissingSessionToken,
    #[error("agent query failed: {0}")]
    QueryTransport(#[source] reqwest::Error),
    #[error("agent query returned {0}")]
    QueryStatus(StatusCode),
    #[error("agent list could not be decoded: {0}")]
    Decode(#[source] reqwest::Error),
}

#[async_trait]
pub trait AgentDirectory: Send + Sync {
    async fn find_agents(&self, location: &AgentLocation)
        -> Result<Vec<AgentRecord>, DirectoryError>;
}

pub struct AgentDirectoryClient {
    client: reqwest::Client,
    config: DirectoryConfig,
}

impl AgentDirectoryClient {
    pub fn new(config: DirectoryConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(client: reqwest::Client, config: DirectoryConfig) -> Self {
        Self { client, config }
    }

    pub async fn open_session(&self) -> Result<SessionToken, DirectoryError> {
        debug!("Opening directory session: {}", self.config.session_url);

        let response = self
            .client
            .get(&self.config.session_url)
            .send()
            .await
            .map_err(DirectoryError::SessionTransport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DirectoryError::SessionStatus(status));
        }

        response
            .headers()
            .get(SESSION_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| SessionToken(v.to_string()))
            .ok_or(DirectoryError::MissingSessionToken)
    }

    pub async fn query_agents(
        &self,
        token: SessionToken,
        location: &AgentLocation,
    ) -> Result<Vec<AgentRecord>, DirectoryError> {
        let body = AgentQuery {
            zip_code: &location.zipcode,
            street: &self.config.street_placeholder,
        };

        let response = self
            .client
            .post(&self.config.agents_url)
            .header("X-SID", token.as_str())
            .header("X-TID", token.as_str())
            .header("X-ZP", &location.zipcode)
            .header("X-ST", &location.state)
            .header("X-PD", &self.config.product)
            .json(&body)
            .send()
            .await
            .map_err(DirectoryError::QueryTransport)?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(DirectoryError::QueryStatus(status));
        }

        let list: AgentListResponse = response.json().await.map_err(DirectoryError::Decode)?;
        Ok(list.agents)
    }
}

#[async_trait]
impl AgentDirectory for AgentDirectoryClient {
    async fn find_agents(
        &self,
        location: &AgentLocation,
    ) -> Result<Vec<AgentRecord>, DirectoryError> {
        let token = self.open_session().await.map_err(|e| {
            warn!("Directory session failed: {}", e);
            e
        })?;
        let agents = self.query_agents(token, location).await.map_err(|e| {
            warn!("Directory agent query failed: {}", e);
            e
        })?;
        info!(
            "Directory returned {} agent(s) for {} {}",
            agents.len(),
            location.zipcode,
            location.state
        );
        Ok(agents)
    }
}
