//! Startup configuration
//!
//! Everything is read from the environment once, in `main`. Missing
//! credentials are fatal: the server refuses to start rather than serving a
//! page that can never provision an agent.

use std::time::Duration;
use thiserror::Error;

/// Name of the search connection the agent's retrieval tool is bound to.
pub const SEARCH_CONNECTION_NAME: &str = "ragaisearch002";

/// Index queried through the search connection.
pub const SEARCH_INDEX_NAME: &str = "rag-1754502262882";

const DEFAULT_MODEL: &str = "gpt-4.1-mini";
const DEFAULT_AGENT_NAME: &str = "simple-agent";
const DEFAULT_INSTRUCTIONS: &str = "You are a helpful RAG based AI assistant. Provide clear, \
concise responses based on the azure AI search where files are uploaded in MS Fabric files \
section.so when user asked about the uploaded docs you are getting context from AI search and \
embedding models";

const DEFAULT_AUTHORITY_HOST: &str = "https://login.microsoftonline.com";
const DEFAULT_PORT: u16 = 8000;
const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Configuration errors detected at startup
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing one or more required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),
}

/// Credentials and endpoint of the AI project hosting the agent
#[derive(Clone)]
pub struct ProjectConfig {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub project_endpoint: String,
    /// Identity provider host used for the client-credentials exchange
    pub authority_host: String,
}

impl std::fmt::Debug for ProjectConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProjectConfig")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("project_endpoint", &self.project_endpoint)
            .field("authority_host", &self.authority_host)
            .finish()
    }
}

impl ProjectConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. All missing keys are reported at once.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut missing = Vec::new();
        let mut required = |key: &'static str| match lookup(key) {
            Some(value) if !value.trim().is_empty() => value,
            _ => {
                missing.push(key);
                String::new()
            }
        };

        let tenant_id = required("TENANT_ID");
        let client_id = required("CLIENT_ID");
        let client_secret = required("CLIENT_SECRET");
        let project_endpoint = required("PROJECT_ENDPOINT");

        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let authority_host = lookup("AZURE_AUTHORITY_HOST")
            .filter(|h| !h.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_AUTHORITY_HOST.to_string());

        Ok(Self {
            tenant_id,
            client_id,
            client_secret,
            project_endpoint: project_endpoint.trim_end_matches('/').to_string(),
            authority_host: authority_host.trim_end_matches('/').to_string(),
        })
    }
}

/// Fixed definition of the agent provisioned for every session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSpec {
    pub model: String,
    pub name: String,
    pub instructions: String,
    pub connection_name: String,
    pub index_name: String,
}

impl Default for AgentSpec {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            name: DEFAULT_AGENT_NAME.to_string(),
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            connection_name: SEARCH_CONNECTION_NAME.to_string(),
            index_name: SEARCH_INDEX_NAME.to_string(),
        }
    }
}

/// HTTP server settings
#[derive(Debug, Clone, Copy)]
pub struct ServerConfig {
    pub port: u16,
    /// Sessions with no open page and no requests for this long are ended
    pub session_idle: Duration,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("RAGCHAT_PORT")
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let idle_secs = lookup("RAGCHAT_SESSION_IDLE_SECS")
            .and_then(|s| s.parse().ok())
            .unwrap_or(DEFAULT_SESSION_IDLE_SECS);
        Self {
            port,
            session_idle: Duration::from_secs(idle_secs),
        }
    }
}
