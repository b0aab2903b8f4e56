//! HTTP implementation of the agents API
//!
//! Authentication is an OAuth2 client-credentials exchange against the
//! tenant's identity provider; the bearer token is cached and reused until
//! shortly before it expires.

use super::types::{
    Agent, Connection, CreateAgentRequest, ListOrder, ListResponse, MessageRole, Run, RunStatus,
    Thread, ThreadMessage,
};
use super::{AgentProvider, ProviderError};
use crate::config::ProjectConfig;
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const API_VERSION: &str = "v1";
const TOKEN_SCOPE: &str = "https://ai.azure.com/.default";
/// Tokens are refreshed this long before the identity provider says they expire
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Clone)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

/// Agents API client bound to one project
pub struct HttpAgentProvider {
    client: Client,
    config: ProjectConfig,
    token_cache: Mutex<Option<CachedToken>>,
    poll_interval: Duration,
}

impl HttpAgentProvider {
    pub fn new(config: ProjectConfig) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| ProviderError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            config,
            token_cache: Mutex::new(None),
            poll_interval: DEFAULT_POLL_INTERVAL,
        })
    }

    fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.config.authority_host, self.config.tenant_id
        )
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.project_endpoint,
            path.trim_start_matches('/')
        )
    }

    fn cached_token(&self) -> Option<String> {
        let cache = self
            .token_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        cache
            .as_ref()
            .filter(|cached| Instant::now() < cached.expires_at)
            .map(|cached| cached.token.clone())
    }

    async fn fetch_token(&self) -> Result<String, ProviderError> {
        tracing::debug!(tenant = %self.config.tenant_id, "Requesting access token");

        let response = self
            .client
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.config.client_id.as_str()),
                ("client_secret", self.config.client_secret.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await
            .map_err(|e| ProviderError::network(format!("Token request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::auth(format!(
                "Authentication failed (HTTP {}): {body}",
                status.as_u16()
            )));
        }

        let parsed: TokenResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::decode(format!("Invalid token response: {e}")))?;

        let lifetime = Duration::from_secs(parsed.expires_in).saturating_sub(TOKEN_EXPIRY_MARGIN);
        let mut cache = self
            .token_cache
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *cache = Some(CachedToken {
            token: parsed.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(parsed.access_token)
    }

    async fn bearer(&self) -> Result<String, ProviderError> {
        match self.cached_token() {
            Some(token) => Ok(token),
            None => self.fetch_token().await,
        }
    }

    async fn execute(&self, builder: RequestBuilder) -> Result<reqwest::Response, ProviderError> {
        let token = self.bearer().await?;
        let response = builder
            .bearer_auth(token)
            .query(&[("api-version", API_VERSION)])
            .send()
            .await
            .map_err(|e| ProviderError::network(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(response)
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(ProviderError::from_status(status.as_u16(), &body))
        }
    }

    async fn execute_json<T: DeserializeOwned>(
        &self,
        builder: RequestBuilder,
    ) -> Result<T, ProviderError> {
        self.execute(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ProviderError::decode(e.to_string()))
    }

    async fn get_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ProviderError> {
        let url = self.url(&format!("threads/{thread_id}/runs/{run_id}"));
        self.execute_json(self.client.get(url)).await
    }

    async fn cancel_run(&self, thread_id: &str, run_id: &str) -> Result<Run, ProviderError> {
        let url = self.url(&format!("threads/{thread_id}/runs/{run_id}/cancel"));
        self.execute_json(self.client.post(url)).await
    }
}

#[async_trait]
impl AgentProvider for HttpAgentProvider {
    async fn authenticate(&self) -> Result<(), ProviderError> {
        self.bearer().await.map(|_| ())
    }

    async fn list_connections(&self) -> Result<Vec<Connection>, ProviderError> {
        let list: ListResponse<Connection> = self
            .execute_json(self.client.get(self.url("connections")))
            .await?;
        Ok(list.data)
    }

    async fn create_agent(&self, request: &CreateAgentRequest) -> Result<Agent, ProviderError> {
        self.execute_json(self.client.post(self.url("assistants")).json(request))
            .await
    }

    async fn create_thread(&self) -> Result<Thread, ProviderError> {
        self.execute_json(self.client.post(self.url("threads")).json(&json!({})))
            .await
    }

    async fn post_message(
        &self,
        thread_id: &str,
        role: MessageRole,
        content: &str,
    ) -> Result<(), ProviderError> {
        let url = self.url(&format!("threads/{thread_id}/messages"));
        let body = json!({ "role": role.as_str(), "content": content });
        self.execute(self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn run_and_process(&self, thread_id: &str, agent_id: &str) -> Result<Run, ProviderError> {
        let start = Instant::now();
        let url = self.url(&format!("threads/{thread_id}/runs"));
        let run: Run = self
            .execute_json(
                self.client
                    .post(url)
                    .json(&json!({ "assistant_id": agent_id })),
            )
            .await?;

        let run = poll_run(
            run,
            self.poll_interval,
            move |run_id| async move { self.get_run(thread_id, &run_id).await },
            move |run_id| async move { self.cancel_run(thread_id, &run_id).await },
        )
        .await?;

        tracing::info!(
            run_id = %run.id,
            status = ?run.status,
            duration_ms = %start.elapsed().as_millis(),
            "Run finished"
        );
        Ok(run)
    }

    async fn list_messages(
        &self,
        thread_id: &str,
        order: ListOrder,
        limit: u32,
    ) -> Result<Vec<ThreadMessage>, ProviderError> {
        let url = self.url(&format!("threads/{thread_id}/messages"));
        let limit = limit.to_string();
        let list: ListResponse<ThreadMessage> = self
            .execute_json(
                self.client
                    .get(url)
                    .query(&[("order", order.as_str()), ("limit", limit.as_str())]),
            )
            .await?;
        Ok(list.data)
    }

    async fn delete_agent(&self, agent_id: &str) -> Result<(), ProviderError> {
        let url = self.url(&format!("assistants/{agent_id}"));
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }
}

/// Poll a run until it reaches a terminal status.
///
/// Client-side tool calls are never registered, so a run asking for tool
/// outputs can only be cancelled. A status this client does not recognize
/// ends polling as well; the caller treats it like any non-failed run.
async fn poll_run<G, GF, C, CF>(
    mut run: Run,
    interval: Duration,
    mut get: G,
    mut cancel: C,
) -> Result<Run, ProviderError>
where
    G: FnMut(String) -> GF,
    GF: Future<Output = Result<Run, ProviderError>>,
    C: FnMut(String) -> CF,
    CF: Future<Output = Result<Run, ProviderError>>,
{
    while !run.status.is_terminal() {
        if run.status == RunStatus::Unknown {
            tracing::warn!(run_id = %run.id, "Run has an unrecognized status, no longer polling");
            break;
        }

        tokio::time::sleep(interval).await;
        run = get(run.id.clone()).await?;

        if run.status == RunStatus::RequiresAction {
            tracing::warn!(run_id = %run.id, "Run requires client tool outputs, cancelling");
            run = cancel(run.id.clone()).await?;
        }
    }
    Ok(run)
}
