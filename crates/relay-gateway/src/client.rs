use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use relay_core::config::RelayConfig;
use relay_core::types::{
    assistant_texts, join_assistant_texts, Agent, AgentId, AgentStatus, AgentSummary,
    ConversationMessage, TargetDescriptor,
};
use reqwest::header::RETRY_AFTER;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{CacheMode, StatusLog, TargetCache};
use crate::error::{classify_http_failure, GatewayError};
use crate::gateway::{clamp_agent_limit, AgentGateway};
use crate::types::{
    AgentStatusBody, AgentsBody, ConversationBody, CreateAgentBody, CreatedAgentBody,
    FollowupBody, RepositoriesBody,
};

#[derive(Debug)]
pub struct HttpGateway {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    targets: TargetCache,
    status_log: StatusLog,
}

impl HttpGateway {
    pub fn new(
        base_url: &str,
        api_key: impl Into<String>,
        request_timeout: Duration,
        cache_ttl: Duration,
    ) -> Result<Self, GatewayError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|err| GatewayError::Client {
                message: err.to_string(),
            })?;
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        info!(base_url = %base_url, "initialized agent gateway");
        Ok(Self {
            http,
            base_url,
            api_key: api_key.into(),
            targets: TargetCache::new(cache_ttl),
            status_log: StatusLog::default(),
        })
    }

    pub fn from_config(config: &RelayConfig, api_key: impl Into<String>) -> Result<Self, GatewayError> {
        Self::new(
            &config.api.base_url,
            api_key,
            config.api.request_timeout(),
            config.targets.cache_ttl(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn target_cache(&self) -> &TargetCache {
        &self.targets
    }

    pub fn status_log(&self) -> &StatusLog {
        &self.status_log
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{}", self.base_url, path))
            .basic_auth(&self.api_key, None::<&str>)
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, GatewayError> {
        let response = request.send().await.map_err(|err| {
            let message = if err.is_timeout() {
                format!("request timed out: {err}")
            } else if err.is_connect() {
                format!("could not connect to {}: {err}", self.base_url)
            } else {
                err.to_string()
            };
            warn!(endpoint = path, %message, "agent api request failed");
            GatewayError::Network {
                endpoint: path.to_string(),
                message,
            }
        })?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let retry_after_secs = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());
        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(endpoint = path, error = %err, "could not read error response body");
                String::new()
            }
        };
        let err = classify_http_failure(path, status.as_u16(), &body, retry_after_secs);
        warn!(endpoint = path, status = status.as_u16(), error = %err, "agent api returned an error");
        Err(err)
    }

    async fn read_json<T: DeserializeOwned>(
        &self,
        response: Response,
        path: &str,
    ) -> Result<T, GatewayError> {
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|err| GatewayError::Network {
            endpoint: path.to_string(),
            message: format!("failed to read response body: {err}"),
        })?;
        serde_json::from_str(&body).map_err(|err| GatewayError::Remote {
            endpoint: path.to_string(),
            status: Some(status),
            message: format!("unexpected response body: {err}"),
        })
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let response = self.send(self.request(Method::GET, path), path).await?;
        self.read_json(response, path).await
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<Response, GatewayError> {
        self.send(self.request(Method::POST, path).json(body), path)
            .await
    }

    async fn fetch_targets_remote(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        debug!("fetching available repositories");
        let body: RepositoriesBody = self.get_json("/repositories").await?;
        info!(count = body.repositories.len(), "listed available repositories");
        Ok(body.repositories)
    }

    /// Logs once per agent per observed status change.
    fn log_status_change(&self, agent_id: &AgentId, status: AgentStatus, raw: &str) {
        if self.status_log.record(agent_id, status) {
            info!(agent_id = %agent_id, %status, raw_status = raw, "agent status changed");
        }
    }

    async fn completed_output(&self, agent_id: &AgentId, summary: Option<String>) -> Option<String> {
        match self.fetch_conversation(agent_id).await {
            Ok(messages) => {
                let texts = assistant_texts(&messages);
                debug!(agent_id = %agent_id, messages = texts.len(), "joined assistant output");
                join_assistant_texts(&texts)
            }
            Err(err) => {
                warn!(agent_id = %agent_id, error = %err, "conversation unavailable, using summary");
                summary
            }
        }
    }
}

#[async_trait]
impl AgentGateway for HttpGateway {
    async fn create_agent(
        &self,
        prompt: &str,
        repository: &str,
        model: Option<&str>,
    ) -> Result<AgentId, GatewayError> {
        let path = "/agents";
        let body = CreateAgentBody::new(prompt, repository, model);
        info!(repository, model = ?body.model, "creating agent");

        let response = self.post_json(path, &body).await?;
        let created: CreatedAgentBody = self.read_json(response, path).await?;
        let agent_id = created.resolved_id().ok_or_else(|| GatewayError::Remote {
            endpoint: path.to_string(),
            status: None,
            message: "agent creation response carried no id".to_string(),
        })?;
        info!(agent_id = %agent_id, "agent created");
        Ok(agent_id)
    }

    async fn fetch_status(&self, agent_id: &AgentId) -> Result<Agent, GatewayError> {
        let path = format!("/agents/{agent_id}");
        let body: AgentStatusBody = self.get_json(&path).await?;

        let raw = body.raw_status();
        let status = AgentStatus::from_remote(raw).unwrap_or_else(|| {
            warn!(agent_id = %agent_id, raw_status = raw, "unknown agent status, treating as running");
            AgentStatus::Running
        });
        self.log_status_change(agent_id, status, raw);

        let output = if status == AgentStatus::Completed {
            self.completed_output(agent_id, body.summary.clone()).await
        } else {
            None
        };

        Ok(Agent {
            id: agent_id.clone(),
            status,
            output,
            error: body.error_text(),
        })
    }

    async fn fetch_conversation(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<ConversationMessage>, GatewayError> {
        let path = format!("/agents/{agent_id}/conversation");
        let body: ConversationBody = self.get_json(&path).await?;
        debug!(agent_id = %agent_id, messages = body.messages.len(), "fetched conversation");
        Ok(body.messages)
    }

    async fn inject_followup(&self, agent_id: &AgentId, text: &str) -> Result<(), GatewayError> {
        let path = format!("/agents/{agent_id}/followup");
        info!(agent_id = %agent_id, chars = text.chars().count(), "adding follow-up");
        self.post_json(&path, &FollowupBody::new(text)).await?;
        Ok(())
    }

    async fn list_available_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        let targets = self
            .targets
            .get_or_fetch(CacheMode::PreferCache, || self.fetch_targets_remote())
            .await?;
        Ok(Arc::unwrap_or_clone(targets))
    }

    async fn refresh_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        let targets = self
            .targets
            .get_or_fetch(CacheMode::Refresh, || self.fetch_targets_remote())
            .await?;
        Ok(Arc::unwrap_or_clone(targets))
    }

    async fn invalidate_targets(&self) {
        self.targets.invalidate().await;
    }

    async fn list_agents(&self, limit: usize) -> Result<Vec<AgentSummary>, GatewayError> {
        let limit = clamp_agent_limit(limit);
        let path = format!("/agents?limit={limit}");
        let body: AgentsBody = self.get_json(&path).await?;
        info!(count = body.agents.len(), "listed agents");
        Ok(body.agents.into_iter().map(AgentSummary::from).collect())
    }
}
