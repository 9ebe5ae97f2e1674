//! In-memory [`AgentGateway`] for exercising the relay without a remote.
//!
//! Statuses are scripted per agent as a queue of [`StatusStep`]s. Each
//! `fetch_status` pops one step; once the queue is drained the last step
//! repeats. A step may append messages to the agent's conversation when it is
//! popped, which is how tests model an agent producing output over time.
//!
//! ```ignore
//! let gateway = ScriptedGateway::new()
//!     .created_agent("bc-1")
//!     .statuses("bc-1", [
//!         StatusStep::new(AgentStatus::Running),
//!         StatusStep::new(AgentStatus::Completed).appending_assistant("Plan: do X"),
//!     ]);
//! ```

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use relay_core::types::{
    assistant_texts, join_assistant_texts, Agent, AgentId, AgentStatus, AgentSummary,
    ConversationMessage, TargetDescriptor,
};
use relay_gateway::{clamp_agent_limit, AgentGateway, GatewayError};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct StatusStep {
    pub status: AgentStatus,
    pub error: Option<String>,
    pub append: Vec<ConversationMessage>,
    pub failure: Option<GatewayError>,
}

impl StatusStep {
    pub fn new(status: AgentStatus) -> Self {
        Self {
            status,
            error: None,
            append: Vec::new(),
            failure: None,
        }
    }

    /// A status fetch that fails with `err`.
    pub fn failing(err: GatewayError) -> Self {
        Self {
            failure: Some(err),
            ..Self::new(AgentStatus::Running)
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn appending_assistant(mut self, text: impl Into<String>) -> Self {
        self.append.push(ConversationMessage::assistant(text));
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayCall {
    CreateAgent {
        prompt: String,
        repository: String,
        model: Option<String>,
    },
    FetchStatus(AgentId),
    FetchConversation(AgentId),
    InjectFollowup { agent_id: AgentId, text: String },
    ListTargets,
    RefreshTargets,
    ListAgents { limit: usize },
}

/// A call and the time since the gateway was built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub at: Duration,
    pub call: GatewayCall,
}

#[derive(Debug, Default)]
struct ScriptState {
    created: VecDeque<Result<AgentId, GatewayError>>,
    statuses: HashMap<AgentId, VecDeque<StatusStep>>,
    current: HashMap<AgentId, StatusStep>,
    conversations: HashMap<AgentId, Vec<ConversationMessage>>,
    conversation_failures: HashMap<AgentId, VecDeque<GatewayError>>,
    followup_failures: HashMap<AgentId, GatewayError>,
    targets: Option<Result<Vec<TargetDescriptor>, GatewayError>>,
    agents: Vec<AgentSummary>,
    calls: Vec<RecordedCall>,
}

#[derive(Debug)]
pub struct ScriptedGateway {
    started: Instant,
    state: Mutex<ScriptState>,
}

impl Default for ScriptedGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
            state: Mutex::new(ScriptState::default()),
        }
    }

    /// Queues the id returned by the next `create_agent`.
    pub fn created_agent(self, agent_id: impl Into<String>) -> Self {
        self.lock().created.push_back(Ok(AgentId::new(agent_id)));
        self
    }

    pub fn create_failure(self, err: GatewayError) -> Self {
        self.lock().created.push_back(Err(err));
        self
    }

    pub fn statuses(self, agent_id: impl Into<String>, steps: impl IntoIterator<Item = StatusStep>) -> Self {
        self.push_statuses(&AgentId::new(agent_id), steps);
        self
    }

    pub fn conversation(
        self,
        agent_id: impl Into<String>,
        messages: impl IntoIterator<Item = ConversationMessage>,
    ) -> Self {
        self.lock()
            .conversations
            .insert(AgentId::new(agent_id), messages.into_iter().collect());
        self
    }

    /// The next conversation fetch for `agent_id` fails once with `err`.
    pub fn conversation_failure(self, agent_id: impl Into<String>, err: GatewayError) -> Self {
        self.lock()
            .conversation_failures
            .entry(AgentId::new(agent_id))
            .or_default()
            .push_back(err);
        self
    }

    pub fn followup_failure(self, agent_id: impl Into<String>, err: GatewayError) -> Self {
        self.lock()
            .followup_failures
            .insert(AgentId::new(agent_id), err);
        self
    }

    pub fn targets(self, targets: impl IntoIterator<Item = TargetDescriptor>) -> Self {
        self.lock().targets = Some(Ok(targets.into_iter().collect()));
        self
    }

    pub fn targets_failure(self, err: GatewayError) -> Self {
        self.lock().targets = Some(Err(err));
        self
    }

    pub fn agents(self, agents: impl IntoIterator<Item = AgentSummary>) -> Self {
        self.lock().agents = agents.into_iter().collect();
        self
    }

    /// Appends further steps for an agent, e.g. after a follow-up.
    pub fn push_statuses(&self, agent_id: &AgentId, steps: impl IntoIterator<Item = StatusStep>) {
        self.lock()
            .statuses
            .entry(agent_id.clone())
            .or_default()
            .extend(steps);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, predicate: impl Fn(&GatewayCall) -> bool) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|recorded| predicate(&recorded.call))
            .count()
    }

    pub fn status_calls(&self, agent_id: &AgentId) -> usize {
        self.count_calls(|call| matches!(call, GatewayCall::FetchStatus(id) if id == agent_id))
    }

    pub fn conversation_calls(&self, agent_id: &AgentId) -> usize {
        self.count_calls(|call| matches!(call, GatewayCall::FetchConversation(id) if id == agent_id))
    }

    pub fn followups(&self) -> Vec<(AgentId, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|recorded| match &recorded.call {
                GatewayCall::InjectFollowup { agent_id, text } => {
                    Some((agent_id.clone(), text.clone()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn created_prompts(&self) -> Vec<(String, String)> {
        self.lock()
            .calls
            .iter()
            .filter_map(|recorded| match &recorded.call {
                GatewayCall::CreateAgent {
                    prompt, repository, ..
                } => Some((prompt.clone(), repository.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn conversation_of(&self, agent_id: &AgentId) -> Vec<ConversationMessage> {
        self.lock()
            .conversations
            .get(agent_id)
            .cloned()
            .unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, ScriptState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, state: &mut ScriptState, call: GatewayCall) {
        state.calls.push(RecordedCall {
            at: self.started.elapsed(),
            call,
        });
    }
}

fn not_found(endpoint: String) -> GatewayError {
    GatewayError::NotFound {
        endpoint,
        message: "no script for agent".to_string(),
    }
}

#[async_trait]
impl AgentGateway for ScriptedGateway {
    async fn create_agent(
        &self,
        prompt: &str,
        repository: &str,
        model: Option<&str>,
    ) -> Result<AgentId, GatewayError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            GatewayCall::CreateAgent {
                prompt: prompt.to_string(),
                repository: repository.to_string(),
                model: model.map(str::to_string),
            },
        );
        let agent_id = state.created.pop_front().unwrap_or_else(|| {
            Err(GatewayError::Remote {
                endpoint: "/agents".to_string(),
                status: Some(500),
                message: "no scripted agent left".to_string(),
            })
        })?;
        state
            .conversations
            .entry(agent_id.clone())
            .or_default()
            .push(ConversationMessage::user(prompt));
        Ok(agent_id)
    }

    async fn fetch_status(&self, agent_id: &AgentId) -> Result<Agent, GatewayError> {
        let mut state = self.lock();
        self.record(&mut state, GatewayCall::FetchStatus(agent_id.clone()));

        let popped = state
            .statuses
            .get_mut(agent_id)
            .and_then(|queue| queue.pop_front());
        let step = match popped {
            Some(step) => {
                if let Some(err) = step.failure.clone() {
                    return Err(err);
                }
                state
                    .conversations
                    .entry(agent_id.clone())
                    .or_default()
                    .extend(step.append.iter().cloned());
                state.current.insert(agent_id.clone(), step.clone());
                step
            }
            None => state
                .current
                .get(agent_id)
                .cloned()
                .ok_or_else(|| not_found(format!("/agents/{agent_id}")))?,
        };

        let output = if step.status == AgentStatus::Completed {
            let messages = state.conversations.get(agent_id).cloned().unwrap_or_default();
            join_assistant_texts(&assistant_texts(&messages))
        } else {
            None
        };

        Ok(Agent {
            id: agent_id.clone(),
            status: step.status,
            output,
            error: step.error,
        })
    }

    async fn fetch_conversation(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<ConversationMessage>, GatewayError> {
        let mut state = self.lock();
        self.record(&mut state, GatewayCall::FetchConversation(agent_id.clone()));
        if let Some(err) = state
            .conversation_failures
            .get_mut(agent_id)
            .and_then(|queue| queue.pop_front())
        {
            return Err(err);
        }
        state
            .conversations
            .get(agent_id)
            .cloned()
            .ok_or_else(|| not_found(format!("/agents/{agent_id}/conversation")))
    }

    async fn inject_followup(&self, agent_id: &AgentId, text: &str) -> Result<(), GatewayError> {
        let mut state = self.lock();
        self.record(
            &mut state,
            GatewayCall::InjectFollowup {
                agent_id: agent_id.clone(),
                text: text.to_string(),
            },
        );
        if let Some(err) = state.followup_failures.get(agent_id) {
            return Err(err.clone());
        }
        state
            .conversations
            .entry(agent_id.clone())
            .or_default()
            .push(ConversationMessage::user(text));
        Ok(())
    }

    async fn list_available_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        let mut state = self.lock();
        self.record(&mut state, GatewayCall::ListTargets);
        state.targets.clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn refresh_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        let mut state = self.lock();
        self.record(&mut state, GatewayCall::RefreshTargets);
        state.targets.clone().unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn list_agents(&self, limit: usize) -> Result<Vec<AgentSummary>, GatewayError> {
        let limit = clamp_agent_limit(limit);
        let mut state = self.lock();
        self.record(&mut state, GatewayCall::ListAgents { limit });
        Ok(state.agents.iter().take(limit).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::{GatewayCall, ScriptedGateway, StatusStep};
    use relay_core::types::{AgentId, AgentStatus, ConversationMessage};
    use relay_gateway::{AgentGateway, GatewayError};

    #[tokio::test(start_paused = true)]
    async fn last_step_repeats_and_appends_once() {
        let gateway = ScriptedGateway::new()
            .conversation("bc-1", [ConversationMessage::user("do X")])
            .statuses(
                "bc-1",
                [StatusStep::new(AgentStatus::Completed).appending_assistant("Plan: do X")],
            );
        let agent_id = AgentId::new("bc-1");

        let first = gateway.fetch_status(&agent_id).await.expect("status");
        let second = gateway.fetch_status(&agent_id).await.expect("status");

        assert_eq!(first, second);
        assert_eq!(first.output.as_deref(), Some("Plan: do X"));
        assert_eq!(gateway.conversation_of(&agent_id).len(), 2);
        assert_eq!(gateway.status_calls(&agent_id), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn unscripted_agent_is_not_found() {
        let gateway = ScriptedGateway::new();
        let err = gateway
            .fetch_status(&AgentId::new("bc-404"))
            .await
            .expect_err("no script");
        assert!(matches!(err, GatewayError::NotFound { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn conversation_failure_is_consumed_once() {
        let gateway = ScriptedGateway::new()
            .conversation("bc-1", [ConversationMessage::assistant("hi")])
            .conversation_failure(
                "bc-1",
                GatewayError::Network {
                    endpoint: "/agents/bc-1/conversation".to_string(),
                    message: "reset".to_string(),
                },
            );
        let agent_id = AgentId::new("bc-1");

        assert!(gateway.fetch_conversation(&agent_id).await.is_err());
        assert_eq!(gateway.fetch_conversation(&agent_id).await.expect("messages").len(), 1);
        assert_eq!(
            gateway.count_calls(|call| matches!(call, GatewayCall::FetchConversation(_))),
            2
        );
    }
}
