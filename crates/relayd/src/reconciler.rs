//! Extracts the answer to a follow-up from the agent's conversation.
//!
//! A follow-up goes to an agent that is usually already COMPLETED, so the
//! status alone cannot tell whether the new instruction has been handled.
//! The reconciler counts assistant messages before injection and returns
//! only the ones added afterwards.

use std::time::Duration;

use relay_core::types::{
    assistant_count, assistant_texts, join_assistant_texts, Agent, AgentId, AgentStatus,
    ConversationMessage,
};
use relay_gateway::AgentGateway;
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::poller::{terminal_failure, PollSession, PollSettings};
use crate::progress::ProgressNotifier;

/// Conversation state captured before a follow-up is injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FollowupBaseline {
    pub status_before: AgentStatus,
    /// `None` when the conversation could not be read before injection.
    pub assistant_count_before: Option<usize>,
}

impl FollowupBaseline {
    pub fn new(status_before: AgentStatus, assistant_count_before: Option<usize>) -> Self {
        Self {
            status_before,
            assistant_count_before,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerSource {
    /// Assistant messages added after the baseline.
    NewMessages { count: usize },
    /// Most recent assistant message, used when no new ones could be isolated.
    Latest,
    /// Joined output from the status snapshot.
    Snapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowupAnswer {
    pub text: String,
    pub source: AnswerSource,
}

impl FollowupAnswer {
    fn new(text: String, source: AnswerSource) -> Self {
        Self { text, source }
    }
}

pub async fn capture_baseline(
    gateway: &dyn AgentGateway,
    agent_id: &AgentId,
    status_before: AgentStatus,
) -> FollowupBaseline {
    let count = match gateway.fetch_conversation(agent_id).await {
        Ok(messages) => Some(assistant_count(&messages)),
        Err(err) => {
            warn!(agent_id = %agent_id, error = %err, "could not read conversation before follow-up");
            None
        }
    };
    debug!(agent_id = %agent_id, status = %status_before, assistant_count = ?count, "captured follow-up baseline");
    FollowupBaseline::new(status_before, count)
}

/// Assistant messages from index `before` onward, joined by a blank line.
pub fn messages_since(messages: &[ConversationMessage], before: usize) -> Option<(String, usize)> {
    let texts = assistant_texts(messages);
    if texts.len() <= before {
        return None;
    }
    let fresh = &texts[before..];
    join_assistant_texts(fresh).map(|text| (text, fresh.len()))
}

pub fn latest_assistant_message(messages: &[ConversationMessage]) -> Option<String> {
    assistant_texts(messages).last().map(|text| (*text).to_string())
}

/// Waits for the answer to a follow-up that has already been injected.
pub async fn wait_for_followup(
    gateway: &dyn AgentGateway,
    agent_id: &AgentId,
    baseline: FollowupBaseline,
    settings: &PollSettings,
    notifier: Option<&dyn ProgressNotifier>,
) -> Result<FollowupAnswer, RelayError> {
    let mut session = PollSession::new(gateway, agent_id, settings, notifier);
    let mut seen_running = baseline.status_before != AgentStatus::Completed;
    let mut last_check: Option<Duration> = None;

    loop {
        let agent = session.observe().await?;
        if let Some(err) = terminal_failure(&agent) {
            return Err(err);
        }

        match agent.status {
            AgentStatus::Creating | AgentStatus::Running => {
                if !seen_running {
                    debug!(agent_id = %agent_id, "agent picked up the follow-up");
                }
                seen_running = true;
            }
            AgentStatus::Completed if seen_running => {
                let answer = resolve_after_cycle(gateway, &agent, baseline).await?;
                info!(
                    agent_id = %agent_id,
                    elapsed_secs = session.elapsed().as_secs(),
                    source = ?answer.source,
                    "follow-up answered"
                );
                return Ok(answer);
            }
            AgentStatus::Completed => {
                let now = session.elapsed();
                let due = last_check
                    .map_or(true, |at| now.saturating_sub(at) >= settings.completed_check_interval);
                if due {
                    let first = last_check.is_none();
                    last_check = Some(now);
                    if let Some(answer) = check_while_completed(gateway, agent_id, baseline, first).await {
                        info!(
                            agent_id = %agent_id,
                            elapsed_secs = now.as_secs(),
                            source = ?answer.source,
                            "follow-up answered without a visible restart"
                        );
                        return Ok(answer);
                    }
                }
            }
            AgentStatus::Failed | AgentStatus::Expired => {}
        }

        session.pause().await;
    }
}

async fn check_while_completed(
    gateway: &dyn AgentGateway,
    agent_id: &AgentId,
    baseline: FollowupBaseline,
    first: bool,
) -> Option<FollowupAnswer> {
    let messages = match gateway.fetch_conversation(agent_id).await {
        Ok(messages) => messages,
        Err(err) => {
            warn!(agent_id = %agent_id, error = %err, "conversation check failed, still polling");
            return None;
        }
    };

    match baseline.assistant_count_before {
        Some(before) => messages_since(&messages, before)
            .map(|(text, count)| FollowupAnswer::new(text, AnswerSource::NewMessages { count })),
        None if first => None,
        None => {
            warn!(agent_id = %agent_id, "no baseline, returning the latest assistant message");
            latest_assistant_message(&messages)
                .map(|text| FollowupAnswer::new(text, AnswerSource::Latest))
        }
    }
}

async fn resolve_after_cycle(
    gateway: &dyn AgentGateway,
    agent: &Agent,
    baseline: FollowupBaseline,
) -> Result<FollowupAnswer, RelayError> {
    let messages = match gateway.fetch_conversation(&agent.id).await {
        Ok(messages) => messages,
        Err(err) => {
            return match agent.output.clone() {
                Some(output) => {
                    warn!(agent_id = %agent.id, error = %err, "conversation unavailable, using status output");
                    Ok(FollowupAnswer::new(output, AnswerSource::Snapshot))
                }
                None => Err(err.into()),
            };
        }
    };

    if let Some((text, count)) = baseline
        .assistant_count_before
        .and_then(|before| messages_since(&messages, before))
    {
        return Ok(FollowupAnswer::new(text, AnswerSource::NewMessages { count }));
    }

    warn!(
        agent_id = %agent.id,
        baseline = ?baseline.assistant_count_before,
        "no new assistant messages isolated, returning the latest one"
    );
    let text = latest_assistant_message(&messages)
        .or_else(|| agent.output.clone())
        .unwrap_or_default();
    Ok(FollowupAnswer::new(text, AnswerSource::Latest))
}
