//! Completion polling.

use std::time::Duration;

use relay_core::config::PollingConfig;
use relay_core::types::{Agent, AgentId, AgentStatus};
use relay_gateway::AgentGateway;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::error::{RelayError, AGENT_FAILED_FALLBACK};
use crate::progress::{deliver, ProgressNotifier, ProgressUpdate};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollSettings {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub notify_interval: Duration,
    pub notify_timeout: Duration,
    pub completed_check_interval: Duration,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self::from(&PollingConfig::default())
    }
}

impl From<&PollingConfig> for PollSettings {
    fn from(config: &PollingConfig) -> Self {
        Self {
            timeout: config.timeout(),
            poll_interval: config.poll_interval(),
            notify_interval: config.notify_interval(),
            notify_timeout: config.notify_timeout(),
            completed_check_interval: config.completed_check_interval(),
        }
    }
}

impl PollSettings {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Clock, deadline and notification bookkeeping for a single wait.
pub(crate) struct PollSession<'a> {
    gateway: &'a dyn AgentGateway,
    agent_id: &'a AgentId,
    settings: &'a PollSettings,
    notifier: Option<&'a dyn ProgressNotifier>,
    started: Instant,
    last_notified: Duration,
    polls: u32,
}

impl<'a> PollSession<'a> {
    pub(crate) fn new(
        gateway: &'a dyn AgentGateway,
        agent_id: &'a AgentId,
        settings: &'a PollSettings,
        notifier: Option<&'a dyn ProgressNotifier>,
    ) -> Self {
        Self {
            gateway,
            agent_id,
            settings,
            notifier,
            started: Instant::now(),
            last_notified: Duration::ZERO,
            polls: 0,
        }
    }

    pub(crate) fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// One status fetch, preceded by the deadline check and followed by a
    /// notification when one is due.
    pub(crate) async fn observe(&mut self) -> Result<Agent, RelayError> {
        let elapsed = self.elapsed();
        if elapsed >= self.settings.timeout {
            info!(
                agent_id = %self.agent_id,
                polls = self.polls,
                timeout_secs = self.settings.timeout.as_secs(),
                "gave up waiting on agent"
            );
            return Err(RelayError::Timeout {
                agent_id: self.agent_id.clone(),
                timeout_secs: self.settings.timeout.as_secs(),
            });
        }

        let agent = self.gateway.fetch_status(self.agent_id).await?;
        self.polls += 1;
        debug!(
            agent_id = %self.agent_id,
            status = %agent.status,
            elapsed_secs = elapsed.as_secs(),
            "polled agent status"
        );

        if let Some(notifier) = self.notifier {
            if elapsed.saturating_sub(self.last_notified) >= self.settings.notify_interval {
                self.last_notified = elapsed;
                let update = ProgressUpdate {
                    agent_id: self.agent_id.clone(),
                    elapsed,
                    status: agent.status,
                };
                deliver(notifier, &update, self.settings.notify_timeout).await;
            }
        }

        Ok(agent)
    }

    /// Sleeps one poll interval, never past the deadline.
    pub(crate) async fn pause(&self) {
        let remaining = self.settings.timeout.saturating_sub(self.elapsed());
        tokio::time::sleep(self.settings.poll_interval.min(remaining)).await;
    }
}

/// Maps FAILED and EXPIRED onto their errors.
pub(crate) fn terminal_failure(agent: &Agent) -> Option<RelayError> {
    match agent.status {
        AgentStatus::Failed => Some(RelayError::AgentFailed {
            agent_id: agent.id.clone(),
            message: agent
                .error
                .clone()
                .filter(|message| !message.trim().is_empty())
                .unwrap_or_else(|| AGENT_FAILED_FALLBACK.to_string()),
        }),
        AgentStatus::Expired => Some(RelayError::AgentExpired {
            agent_id: agent.id.clone(),
        }),
        _ => None,
    }
}

/// Polls until the agent completes, fails, expires or the deadline passes.
pub async fn wait_for_completion(
    gateway: &dyn AgentGateway,
    agent_id: &AgentId,
    settings: &PollSettings,
    notifier: Option<&dyn ProgressNotifier>,
) -> Result<Agent, RelayError> {
    let mut session = PollSession::new(gateway, agent_id, settings, notifier);
    loop {
        let agent = session.observe().await?;
        if let Some(err) = terminal_failure(&agent) {
            return Err(err);
        }
        if agent.status == AgentStatus::Completed {
            info!(
                agent_id = %agent_id,
                elapsed_secs = session.elapsed().as_secs(),
                "agent completed"
            );
            return Ok(agent);
        }
        session.pause().await;
    }
}

#[cfg(test)]
mod tests {
    use super::{terminal_failure, PollSettings};
    use relay_core::config::PollingConfig;
    use relay_core::types::{Agent, AgentId, AgentStatus};
    use std::time::Duration;

    use crate::error::RelayError;

    fn agent(status: AgentStatus, error: Option<&str>) -> Agent {
        Agent {
            id: AgentId::new("bc-1"),
            status,
            output: None,
            error: error.map(str::to_string),
        }
    }

    #[test]
    fn settings_follow_polling_config() {
        let settings = PollSettings::from(&PollingConfig {
            timeout_secs: 60,
            poll_interval_secs: 2,
            notify_interval_secs: 8,
            completed_check_interval_secs: 12,
            notify_timeout_secs: 3,
        });
        assert_eq!(settings.timeout, Duration::from_secs(60));
        assert_eq!(settings.poll_interval, Duration::from_secs(2));
        assert_eq!(settings.notify_interval, Duration::from_secs(8));
        assert_eq!(settings.completed_check_interval, Duration::from_secs(12));
        assert_eq!(settings.notify_timeout, Duration::from_secs(3));
        assert_eq!(PollSettings::default().timeout, Duration::from_secs(300));
    }

    #[test]
    fn failed_without_message_uses_fallback() {
        let err = terminal_failure(&agent(AgentStatus::Failed, Some("  "))).expect("failure");
        assert!(matches!(err, RelayError::AgentFailed { ref message, .. }
            if message == "agent finished with an error"));

        let err = terminal_failure(&agent(AgentStatus::Failed, Some("tests failed"))).expect("failure");
        assert!(matches!(err, RelayError::AgentFailed { ref message, .. } if message == "tests failed"));
    }

    #[test]
    fn only_failed_and_expired_are_failures() {
        assert!(matches!(
            terminal_failure(&agent(AgentStatus::Expired, None)),
            Some(RelayError::AgentExpired { .. })
        ));
        for status in [AgentStatus::Creating, AgentStatus::Running, AgentStatus::Completed] {
            assert!(terminal_failure(&agent(status, None)).is_none());
        }
    }
}
