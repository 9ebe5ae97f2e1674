use std::sync::Arc;

use relay_core::config::RelayConfig;
use relay_core::types::{
    compose_prompt, ActionKind, AgentId, AgentStatus, AgentSummary, TargetDescriptor, UserId,
};
use relay_gateway::{AgentGateway, GatewayError};
use tracing::{debug, info, warn};

use crate::error::RelayError;
use crate::poller::{wait_for_completion, PollSettings};
use crate::progress::ProgressNotifier;
use crate::reconciler::{capture_baseline, wait_for_followup, FollowupAnswer};
use crate::session::{AgentPickerSessions, PickError};
use crate::store::{
    InMemoryLastAgentStore, InMemorySelectedTargetStore, LastAgentStore, SelectedTargetStore,
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunRequest {
    pub prompt: String,
    /// Explicit repository reference. When absent the service picks one.
    pub repository: Option<String>,
    pub action: Option<ActionKind>,
    pub model: Option<String>,
}

impl RunRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            ..Self::default()
        }
    }

    pub fn with_repository(mut self, repository: impl Into<String>) -> Self {
        self.repository = Some(repository.into());
        self
    }

    pub fn with_action(mut self, action: ActionKind) -> Self {
        self.action = Some(action);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

/// A created agent and how waiting on it ended. The id is kept even when the
/// wait fails so the caller can follow up or wait again.
#[derive(Debug)]
pub struct RunOutcome {
    pub agent_id: AgentId,
    pub result: Result<String, RelayError>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FollowupOutcome {
    Answered(FollowupAnswer),
    /// The agent cannot take the follow-up; a new one has to be created.
    NeedsNewAgent { status: AgentStatus },
}

#[derive(Debug)]
pub enum UserFollowup {
    Answered {
        agent_id: AgentId,
        answer: FollowupAnswer,
    },
    /// The previous agent was gone, so the text started a new one.
    Restarted {
        previous: AgentId,
        status: AgentStatus,
        run: RunOutcome,
    },
}

/// Front-end facing operations over one [`AgentGateway`].
pub struct RelayService {
    gateway: Arc<dyn AgentGateway>,
    settings: PollSettings,
    default_repository: Option<String>,
    last_agents: Arc<dyn LastAgentStore>,
    selected_targets: Arc<dyn SelectedTargetStore>,
    pickers: AgentPickerSessions,
}

impl RelayService {
    pub fn new(gateway: Arc<dyn AgentGateway>, settings: PollSettings) -> Self {
        Self {
            gateway,
            settings,
            default_repository: None,
            last_agents: Arc::new(InMemoryLastAgentStore::new()),
            selected_targets: Arc::new(InMemorySelectedTargetStore::new()),
            pickers: AgentPickerSessions::default(),
        }
    }

    pub fn from_config(gateway: Arc<dyn AgentGateway>, config: &RelayConfig) -> Self {
        Self::new(gateway, PollSettings::from(&config.polling))
            .with_default_repository(config.targets.default_repository.clone())
            .with_picker_capacity(config.sessions.max_users)
    }

    pub fn with_default_repository(mut self, repository: Option<String>) -> Self {
        self.default_repository = repository.filter(|repo| !repo.trim().is_empty());
        self
    }

    pub fn with_stores(
        mut self,
        last_agents: Arc<dyn LastAgentStore>,
        selected_targets: Arc<dyn SelectedTargetStore>,
    ) -> Self {
        self.last_agents = last_agents;
        self.selected_targets = selected_targets;
        self
    }

    pub fn with_picker_capacity(mut self, max_users: usize) -> Self {
        self.pickers = AgentPickerSessions::new(max_users);
        self
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    pub fn gateway(&self) -> &dyn AgentGateway {
        self.gateway.as_ref()
    }

    /// Starts an agent and waits for its final output. Creation failures are
    /// returned as errors; wait failures are carried in the outcome.
    pub async fn create_and_wait(
        &self,
        request: RunRequest,
        notifier: Option<&dyn ProgressNotifier>,
    ) -> Result<RunOutcome, RelayError> {
        if request.prompt.trim().is_empty() {
            return Err(RelayError::InvalidRequest {
                message: "prompt is empty".to_string(),
            });
        }

        let repository = self.resolve_repository(request.repository.as_deref()).await?;
        let prompt = compose_prompt(&request.prompt, request.action);
        let agent_id = self
            .gateway
            .create_agent(&prompt, &repository, request.model.as_deref())
            .await?;
        info!(
            agent_id = %agent_id,
            repository = %repository,
            action = ?request.action,
            "waiting on new agent"
        );

        let result = wait_for_completion(self.gateway(), &agent_id, &self.settings, notifier)
            .await
            .map(|agent| agent.output.unwrap_or_default());
        Ok(RunOutcome { agent_id, result })
    }

    /// Sends `text` to an existing agent and waits for the answer to it.
    ///
    /// With `assume_reusable`, an agent that is EXPIRED or FAILED, or one the
    /// remote refuses with a conflict, yields [`FollowupOutcome::NeedsNewAgent`]
    /// instead of an error.
    pub async fn inject_and_wait(
        &self,
        agent_id: &AgentId,
        text: &str,
        notifier: Option<&dyn ProgressNotifier>,
        assume_reusable: bool,
    ) -> Result<FollowupOutcome, RelayError> {
        if text.trim().is_empty() {
            return Err(RelayError::InvalidRequest {
                message: "follow-up text is empty".to_string(),
            });
        }

        let current = self.gateway.fetch_status(agent_id).await?;
        if assume_reusable && matches!(current.status, AgentStatus::Expired | AgentStatus::Failed) {
            info!(agent_id = %agent_id, status = %current.status, "agent cannot take a follow-up");
            return Ok(FollowupOutcome::NeedsNewAgent {
                status: current.status,
            });
        }

        let baseline = capture_baseline(self.gateway(), agent_id, current.status).await;
        match self.gateway.inject_followup(agent_id, text).await {
            Ok(()) => {}
            Err(GatewayError::Conflict { message, .. }) if assume_reusable => {
                info!(agent_id = %agent_id, %message, "agent rejected the follow-up");
                return Ok(FollowupOutcome::NeedsNewAgent {
                    status: AgentStatus::Expired,
                });
            }
            Err(err) => return Err(err.into()),
        }

        let answer =
            wait_for_followup(self.gateway(), agent_id, baseline, &self.settings, notifier).await?;
        Ok(FollowupOutcome::Answered(answer))
    }

    pub async fn list_targets(&self) -> Result<Vec<TargetDescriptor>, RelayError> {
        Ok(self.gateway.list_available_targets().await?)
    }

    pub async fn refresh_targets(&self) -> Result<Vec<TargetDescriptor>, RelayError> {
        Ok(self.gateway.refresh_targets().await?)
    }

    pub async fn list_agents(&self, limit: usize) -> Result<Vec<AgentSummary>, RelayError> {
        Ok(self.gateway.list_agents(limit).await?)
    }

    async fn resolve_repository(&self, explicit: Option<&str>) -> Result<String, RelayError> {
        if let Some(repository) = explicit.map(str::trim).filter(|repo| !repo.is_empty()) {
            return Ok(repository.to_string());
        }

        let listing_error = match self.gateway.list_available_targets().await {
            Ok(targets) => match targets.first() {
                Some(first) => {
                    debug!(target_name = %first.display_name(), "defaulting to first available target");
                    return Ok(first.reference.clone());
                }
                None => None,
            },
            Err(err) => {
                warn!(error = %err, "could not list targets");
                Some(err)
            }
        };

        match (self.default_repository.clone(), listing_error) {
            (Some(repository), _) => {
                debug!(%repository, "using configured default repository");
                Ok(repository)
            }
            (None, Some(err)) => Err(err.into()),
            (None, None) => Err(RelayError::NoTarget {
                message: "no repository given, none listed and no default configured".to_string(),
            }),
        }
    }

    pub fn select_target(&self, user: UserId, target: TargetDescriptor) {
        info!(%user, target_name = %target.display_name(), "target selected");
        self.selected_targets.set_selected_target(user, target);
    }

    /// Selects a listed target by `owner/name`, bare name or reference.
    pub async fn select_target_named(
        &self,
        user: UserId,
        name: &str,
    ) -> Result<TargetDescriptor, RelayError> {
        let wanted = name.trim();
        let targets = self.list_targets().await?;
        let target = targets
            .into_iter()
            .find(|target| {
                target.display_name().eq_ignore_ascii_case(wanted)
                    || target.name.eq_ignore_ascii_case(wanted)
                    || target.reference == wanted
            })
            .ok_or_else(|| RelayError::NoTarget {
                message: format!("'{wanted}' is not among the available targets"),
            })?;
        self.select_target(user, target.clone());
        Ok(target)
    }

    pub fn selected_target(&self, user: UserId) -> Option<TargetDescriptor> {
        self.selected_targets.selected_target(user)
    }

    pub fn last_agent(&self, user: UserId) -> Option<AgentId> {
        self.last_agents.last_agent(user)
    }

    /// Like [`create_and_wait`](Self::create_and_wait), defaulting to the
    /// user's selected target and remembering the agent for follow-ups.
    pub async fn run_for_user(
        &self,
        user: UserId,
        mut request: RunRequest,
        notifier: Option<&dyn ProgressNotifier>,
    ) -> Result<RunOutcome, RelayError> {
        if request.repository.is_none() {
            request.repository = self
                .selected_targets
                .selected_target(user)
                .map(|target| target.reference);
        }
        let outcome = self.create_and_wait(request, notifier).await?;
        self.last_agents.set_last_agent(user, outcome.agent_id.clone());
        Ok(outcome)
    }

    /// Follows up on the user's last agent, starting a new one with the same
    /// text when the old one is gone.
    pub async fn followup_for_user(
        &self,
        user: UserId,
        text: &str,
        notifier: Option<&dyn ProgressNotifier>,
    ) -> Result<UserFollowup, RelayError> {
        let agent_id = self
            .last_agents
            .last_agent(user)
            .ok_or(RelayError::NoActiveAgent { user })?;

        match self.inject_and_wait(&agent_id, text, notifier, true).await? {
            FollowupOutcome::Answered(answer) => Ok(UserFollowup::Answered { agent_id, answer }),
            FollowupOutcome::NeedsNewAgent { status } => {
                info!(%user, previous = %agent_id, %status, "starting a new agent for follow-up");
                let run = self.run_for_user(user, RunRequest::new(text), notifier).await?;
                Ok(UserFollowup::Restarted {
                    previous: agent_id,
                    status,
                    run,
                })
            }
        }
    }

    /// Lists recent agents and remembers the listing for [`choose_agent`](Self::choose_agent).
    pub async fn browse_agents(
        &self,
        user: UserId,
        limit: usize,
    ) -> Result<Vec<AgentSummary>, RelayError> {
        let agents = self.list_agents(limit).await?;
        self.pickers.remember(user, agents.clone());
        Ok(agents)
    }

    /// Makes entry `index` (1-based) of the user's last listing their active agent.
    pub fn choose_agent(&self, user: UserId, index: usize) -> Result<AgentSummary, RelayError> {
        let picked = self.pickers.pick(user, index).map_err(|err| match err {
            PickError::NoListing => RelayError::UnknownSelection {
                index,
                available: 0,
            },
            PickError::OutOfRange { index, available } => {
                RelayError::UnknownSelection { index, available }
            }
        })?;
        info!(%user, agent_id = %picked.id, "agent chosen");
        self.last_agents.set_last_agent(user, picked.id.clone());
        Ok(picked)
    }

    pub fn forget_user(&self, user: UserId) {
        self.last_agents.clear_last_agent(user);
        self.selected_targets.clear_selected_target(user);
        self.pickers.forget(user);
    }
}

#[cfg(test)]
mod tests {
    use super::{RelayService, RunRequest};
    use crate::poller::PollSettings;
    use crate::testing::ScriptedGateway;
    use relay_core::config::parse_relay_config;
    use relay_core::types::ActionKind;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn request_builder_sets_fields() {
        let request = RunRequest::new("do X")
            .with_repository("https://github.com/acme/api")
            .with_action(ActionKind::Plan)
            .with_model("gpt-5");
        assert_eq!(request.prompt, "do X");
        assert_eq!(request.repository.as_deref(), Some("https://github.com/acme/api"));
        assert_eq!(request.action, Some(ActionKind::Plan));
        assert_eq!(request.model.as_deref(), Some("gpt-5"));
    }

    #[tokio::test(start_paused = true)]
    async fn service_takes_settings_from_config() {
        let config = parse_relay_config(
            r#"
[polling]
timeout_secs = 90
poll_interval_secs = 3

[targets]
default_repository = "   "

[sessions]
max_users = 8
"#,
        )
        .expect("config");
        let service = RelayService::from_config(Arc::new(ScriptedGateway::new()), &config);

        assert_eq!(service.settings().timeout, Duration::from_secs(90));
        assert_eq!(service.settings().poll_interval, Duration::from_secs(3));
        assert_eq!(service.default_repository, None);
        assert_eq!(service.pickers.max_users(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn blank_prompt_is_rejected_before_any_call() {
        let gateway = Arc::new(ScriptedGateway::new());
        let service = RelayService::new(gateway.clone(), PollSettings::default());

        let err = service
            .create_and_wait(RunRequest::new("  "), None)
            .await
            .expect_err("blank prompt");
        assert!(matches!(err, crate::RelayError::InvalidRequest { .. }));
        assert!(gateway.calls().is_empty());
    }
}
