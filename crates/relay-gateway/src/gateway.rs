use async_trait::async_trait;
use relay_core::types::{Agent, AgentId, AgentSummary, ConversationMessage, TargetDescriptor};

use crate::error::GatewayError;

pub const MAX_AGENT_LIST_LIMIT: usize = 100;

/// The remote operations the relay depends on. Implementations never retry;
/// that decision belongs to the caller.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn create_agent(
        &self,
        prompt: &str,
        repository: &str,
        model: Option<&str>,
    ) -> Result<AgentId, GatewayError>;

    /// Current status. Completed agents carry the joined assistant output.
    async fn fetch_status(&self, agent_id: &AgentId) -> Result<Agent, GatewayError>;

    async fn fetch_conversation(
        &self,
        agent_id: &AgentId,
    ) -> Result<Vec<ConversationMessage>, GatewayError>;

    async fn inject_followup(&self, agent_id: &AgentId, text: &str) -> Result<(), GatewayError>;

    async fn list_available_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError>;

    /// Bypasses a fresh cache. Gateways without a cache just list again.
    async fn refresh_targets(&self) -> Result<Vec<TargetDescriptor>, GatewayError> {
        self.list_available_targets().await
    }

    async fn invalidate_targets(&self) {}

    async fn list_agents(&self, limit: usize) -> Result<Vec<AgentSummary>, GatewayError>;
}

pub fn clamp_agent_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_AGENT_LIST_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::clamp_agent_limit;

    #[test]
    fn agent_limit_is_clamped_to_remote_bounds() {
        assert_eq!(clamp_agent_limit(0), 1);
        assert_eq!(clamp_agent_limit(20), 20);
        assert_eq!(clamp_agent_limit(500), 100);
    }
}
