use relay_core::types::{AgentId, UserId};
use relay_gateway::GatewayError;

#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error("agent {agent_id} did not finish within {timeout_secs}s")]
    Timeout { agent_id: AgentId, timeout_secs: u64 },
    #[error("agent {agent_id} failed: {message}")]
    AgentFailed { agent_id: AgentId, message: String },
    #[error("agent {agent_id} expired and no longer accepts instructions")]
    AgentExpired { agent_id: AgentId },
    #[error("invalid request: {message}")]
    InvalidRequest { message: String },
    #[error("no target repository available: {message}")]
    NoTarget { message: String },
    #[error("user {user} has no active agent")]
    NoActiveAgent { user: UserId },
    #[error("selection {index} is not in the last listing ({available} agents)")]
    UnknownSelection { index: usize, available: usize },
}

pub(crate) const AGENT_FAILED_FALLBACK: &str = "agent finished with an error";

#[cfg(test)]
mod tests {
    use super::RelayError;
    use relay_core::types::AgentId;
    use relay_gateway::GatewayError;

    #[test]
    fn gateway_errors_convert_transparently() {
        let err: RelayError = GatewayError::NotFound {
            endpoint: "/agents/a1".to_string(),
            message: "gone".to_string(),
        }
        .into();
        assert_eq!(err.to_string(), "remote endpoint not found (/agents/a1): gone");
    }

    #[test]
    fn timeout_names_agent_and_limit() {
        let err = RelayError::Timeout {
            agent_id: AgentId::new("bc-7"),
            timeout_secs: 300,
        };
        assert_eq!(err.to_string(), "agent bc-7 did not finish within 300s");
    }
}
