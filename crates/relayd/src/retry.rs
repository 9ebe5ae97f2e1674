//! Retry advice: what a caller may do after a failed relay operation.
//!
//! Nothing in the relay retries on its own. Front-ends read the advice and
//! decide whether to back off, wait again, start a new agent or ask the user.

use std::time::Duration;

use relay_gateway::GatewayError;
use serde::Serialize;

use crate::error::RelayError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "advice", rename_all = "snake_case")]
pub enum RetryAdvice {
    NotRetryable,
    /// Repeat the same call once the remote quota recovers.
    AfterBackoff { retry_after_secs: Option<u64> },
    /// Transient transport failure; the same call may simply be repeated.
    RetryOperation,
    /// The agent may still be working; waiting again on the same id is safe.
    FreshWait,
    /// The agent cannot take more instructions.
    CreateNewAgent,
    NeedsUserAction,
}

impl RetryAdvice {
    pub fn for_error(err: &RelayError) -> Self {
        match err {
            RelayError::Gateway(inner) => Self::for_gateway(inner),
            RelayError::Timeout { .. } => Self::FreshWait,
            RelayError::AgentFailed { .. } | RelayError::AgentExpired { .. } => {
                Self::CreateNewAgent
            }
            RelayError::InvalidRequest { .. }
            | RelayError::NoTarget { .. }
            | RelayError::NoActiveAgent { .. }
            | RelayError::UnknownSelection { .. } => Self::NeedsUserAction,
        }
    }

    pub fn for_gateway(err: &GatewayError) -> Self {
        match err {
            GatewayError::Access { .. } => Self::NeedsUserAction,
            GatewayError::RateLimited {
                retry_after_secs, ..
            } => Self::AfterBackoff {
                retry_after_secs: *retry_after_secs,
            },
            GatewayError::Network { .. } => Self::RetryOperation,
            GatewayError::Conflict { .. } => Self::CreateNewAgent,
            GatewayError::NotFound { .. }
            | GatewayError::Remote { .. }
            | GatewayError::Client { .. } => Self::NotRetryable,
        }
    }

    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::AfterBackoff { .. } | Self::RetryOperation | Self::FreshWait
        )
    }

    /// Suggested pause before retrying, when the remote named one.
    pub fn backoff(self) -> Option<Duration> {
        match self {
            Self::AfterBackoff {
                retry_after_secs: Some(secs),
            } => Some(Duration::from_secs(secs)),
            _ => None,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::NotRetryable => "not retryable",
            Self::AfterBackoff { .. } => "retry after the rate limit window",
            Self::RetryOperation => "retry the same operation",
            Self::FreshWait => "wait again on the same agent",
            Self::CreateNewAgent => "start a new agent",
            Self::NeedsUserAction => "needs user action",
        }
    }
}

impl RelayError {
    pub fn retry_advice(&self) -> RetryAdvice {
        RetryAdvice::for_error(self)
    }
}
