//! Relay between a conversational front-end and remote coding agents.

pub mod error;
pub mod poller;
pub mod progress;
pub mod reconciler;
pub mod retry;
pub mod service;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::*;
pub use poller::*;
pub use progress::*;
pub use reconciler::*;
pub use retry::*;
pub use service::*;
pub use session::*;
pub use store::*;

#[cfg(test)]
mod tests {
    use super::{
        AgentPickerSessions, FollowupOutcome, PollSettings, RelayError, RelayService,
        RetryAdvice, DEFAULT_MAX_USERS,
    };
    use relay_core::types::AgentStatus;
    use std::any::TypeId;

    #[test]
    fn crate_root_reexports_relay_types() {
        assert_eq!(TypeId::of::<RelayService>(), TypeId::of::<super::service::RelayService>());
        assert_eq!(TypeId::of::<RelayError>(), TypeId::of::<super::error::RelayError>());
        assert_eq!(AgentPickerSessions::default().max_users(), DEFAULT_MAX_USERS);
        assert_eq!(PollSettings::default().poll_interval.as_secs(), 5);
        assert_eq!(RetryAdvice::FreshWait.describe(), "wait again on the same agent");
        assert_ne!(
            FollowupOutcome::NeedsNewAgent {
                status: AgentStatus::Expired
            },
            FollowupOutcome::NeedsNewAgent {
                status: AgentStatus::Failed
            }
        );
    }
}
