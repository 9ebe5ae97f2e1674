//! Per-user state supplied by the front-end: the last agent a user talked to
//! and the target they selected. Both are last-write-wins.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use relay_core::types::{AgentId, TargetDescriptor, UserId};

pub trait LastAgentStore: Send + Sync {
    fn last_agent(&self, user: UserId) -> Option<AgentId>;
    fn set_last_agent(&self, user: UserId, agent_id: AgentId);
    fn clear_last_agent(&self, user: UserId);
}

pub trait SelectedTargetStore: Send + Sync {
    fn selected_target(&self, user: UserId) -> Option<TargetDescriptor>;
    fn set_selected_target(&self, user: UserId, target: TargetDescriptor);
    fn clear_selected_target(&self, user: UserId);
}

#[derive(Debug, Default)]
pub struct InMemoryLastAgentStore {
    agents: RwLock<HashMap<UserId, AgentId>>,
}

impl InMemoryLastAgentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LastAgentStore for InMemoryLastAgentStore {
    fn last_agent(&self, user: UserId) -> Option<AgentId> {
        let agents = self.agents.read().unwrap_or_else(PoisonError::into_inner);
        agents.get(&user).cloned()
    }

    fn set_last_agent(&self, user: UserId, agent_id: AgentId) {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        agents.insert(user, agent_id);
    }

    fn clear_last_agent(&self, user: UserId) {
        let mut agents = self.agents.write().unwrap_or_else(PoisonError::into_inner);
        agents.remove(&user);
    }
}

#[derive(Debug, Default)]
pub struct InMemorySelectedTargetStore {
    targets: RwLock<HashMap<UserId, TargetDescriptor>>,
}

impl InMemorySelectedTargetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SelectedTargetStore for InMemorySelectedTargetStore {
    fn selected_target(&self, user: UserId) -> Option<TargetDescriptor> {
        let targets = self.targets.read().unwrap_or_else(PoisonError::into_inner);
        targets.get(&user).cloned()
    }

    fn set_selected_target(&self, user: UserId, target: TargetDescriptor) {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        targets.insert(user, target);
    }

    fn clear_selected_target(&self, user: UserId) {
        let mut targets = self.targets.write().unwrap_or_else(PoisonError::into_inner);
        targets.remove(&user);
    }
}

#[cfg(test)]
mod tests {
    use super::{
        InMemoryLastAgentStore, InMemorySelectedTargetStore, LastAgentStore, SelectedTargetStore,
    };
    use relay_core::types::{AgentId, TargetDescriptor, UserId};

    #[test]
    fn last_agent_is_last_write_wins() {
        let store = InMemoryLastAgentStore::new();
        let user = UserId(1);
        assert_eq!(store.last_agent(user), None);

        store.set_last_agent(user, AgentId::new("bc-1"));
        store.set_last_agent(user, AgentId::new("bc-2"));
        assert_eq!(store.last_agent(user), Some(AgentId::new("bc-2")));
        assert_eq!(store.last_agent(UserId(2)), None);

        store.clear_last_agent(user);
        assert_eq!(store.last_agent(user), None);
    }

    #[test]
    fn selected_target_is_per_user() {
        let store = InMemorySelectedTargetStore::new();
        let api = TargetDescriptor::new("acme", "api", "https://github.com/acme/api");
        store.set_selected_target(UserId(1), api.clone());

        assert_eq!(store.selected_target(UserId(1)), Some(api));
        assert_eq!(store.selected_target(UserId(2)), None);

        store.clear_selected_target(UserId(1));
        assert_eq!(store.selected_target(UserId(1)), None);
    }
}
