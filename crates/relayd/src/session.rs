//! Agent-picker sessions: each user's most recent agent listing, kept so a
//! later reply can pick an entry by its 1-based position.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use relay_core::types::{AgentSummary, UserId};
use tracing::debug;

pub const DEFAULT_MAX_USERS: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PickError {
    NoListing,
    OutOfRange { index: usize, available: usize },
}

#[derive(Debug, Default)]
struct PickerState {
    listings: HashMap<UserId, Vec<AgentSummary>>,
    /// Least recently used first.
    recency: VecDeque<UserId>,
}

impl PickerState {
    fn touch(&mut self, user: UserId) {
        if let Some(pos) = self.recency.iter().position(|entry| *entry == user) {
            self.recency.remove(pos);
        }
        self.recency.push_back(user);
    }
}

/// Bounded LRU of agent listings keyed by user.
#[derive(Debug)]
pub struct AgentPickerSessions {
    max_users: usize,
    state: Mutex<PickerState>,
}

impl Default for AgentPickerSessions {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_USERS)
    }
}

impl AgentPickerSessions {
    pub fn new(max_users: usize) -> Self {
        Self {
            max_users: max_users.max(1),
            state: Mutex::new(PickerState::default()),
        }
    }

    pub fn max_users(&self) -> usize {
        self.max_users
    }

    pub fn len(&self) -> usize {
        self.lock().listings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remember(&self, user: UserId, agents: Vec<AgentSummary>) {
        let mut state = self.lock();
        state.listings.insert(user, agents);
        state.touch(user);
        while state.listings.len() > self.max_users {
            let Some(evicted) = state.recency.pop_front() else {
                break;
            };
            state.listings.remove(&evicted);
            debug!(user = %evicted, "evicted agent listing");
        }
    }

    pub fn listing(&self, user: UserId) -> Option<Vec<AgentSummary>> {
        self.lock().listings.get(&user).cloned()
    }

    /// Picks entry `index` (1-based) from the user's last listing.
    pub fn pick(&self, user: UserId, index: usize) -> Result<AgentSummary, PickError> {
        let mut state = self.lock();
        let listing = state.listings.get(&user).ok_or(PickError::NoListing)?;
        let picked = index
            .checked_sub(1)
            .and_then(|pos| listing.get(pos))
            .cloned()
            .ok_or(PickError::OutOfRange {
                index,
                available: listing.len(),
            })?;
        state.touch(user);
        Ok(picked)
    }

    pub fn forget(&self, user: UserId) {
        let mut state = self.lock();
        state.listings.remove(&user);
        state.recency.retain(|entry| *entry != user);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PickerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::{AgentPickerSessions, PickError};
    use relay_core::types::{AgentId, AgentSummary, UserId};

    fn listing(ids: &[&str]) -> Vec<AgentSummary> {
        ids.iter()
            .map(|id| AgentSummary {
                id: AgentId::new(*id),
                name: format!("agent {id}"),
                status: "FINISHED".to_string(),
            })
            .collect()
    }

    #[test]
    fn pick_is_one_based() {
        let sessions = AgentPickerSessions::default();
        sessions.remember(UserId(1), listing(&["a", "b", "c"]));

        assert_eq!(sessions.pick(UserId(1), 1).expect("first").id, AgentId::new("a"));
        assert_eq!(sessions.pick(UserId(1), 3).expect("third").id, AgentId::new("c"));
        assert_eq!(
            sessions.pick(UserId(1), 0),
            Err(PickError::OutOfRange {
                index: 0,
                available: 3
            })
        );
        assert_eq!(
            sessions.pick(UserId(1), 4),
            Err(PickError::OutOfRange {
                index: 4,
                available: 3
            })
        );
        assert_eq!(sessions.pick(UserId(2), 1), Err(PickError::NoListing));
    }

    #[test]
    fn least_recently_used_user_is_evicted() {
        let sessions = AgentPickerSessions::new(2);
        sessions.remember(UserId(1), listing(&["a"]));
        sessions.remember(UserId(2), listing(&["b"]));
        sessions.pick(UserId(1), 1).expect("touch user 1");
        sessions.remember(UserId(3), listing(&["c"]));

        assert_eq!(sessions.len(), 2);
        assert!(sessions.listing(UserId(1)).is_some());
        assert!(sessions.listing(UserId(2)).is_none());
        assert!(sessions.listing(UserId(3)).is_some());
    }

    #[test]
    fn newer_listing_replaces_older_one() {
        let sessions = AgentPickerSessions::new(4);
        sessions.remember(UserId(1), listing(&["a", "b"]));
        sessions.remember(UserId(1), listing(&["z"]));

        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions.pick(UserId(1), 1).expect("pick").id, AgentId::new("z"));

        sessions.forget(UserId(1));
        assert!(sessions.is_empty());
    }

    #[test]
    fn zero_capacity_still_keeps_one_user() {
        let sessions = AgentPickerSessions::new(0);
        assert_eq!(sessions.max_users(), 1);
        sessions.remember(UserId(1), listing(&["a"]));
        sessions.remember(UserId(2), listing(&["b"]));
        assert_eq!(sessions.len(), 1);
        assert!(sessions.listing(UserId(2)).is_some());
    }
}
