//! Per-gateway caches: the target listing and the status-change log.
//!
//! The listing endpoint allows roughly one request per minute, so each gateway
//! owns a [`TargetCache`]. Values are replaced whole on refresh and readers
//! only ever see a complete snapshot.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard, PoisonError};
use std::time::Duration;

use relay_core::types::{AgentId, AgentStatus, TargetDescriptor};
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::GatewayError;

#[derive(Debug, Clone)]
pub struct CachedTargets {
    pub targets: Arc<Vec<TargetDescriptor>>,
    pub fetched_at: Instant,
}

impl CachedTargets {
    pub fn age(&self) -> Duration {
        self.fetched_at.elapsed()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheMode {
    /// Serve a fresh cached value when one exists.
    PreferCache,
    /// Always hit the remote, still degrading to the cache on rate limits.
    Refresh,
}

#[derive(Debug)]
pub struct TargetCache {
    ttl: Duration,
    slot: RwLock<Option<CachedTargets>>,
    refresh_lock: Mutex<()>,
}

impl TargetCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            slot: RwLock::new(None),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn snapshot(&self) -> Option<CachedTargets> {
        self.slot.read().await.clone()
    }

    pub async fn fresh(&self) -> Option<Arc<Vec<TargetDescriptor>>> {
        let guard = self.slot.read().await;
        guard
            .as_ref()
            .filter(|cached| cached.age() < self.ttl)
            .map(|cached| Arc::clone(&cached.targets))
    }

    pub async fn store(&self, targets: Vec<TargetDescriptor>) -> Arc<Vec<TargetDescriptor>> {
        let targets = Arc::new(targets);
        let mut guard = self.slot.write().await;
        *guard = Some(CachedTargets {
            targets: Arc::clone(&targets),
            fetched_at: Instant::now(),
        });
        targets
    }

    pub async fn invalidate(&self) {
        *self.slot.write().await = None;
    }

    /// Returns cached targets or fetches them. Concurrent misses share one
    /// remote call. Rate limit and network failures fall back to any cached
    /// value regardless of age.
    pub async fn get_or_fetch<F, Fut>(
        &self,
        mode: CacheMode,
        fetch: F,
    ) -> Result<Arc<Vec<TargetDescriptor>>, GatewayError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<TargetDescriptor>, GatewayError>>,
    {
        if mode == CacheMode::PreferCache {
            if let Some(targets) = self.fresh().await {
                debug!(count = targets.len(), "serving cached targets");
                return Ok(targets);
            }
        }

        let _refresh = self.refresh_lock.lock().await;
        if mode == CacheMode::PreferCache {
            if let Some(targets) = self.fresh().await {
                return Ok(targets);
            }
        }

        match fetch().await {
            Ok(targets) => {
                debug!(count = targets.len(), "refreshed target cache");
                Ok(self.store(targets).await)
            }
            Err(err) if err.allows_stale_read() => match self.snapshot().await {
                Some(cached) => {
                    warn!(
                        age_secs = cached.age().as_secs_f64(),
                        ttl_secs = self.ttl.as_secs(),
                        error = %err,
                        "target listing unavailable, serving cached targets"
                    );
                    Ok(cached.targets)
                }
                None => Err(err),
            },
            Err(err) => Err(err),
        }
    }
}

pub const DEFAULT_STATUS_LOG_TTL: Duration = Duration::from_secs(3600);
pub const DEFAULT_STATUS_LOG_CAPACITY: usize = 1024;

#[derive(Debug, Clone, Copy)]
struct LoggedStatus {
    status: AgentStatus,
    seen_at: Instant,
}

/// Last status logged per agent, so a status is reported once per change.
/// Entries expire after `ttl`; past `capacity` the oldest entry is evicted.
#[derive(Debug)]
pub struct StatusLog {
    ttl: Duration,
    capacity: usize,
    entries: StdMutex<HashMap<AgentId, LoggedStatus>>,
}

impl Default for StatusLog {
    fn default() -> Self {
        Self::new(DEFAULT_STATUS_LOG_TTL, DEFAULT_STATUS_LOG_CAPACITY)
    }
}

impl StatusLog {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity: capacity.max(1),
            entries: StdMutex::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Records `status` and reports whether it differs from the last logged
    /// one still held for the agent.
    pub fn record(&self, agent_id: &AgentId, status: AgentStatus) -> bool {
        let now = Instant::now();
        let mut entries = self.lock();
        let unchanged = entries.get(agent_id).is_some_and(|logged| {
            logged.status == status && now.saturating_duration_since(logged.seen_at) < self.ttl
        });
        if unchanged {
            return false;
        }

        if !entries.contains_key(agent_id) && entries.len() >= self.capacity {
            let ttl = self.ttl;
            entries.retain(|_, logged| now.saturating_duration_since(logged.seen_at) < ttl);
            if entries.len() >= self.capacity {
                let oldest = entries
                    .iter()
                    .min_by_key(|(_, logged)| logged.seen_at)
                    .map(|(id, _)| id.clone());
                if let Some(oldest) = oldest {
                    entries.remove(&oldest);
                }
            }
        }
        entries.insert(
            agent_id.clone(),
            LoggedStatus {
                status,
                seen_at: now,
            },
        );
        true
    }

    pub fn invalidate(&self, agent_id: &AgentId) {
        self.lock().remove(agent_id);
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<AgentId, LoggedStatus>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
