//! In-memory store implementations.
//!
//! A single mutex over a map per store; group ordering falls out of append
//! order because the clock ordinal strictly increases. Used by the test
//! suites and by deployments running without a backing service. Capacity is
//! enforced by the same asynchronous eviction pass as the durable backend,
//! so the observable contract is identical.

use crate::store::{ClusterStore, MonotonicClock, RegistrationStore, StoreError};
use crate::types::{Cluster, GroupKey, NodeRegistration};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryClusterStore {
    clusters: Mutex<HashMap<Uuid, Cluster>>,
}

impl MemoryClusterStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterStore for MemoryClusterStore {
    async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>, StoreError> {
        let clusters = self.clusters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(clusters.get(&cluster_id).cloned())
    }

    async fn add(&self, cluster: Cluster) -> Result<bool, StoreError> {
        let mut clusters = self.clusters.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        if clusters.contains_key(&cluster.cluster_id) {
            return Ok(false);
        }
        clusters.insert(cluster.cluster_id, cluster);
        Ok(true)
    }
}

struct RegistrationState {
    next_id: i64,
    /// Rows per group, ascending by `(server_timestamp, id)` by construction:
    /// ids and ordinals are both assigned under this lock and only appended.
    groups: HashMap<GroupKey, Vec<NodeRegistration>>,
}

pub struct MemoryRegistrationStore {
    state: Mutex<RegistrationState>,
    clock: MonotonicClock,
}

impl MemoryRegistrationStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistrationState {
                next_id: 1,
                groups: HashMap::new(),
            }),
            clock: MonotonicClock::new(),
        }
    }
}

impl Default for MemoryRegistrationStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RegistrationStore for MemoryRegistrationStore {
    async fn add(
        &self,
        group: &GroupKey,
        encrypted_payload: Vec<u8>,
    ) -> Result<NodeRegistration, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let id = state.next_id;
        state.next_id += 1;
        let registration = NodeRegistration {
            id,
            cluster_id: group.cluster_id,
            version_name: group.version_name.clone(),
            version_number: group.version_number,
            encrypted_payload,
            server_timestamp: self.clock.next(),
        };
        state
            .groups
            .entry(group.clone())
            .or_default()
            .push(registration.clone());
        Ok(registration)
    }

    async fn recent(
        &self,
        group: &GroupKey,
        max: usize,
    ) -> Result<Vec<NodeRegistration>, StoreError> {
        let state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let rows = match state.groups.get(group) {
            Some(rows) => rows,
            None => return Ok(Vec::new()),
        };
        Ok(rows.iter().rev().take(max).cloned().collect())
    }

    async fn evict(&self, group: &GroupKey, max_per_group: usize) -> Result<u64, StoreError> {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        let Some(rows) = state.groups.get_mut(group) else {
            return Ok(0);
        };
        if rows.len() <= max_per_group {
            return Ok(0);
        }
        let excess = rows.len() - max_per_group;
        rows.drain(..excess);
        Ok(excess as u64)
    }
}
