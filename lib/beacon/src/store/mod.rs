//! Storage contracts for clusters and node registrations.
//!
//! Two narrow interfaces with two interchangeable implementations each: the
//! in-memory stores in this crate (tests, single-node deployments without a
//! backing service) and the Redis stores in the registry service. The core
//! relies only on the observable contract spelled out here — unique-insert
//! atomicity, read ordering, and set-based eviction — never on anything one
//! backend happens to enforce beyond it.

pub mod memory;

use crate::types::{Cluster, GroupKey, NodeRegistration};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage backend error: {0}")]
    Backend(String),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Cluster identity storage.
#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>, StoreError>;

    /// Insert the cluster unless its id already exists.
    ///
    /// Returns `false` when a row with the same id is already present. The
    /// check and the insert are atomic: of two concurrent `add` calls with
    /// the same id, exactly one returns `true` and exactly one row persists.
    /// Concurrent registration races resolve through this property alone.
    async fn add(&self, cluster: Cluster) -> Result<bool, StoreError>;
}

/// Node registration storage, partitioned by group.
#[async_trait]
pub trait RegistrationStore: Send + Sync {
    /// Persist a registration. The store assigns the surrogate id and the
    /// `server_timestamp` ordinal at insert time and returns the stored row.
    async fn add(
        &self,
        group: &GroupKey,
        encrypted_payload: Vec<u8>,
    ) -> Result<NodeRegistration, StoreError>;

    /// Up to `max` most recent rows in the group, strictly descending by
    /// `server_timestamp`. A timestamp tie may resolve in any total order
    /// consistent with the surrogate id.
    async fn recent(
        &self,
        group: &GroupKey,
        max: usize,
    ) -> Result<Vec<NodeRegistration>, StoreError>;

    /// Set-based deletion: when the group holds more than `max_per_group`
    /// rows, remove the excess, oldest `server_timestamp` first, ties broken
    /// by lower surrogate id first. Returns the number of rows removed.
    async fn evict(&self, group: &GroupKey, max_per_group: usize) -> Result<u64, StoreError>;
}

/// Strictly increasing per-process ordinal seeded from the wall clock.
///
/// `server_timestamp` only orders rows relative to each other, so wall-clock
/// microseconds are fine as long as successive calls never tie or go
/// backwards; when the clock stalls or steps back, the counter advances past
/// the last issued value instead.
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    /// Next ordinal: `max(now_micros, last + 1)`.
    pub fn next(&self) -> i64 {
        let now = Utc::now().timestamp_micros();
        let mut last = self.last.load(Ordering::Relaxed);
        loop {
            let candidate = i64::max(last + 1, now);
            match self.last.compare_exchange_weak(
                last,
                candidate,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return candidate,
                Err(observed) => last = observed,
            }
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
