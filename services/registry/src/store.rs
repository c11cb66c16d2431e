//! Redis-backed storage for clusters and node registrations.
//!
//! Layout per registration: a JSON row at `{prefix}:reg:{id}` plus a sorted
//! set per group scored by `server_timestamp`, which serves both the
//! descending recency read and the oldest-first eviction scan. Members are
//! zero-padded surrogate ids so that equal scores order lexically the same
//! way they order numerically, keeping the eviction tie-break deterministic.
//! Cluster identities live at `{prefix}:cluster:{id}` and are only ever
//! written with `SET NX`, which is the atomic unique-insert the registrar's
//! first-writer-wins contract rests on.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use uuid::Uuid;

use beacon::types::{Cluster, GroupKey, NodeRegistration};
use beacon::{ClusterStore, MonotonicClock, RegistrationStore, StoreError};

fn store_err(e: redis::RedisError) -> StoreError {
    StoreError::Backend(e.to_string())
}

/// Sorted-set member for a surrogate id. Zero-padded so lexical order under
/// a score tie equals numeric id order.
fn member(id: i64) -> String {
    format!("{:020}", id)
}

#[derive(Clone)]
pub struct RedisClusterStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisClusterStore {
    pub fn new(conn: ConnectionManager, key_prefix: &str) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.to_string(),
        }
    }

    fn cluster_key(&self, cluster_id: Uuid) -> String {
        format!("{}:cluster:{}", self.key_prefix, cluster_id)
    }
}

#[async_trait]
impl ClusterStore for RedisClusterStore {
    async fn get(&self, cluster_id: Uuid) -> Result<Option<Cluster>, StoreError> {
        let mut conn = self.conn.clone();
        let json: Option<String> = conn
            .get(self.cluster_key(cluster_id))
            .await
            .map_err(store_err)?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn add(&self, cluster: Cluster) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let json = serde_json::to_string(&cluster)?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(self.cluster_key(cluster.cluster_id))
            .arg(&json)
            .arg("NX")
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;
        Ok(reply.is_some())
    }
}

pub struct RedisRegistrationStore {
    conn: ConnectionManager,
    key_prefix: String,
    clock: MonotonicClock,
}

impl RedisRegistrationStore {
    pub fn new(conn: ConnectionManager, key_prefix: &str) -> Self {
        Self {
            conn,
            key_prefix: key_prefix.to_string(),
            clock: MonotonicClock::new(),
        }
    }

    fn sequence_key(&self) -> String {
        format!("{}:reg:seq", self.key_prefix)
    }

    fn registration_key(&self, member: &str) -> String {
        format!("{}:reg:{}", self.key_prefix, member)
    }

    /// Group index key. The version name is URL-safe base-64 encoded because
    /// it is caller-controlled text and must not collide with the key's
    /// separator characters.
    fn group_key(&self, group: &GroupKey) -> String {
        format!(
            "{}:group:{}:{}:{}",
            self.key_prefix,
            group.cluster_id,
            URL_SAFE_NO_PAD.encode(&group.version_name),
            group.version_number
        )
    }
}

#[async_trait]
impl RegistrationStore for RedisRegistrationStore {
    async fn add(
        &self,
        group: &GroupKey,
        encrypted_payload: Vec<u8>,
    ) -> Result<NodeRegistration, StoreError> {
        let mut conn = self.conn.clone();

        let id: i64 = conn.incr(self.sequence_key(), 1).await.map_err(store_err)?;
        let registration = NodeRegistration {
            id,
            cluster_id: group.cluster_id,
            version_name: group.version_name.clone(),
            version_number: group.version_number,
            encrypted_payload,
            server_timestamp: self.clock.next(),
        };

        let member = member(id);
        let json = serde_json::to_string(&registration)?;
        let _: () = redis::pipe()
            .atomic()
            .set(self.registration_key(&member), &json)
            .zadd(self.group_key(group), &member, registration.server_timestamp)
            .query_async(&mut conn)
            .await
            .map_err(store_err)?;

        Ok(registration)
    }

    async fn recent(
        &self,
        group: &GroupKey,
        max: usize,
    ) -> Result<Vec<NodeRegistration>, StoreError> {
        if max == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();

        let members: Vec<String> = conn
            .zrevrange(self.group_key(group), 0, max as isize - 1)
            .await
            .map_err(store_err)?;
        if members.is_empty() {
            return Ok(Vec::new());
        }

        let keys: Vec<String> = members.iter().map(|m| self.registration_key(m)).collect();
        let rows: Vec<Option<String>> = conn.mget(&keys).await.map_err(store_err)?;

        // A row may vanish between the index read and the fetch when the
        // eviction worker races ahead; skipping it preserves ordering.
        rows.into_iter()
            .flatten()
            .map(|json| serde_json::from_str(&json).map_err(StoreError::from))
            .collect()
    }

    async fn evict(&self, group: &GroupKey, max_per_group: usize) -> Result<u64, StoreError> {
        let mut conn = self.conn.clone();
        let group_key = self.group_key(group);

        let count: isize = conn.zcard(&group_key).await.map_err(store_err)?;
        let excess = count - max_per_group as isize;
        if excess <= 0 {
            return Ok(0);
        }

        let oldest: Vec<String> = conn
            .zrange(&group_key, 0, excess - 1)
            .await
            .map_err(store_err)?;

        let mut pipe = redis::pipe();
        pipe.atomic();
        for member in &oldest {
            pipe.del(self.registration_key(member));
            pipe.zrem(&group_key, member);
        }
        let _: () = pipe.query_async(&mut conn).await.map_err(store_err)?;

        Ok(oldest.len() as u64)
    }
}
