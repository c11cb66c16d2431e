//! Background eviction of over-cap discovery groups.
//!
//! The admission pipeline never waits on capacity enforcement: it drops a
//! group hint on an unbounded queue and responds. A single worker consumes
//! hints sequentially and issues one set-based deletion per hint, so a group
//! may transiently exceed the cap between an insert and the next pass. The
//! cap is an eventual property, by contract.

use crate::store::RegistrationStore;
use crate::types::GroupKey;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Producer handle for eviction hints. Cheap to clone; sending never blocks.
#[derive(Clone)]
pub struct EvictionQueue {
    tx: mpsc::UnboundedSender<GroupKey>,
}

impl EvictionQueue {
    /// Fire-and-forget: request an eviction pass for the group.
    ///
    /// A send failure only means the worker is gone during shutdown; the
    /// hint is advisory and the next pass over the group would redo it.
    pub fn hint(&self, group: GroupKey) {
        if self.tx.send(group).is_err() {
            warn!("eviction queue closed, dropping hint");
        }
    }
}

/// Create the hint queue and the receiver the worker consumes.
pub fn eviction_channel() -> (EvictionQueue, mpsc::UnboundedReceiver<GroupKey>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EvictionQueue { tx }, rx)
}

/// Run the eviction worker until every producer handle is dropped.
///
/// Hints still queued at shutdown are drained before the worker returns.
/// Per-hint failures are logged and swallowed; one bad pass must not stall
/// capacity enforcement for every other group.
pub async fn run_eviction_worker(
    mut rx: mpsc::UnboundedReceiver<GroupKey>,
    store: Arc<dyn RegistrationStore>,
    max_per_group: usize,
) {
    while let Some(group) = rx.recv().await {
        match store.evict(&group, max_per_group).await {
            Ok(0) => {}
            Ok(removed) => debug!("evicted {} rows from group {}", removed, group),
            Err(e) => warn!("eviction failed for group {}: {}", group, e),
        }
    }
    info!("eviction worker stopped");
}
