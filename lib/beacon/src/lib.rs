//! Beacon - Encrypted Cluster Discovery
//!
//! Lets nodes of independently operated clusters find each other without
//! revealing node identity or network coordinates to the registry. Clusters
//! own an ECDSA P-256 signing key; nodes submit encrypted blobs the registry
//! stores and relays verbatim. The registry authenticates by signature and
//! decrypts nothing.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod crypto;
pub mod discovery;
pub mod error;
pub mod eviction;
pub mod registrar;
pub mod replay;
pub mod store;
pub mod types;

pub use discovery::{DiscoveryService, MAX_PAYLOAD_BYTES, NONCE_LEN};
pub use error::{DiscoverError, RegisterError};
pub use eviction::{EvictionQueue, eviction_channel, run_eviction_worker};
pub use registrar::{ClusterRegistrar, RegisterOutcome};
pub use replay::ReplayCache;
pub use store::memory::{MemoryClusterStore, MemoryRegistrationStore};
pub use store::{ClusterStore, MonotonicClock, RegistrationStore, StoreError};
pub use types::{Cluster, DiscoverRequest, GroupKey, NodeRegistration, RegisterClusterRequest};
