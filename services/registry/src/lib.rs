//! Beacon Registry - Encrypted Cluster Discovery Service
//!
//! Nodes of independently operated clusters register opaque encrypted blobs
//! and receive the recent blobs of peers in their version group. Requests
//! are authenticated against the cluster's registered P-256 key; the
//! registry never decrypts anything it stores or relays.

#![cfg_attr(
    test,
    allow(clippy::unwrap_used, clippy::expect_used, clippy::unwrap_in_result)
)]

pub mod config;
pub mod handlers;
pub mod server;
pub mod store;

pub use config::Settings;
pub use server::{create_router, run};
pub use store::{RedisClusterStore, RedisRegistrationStore};
