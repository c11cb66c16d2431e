//! Trust-on-first-use cluster key binding.
//!
//! The first writer of a cluster id owns it. Re-registration with the same
//! key bytes is an idempotent no-op; any other key is rejected. Races between
//! concurrent first writers resolve through the cluster store's atomic
//! unique-insert, not an application-level lock.

use crate::crypto;
use crate::error::RegisterError;
use crate::store::ClusterStore;
use crate::types::Cluster;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterOutcome {
    Created,
    AlreadyExists,
}

pub struct ClusterRegistrar {
    clusters: Arc<dyn ClusterStore>,
}

impl ClusterRegistrar {
    pub fn new(clusters: Arc<dyn ClusterStore>) -> Self {
        Self { clusters }
    }

    /// Bind `public_key_b64` (base-64 of a P-256 SubjectPublicKeyInfo) to
    /// `cluster_id_text`, unless another key already owns the id.
    pub async fn register(
        &self,
        cluster_id_text: &str,
        public_key_b64: &str,
    ) -> Result<RegisterOutcome, RegisterError> {
        let cluster_id =
            Uuid::parse_str(cluster_id_text).map_err(|_| RegisterError::InvalidGuidFormat)?;

        let public_key = BASE64
            .decode(public_key_b64)
            .map_err(|_| RegisterError::InvalidPublicKey)?;
        if !crypto::validate_public_key(&public_key) {
            return Err(RegisterError::InvalidPublicKey);
        }

        if let Some(existing) = self.clusters.get(cluster_id).await? {
            return if existing.public_key == public_key {
                Ok(RegisterOutcome::AlreadyExists)
            } else {
                Err(RegisterError::PublicKeyMismatch)
            };
        }

        let inserted = self
            .clusters
            .add(Cluster {
                cluster_id,
                public_key: public_key.clone(),
            })
            .await?;
        if inserted {
            info!("registered cluster {}", cluster_id);
            return Ok(RegisterOutcome::Created);
        }

        // Lost the insert race; clusters are never deleted, so the winner's
        // row is there to classify against.
        match self.clusters.get(cluster_id).await? {
            Some(existing) if existing.public_key == public_key => {
                Ok(RegisterOutcome::AlreadyExists)
            }
            _ => Err(RegisterError::PublicKeyMismatch),
        }
    }
}
