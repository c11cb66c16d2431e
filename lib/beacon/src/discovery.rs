//! Admission pipeline for discovery requests.
//!
//! The steps run in a fixed order and short-circuit on the first failure:
//! later steps either need data produced earlier (the cluster's key, the
//! decoded nonce) or expose a different failure class to the caller. The
//! peer read deliberately precedes the insert so a caller never receives its
//! own just-written registration.

use crate::crypto;
use crate::error::DiscoverError;
use crate::eviction::EvictionQueue;
use crate::replay::ReplayCache;
use crate::store::{ClusterStore, RegistrationStore};
use crate::types::{DiscoverRequest, GroupKey};
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// Server-bound nonce length, prepended to every stored payload.
pub const NONCE_LEN: usize = 4;

/// Upper bound on the client ciphertext, excluding the nonce prefix.
pub const MAX_PAYLOAD_BYTES: usize = 10 * 1024;

/// Upper bound on `version_name`, in UTF-16 code units (the unit the wire
/// contract counts in).
const MAX_VERSION_NAME_UNITS: usize = 255;

pub struct DiscoveryService {
    clusters: Arc<dyn ClusterStore>,
    registrations: Arc<dyn RegistrationStore>,
    replay: Arc<ReplayCache>,
    eviction: EvictionQueue,
    max_per_group: usize,
}

impl DiscoveryService {
    pub fn new(
        clusters: Arc<dyn ClusterStore>,
        registrations: Arc<dyn RegistrationStore>,
        replay: Arc<ReplayCache>,
        eviction: EvictionQueue,
        max_per_group: usize,
    ) -> Self {
        Self {
            clusters,
            registrations,
            replay,
            eviction,
            max_per_group,
        }
    }

    /// Admit one discovery request: authenticate, persist the caller's blob,
    /// and return the recent peer blobs of its group, most recent first.
    pub async fn discover(&self, request: &DiscoverRequest) -> Result<Vec<String>, DiscoverError> {
        let cluster_id = Uuid::parse_str(&request.cluster_id)
            .map_err(|_| DiscoverError::InvalidGuidFormat)?;

        let cluster = self
            .clusters
            .get(cluster_id)
            .await?
            .ok_or(DiscoverError::ClusterNotFound)?;

        let payload = BASE64
            .decode(&request.payload)
            .map_err(|_| DiscoverError::InvalidBase64)?;
        let nonce = BASE64
            .decode(&request.nonce)
            .map_err(|_| DiscoverError::InvalidBase64)?;
        let signature = BASE64
            .decode(&request.signature)
            .map_err(|_| DiscoverError::InvalidBase64)?;

        if nonce.len() != NONCE_LEN {
            return Err(DiscoverError::InvalidNonceSize);
        }
        if payload.len() > MAX_PAYLOAD_BYTES {
            return Err(DiscoverError::PayloadTooLarge);
        }
        if request.version_name.is_empty()
            || request.version_name.encode_utf16().count() > MAX_VERSION_NAME_UNITS
        {
            return Err(DiscoverError::InvalidPayload);
        }

        // Recorded even when a later step fails: a valid signature over a
        // replayed nonce is still a replay, and an invalid signature merely
        // burns a nonce the client never committed to.
        if !self
            .replay
            .check_and_record(&request.nonce, &request.signature)
        {
            debug!("replayed fingerprint for cluster {}", cluster_id);
            return Err(DiscoverError::ReplayAttackDetected);
        }

        if !crypto::verify(&cluster.public_key, signed_message(request).as_bytes(), &signature) {
            return Err(DiscoverError::SignatureVerificationFailed);
        }

        let group = GroupKey {
            cluster_id,
            version_name: request.version_name.clone(),
            version_number: request.version_number,
        };

        let peers = self
            .registrations
            .recent(&group, self.max_per_group)
            .await?;

        let mut blob = Vec::with_capacity(NONCE_LEN + payload.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&payload);
        self.registrations.add(&group, blob).await?;

        self.eviction.hint(group);

        Ok(peers
            .into_iter()
            .map(|peer| BASE64.encode(&peer.encrypted_payload))
            .collect())
    }
}

/// The signed byte string: UTF-8 of the exact concatenation
/// `cluster_id ‖ version_name ‖ decimal(version_number) ‖ payload_b64 ‖ nonce_b64`,
/// no separators, with the cluster id exactly as transmitted.
fn signed_message(request: &DiscoverRequest) -> String {
    format!(
        "{}{}{}{}{}",
        request.cluster_id,
        request.version_name,
        request.version_number,
        request.payload,
        request.nonce
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eviction::eviction_channel;
    use crate::store::memory::{MemoryClusterStore, MemoryRegistrationStore};
    use crate::types::Cluster;
    use p256::ecdsa::{Signature, SigningKey, signature::Signer};
    use p256::pkcs8::EncodePublicKey;
    use rand_core::OsRng;
    use std::time::Duration;

    const CLUSTER_ID: &str = "f47ac10b-58cc-4372-a567-0e02b2c3d479";

    struct Harness {
        service: DiscoveryService,
        registrations: Arc<MemoryRegistrationStore>,
        signing_key: SigningKey,
    }

    async fn harness() -> Harness {
        let signing_key = SigningKey::random(&mut OsRng);
        let clusters = Arc::new(MemoryClusterStore::new());
        clusters
            .add(Cluster {
                cluster_id: CLUSTER_ID.parse().unwrap(),
                public_key: signing_key
                    .verifying_key()
                    .to_public_key_der()
                    .unwrap()
                    .into_vec(),
            })
            .await
            .unwrap();

        let registrations = Arc::new(MemoryRegistrationStore::new());
        let (eviction, rx) = eviction_channel();
        // The admission pipeline never waits on eviction; tests that need the
        // cap enforced drive the store directly.
        drop(rx);

        let service = DiscoveryService::new(
            clusters,
            registrations.clone(),
            Arc::new(ReplayCache::new(Duration::from_secs(60))),
            eviction,
            5,
        );
        Harness {
            service,
            registrations,
            signing_key,
        }
    }

    fn signed_request(
        signing_key: &SigningKey,
        version_name: &str,
        version_number: i64,
        payload: &[u8],
        nonce: &[u8],
    ) -> DiscoverRequest {
        let payload_b64 = BASE64.encode(payload);
        let nonce_b64 = BASE64.encode(nonce);
        let message = format!(
            "{}{}{}{}{}",
            CLUSTER_ID, version_name, version_number, payload_b64, nonce_b64
        );
        let signature: Signature = signing_key.sign(message.as_bytes());
        DiscoverRequest {
            cluster_id: CLUSTER_ID.to_string(),
            version_name: version_name.to_string(),
            version_number,
            payload: payload_b64,
            nonce: nonce_b64,
            signature: BASE64.encode(signature.to_bytes()),
        }
    }

    fn group(version_name: &str, version_number: i64) -> GroupKey {
        GroupKey {
            cluster_id: CLUSTER_ID.parse().unwrap(),
            version_name: version_name.to_string(),
            version_number,
        }
    }

    // ==================== Happy Path ====================

    #[tokio::test]
    async fn test_first_discover_returns_no_peers_and_persists_framed_blob() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, "prod", 1, &[0xAB; 64], &[1, 2, 3, 4]);

        let nodes = h.service.discover(&request).await.unwrap();
        assert!(nodes.is_empty());

        let rows = h.registrations.recent(&group("prod", 1), 10).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].encrypted_payload.len(), 68);
        assert_eq!(&rows[0].encrypted_payload[..4], &[1, 2, 3, 4]);
        assert_eq!(&rows[0].encrypted_payload[4..], &[0xAB; 64]);
    }

    #[tokio::test]
    async fn test_second_discover_sees_first_blob_with_nonce_prefix() {
        let h = harness().await;
        let first = signed_request(&h.signing_key, "prod", 1, &[0xAA; 16], &[9, 9, 9, 9]);
        h.service.discover(&first).await.unwrap();

        let second = signed_request(&h.signing_key, "prod", 1, &[0xBB; 16], &[8, 8, 8, 8]);
        let nodes = h.service.discover(&second).await.unwrap();
        assert_eq!(nodes.len(), 1);

        let blob = BASE64.decode(&nodes[0]).unwrap();
        assert_eq!(&blob[..4], &[9, 9, 9, 9]);
        assert_eq!(&blob[4..], &[0xAA; 16]);
    }

    #[tokio::test]
    async fn test_caller_never_sees_its_own_registration() {
        let h = harness().await;
        for i in 0..3u8 {
            let request =
                signed_request(&h.signing_key, "prod", 1, &[i; 8], &[i, i, i, i.wrapping_add(1)]);
            let nodes = h.service.discover(&request).await.unwrap();
            assert_eq!(nodes.len(), i as usize);
            for node in nodes {
                let blob = BASE64.decode(node).unwrap();
                assert_ne!(&blob[4..], &[i; 8]);
            }
        }
    }

    #[tokio::test]
    async fn test_peer_list_is_capped_and_most_recent_first() {
        let h = harness().await;
        for i in 0..7u8 {
            let request = signed_request(&h.signing_key, "prod", 1, &[i; 8], &[0, 0, i, 1]);
            h.service.discover(&request).await.unwrap();
        }
        let request = signed_request(&h.signing_key, "prod", 1, &[0xFF; 8], &[0, 0, 0xFF, 1]);
        let nodes = h.service.discover(&request).await.unwrap();
        assert_eq!(nodes.len(), 5);
        let newest = BASE64.decode(&nodes[0]).unwrap();
        assert_eq!(&newest[4..], &[6u8; 8]);
    }

    #[tokio::test]
    async fn test_version_groups_are_isolated() {
        let h = harness().await;
        let v1 = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[1, 0, 0, 0]);
        h.service.discover(&v1).await.unwrap();

        let v2 = signed_request(&h.signing_key, "prod", 2, &[2; 8], &[2, 0, 0, 0]);
        assert!(h.service.discover(&v2).await.unwrap().is_empty());

        let other_name = signed_request(&h.signing_key, "canary", 1, &[3; 8], &[3, 0, 0, 0]);
        assert!(h.service.discover(&other_name).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_negative_version_numbers_are_permitted() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, "prod", -7, &[1; 8], &[4, 0, 0, 0]);
        assert!(h.service.discover(&request).await.unwrap().is_empty());
        assert_eq!(
            h.registrations.recent(&group("prod", -7), 10).await.unwrap().len(),
            1
        );
    }

    // ==================== Validation Order & Failure Classes ====================

    #[tokio::test]
    async fn test_malformed_cluster_id() {
        let h = harness().await;
        let mut request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[5, 0, 0, 0]);
        request.cluster_id = "not-a-guid".to_string();
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::InvalidGuidFormat)
        ));
    }

    #[tokio::test]
    async fn test_unknown_cluster() {
        let h = harness().await;
        let mut request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[6, 0, 0, 0]);
        request.cluster_id = "00000000-0000-4000-8000-000000000000".to_string();
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::ClusterNotFound)
        ));
    }

    #[tokio::test]
    async fn test_invalid_base64_fields() {
        let h = harness().await;
        for field in ["payload", "nonce", "signature"] {
            let mut request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[7, 0, 0, 0]);
            match field {
                "payload" => request.payload = "%%%".to_string(),
                "nonce" => request.nonce = "%%%".to_string(),
                _ => request.signature = "%%%".to_string(),
            }
            assert!(
                matches!(
                    h.service.discover(&request).await,
                    Err(DiscoverError::InvalidBase64)
                ),
                "field {} should fail base64 decoding",
                field
            );
        }
    }

    #[tokio::test]
    async fn test_wrong_nonce_size() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[1, 2, 3]);
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::InvalidNonceSize)
        ));
        let request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[1, 2, 3, 4, 5]);
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::InvalidNonceSize)
        ));
    }

    #[tokio::test]
    async fn test_oversized_payload() {
        let h = harness().await;
        let request = signed_request(
            &h.signing_key,
            "prod",
            1,
            &vec![0u8; MAX_PAYLOAD_BYTES + 1],
            &[8, 0, 0, 0],
        );
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::PayloadTooLarge)
        ));
    }

    #[tokio::test]
    async fn test_payload_at_limit_is_accepted() {
        let h = harness().await;
        let request = signed_request(
            &h.signing_key,
            "prod",
            1,
            &vec![0u8; MAX_PAYLOAD_BYTES],
            &[8, 1, 0, 0],
        );
        assert!(h.service.discover(&request).await.is_ok());
    }

    #[tokio::test]
    async fn test_empty_version_name() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, "", 1, &[1; 8], &[9, 0, 0, 0]);
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::InvalidPayload)
        ));
    }

    #[tokio::test]
    async fn test_overlong_version_name() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, &"v".repeat(256), 1, &[1; 8], &[9, 1, 0, 0]);
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::InvalidPayload)
        ));
    }

    // ==================== Replay & Signature ====================

    #[tokio::test]
    async fn test_replayed_request_is_rejected_without_second_insert() {
        let h = harness().await;
        let request = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[10, 0, 0, 0]);
        h.service.discover(&request).await.unwrap();
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::ReplayAttackDetected)
        ));
        assert_eq!(h.registrations.recent(&group("prod", 1), 10).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_same_nonce_different_signature_both_succeed() {
        let h = harness().await;
        let nonce = [11u8, 0, 0, 0];
        let first = signed_request(&h.signing_key, "prod", 1, &[1; 8], &nonce);
        let second = signed_request(&h.signing_key, "prod", 1, &[2; 8], &nonce);
        h.service.discover(&first).await.unwrap();
        h.service.discover(&second).await.unwrap();
    }

    #[tokio::test]
    async fn test_tampering_any_signed_field_fails_verification() {
        // Fresh fingerprints throughout: tampered requests burn new nonces
        // rather than tripping the replay check first.
        let h = harness().await;

        let mut tampered = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[12, 0, 0, 0]);
        tampered.version_name = "prud".to_string();
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));

        let mut tampered = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[13, 0, 0, 0]);
        tampered.version_number = 2;
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));

        let mut tampered = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[14, 0, 0, 0]);
        tampered.payload = BASE64.encode([2u8; 8]);
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));

        let mut tampered = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[15, 0, 0, 0]);
        tampered.nonce = BASE64.encode([15u8, 0, 0, 1]);
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));

        assert!(h.registrations.recent(&group("prod", 1), 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signature_from_foreign_key_fails() {
        let h = harness().await;
        let impostor = SigningKey::random(&mut OsRng);
        let request = signed_request(&impostor, "prod", 1, &[1; 8], &[16, 0, 0, 0]);
        assert!(matches!(
            h.service.discover(&request).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));
    }

    #[tokio::test]
    async fn test_failed_signature_burns_the_fingerprint() {
        let h = harness().await;
        let mut tampered = signed_request(&h.signing_key, "prod", 1, &[1; 8], &[17, 0, 0, 0]);
        tampered.version_name = "prud".to_string();
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::SignatureVerificationFailed)
        ));
        // The identical resubmission now trips the replay check instead.
        assert!(matches!(
            h.service.discover(&tampered).await,
            Err(DiscoverError::ReplayAttackDetected)
        ));
    }
}
