//! Shared types for the discovery registry and its wire surface.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Serde helper: binary columns travel as standard base-64 text.
pub(crate) mod base64_bytes {
    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(&text).map_err(D::Error::custom)
    }
}

/// A cluster's identity: one 128-bit id bound to one signing key.
///
/// The key is the DER SubjectPublicKeyInfo encoding exactly as submitted at
/// registration. It is never updated; the first writer of an id owns it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub cluster_id: Uuid,
    #[serde(with = "base64_bytes")]
    pub public_key: Vec<u8>,
}

/// The logical partition for discovery: nodes only ever see peers in their
/// own `(cluster, version name, version number)` group.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GroupKey {
    pub cluster_id: Uuid,
    pub version_name: String,
    pub version_number: i64,
}

impl fmt::Display for GroupKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.cluster_id, self.version_name, self.version_number
        )
    }
}

/// One stored discovery call. Immutable once written; removed only by the
/// eviction worker.
///
/// `encrypted_payload` carries the 4-byte server-bound nonce followed by the
/// client's ciphertext, so peers can decrypt without a separate nonce field.
/// `server_timestamp` is a process-monotonic ordinal used only for relative
/// ordering within a group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeRegistration {
    pub id: i64,
    pub cluster_id: Uuid,
    pub version_name: String,
    pub version_number: i64,
    #[serde(with = "base64_bytes")]
    pub encrypted_payload: Vec<u8>,
    pub server_timestamp: i64,
}

impl NodeRegistration {
    pub fn group(&self) -> GroupKey {
        GroupKey {
            cluster_id: self.cluster_id,
            version_name: self.version_name.clone(),
            version_number: self.version_number,
        }
    }
}

/// Body of `POST /clusters`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterClusterRequest {
    pub cluster_id: String,
    pub public_key: String,
}

/// Body of `POST /discover`. All byte-valued fields are base-64 text; the
/// admission pipeline decodes and validates them in a fixed order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub cluster_id: String,
    pub version_name: String,
    pub version_number: i64,
    pub payload: String,
    pub nonce: String,
    pub signature: String,
}

/// Body of a successful `POST /discover` response: the peer blobs, most
/// recent first, each base-64 encoded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse {
    pub nodes: Vec<String>,
}
