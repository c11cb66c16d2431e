//! Error taxonomies for the two registry operations.
//!
//! Both sets are closed: every variant maps to exactly one wire token (and,
//! at the HTTP boundary, one status code). The mapping is part of the public
//! contract and must not drift.

use crate::store::StoreError;
use thiserror::Error;

/// Failures of the discover admission pipeline, in the order the pipeline
/// can produce them.
#[derive(Debug, Error)]
pub enum DiscoverError {
    #[error("cluster id is not a valid guid")]
    InvalidGuidFormat,
    #[error("cluster is not registered")]
    ClusterNotFound,
    #[error("request field is not valid base64")]
    InvalidBase64,
    #[error("nonce must be exactly 4 bytes")]
    InvalidNonceSize,
    #[error("encrypted payload exceeds the size limit")]
    PayloadTooLarge,
    #[error("version name is required")]
    InvalidPayload,
    #[error("signature verification failed")]
    SignatureVerificationFailed,
    #[error("replay attack detected")]
    ReplayAttackDetected,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl DiscoverError {
    /// Short machine-readable token carried in the HTTP error body.
    pub fn token(&self) -> &'static str {
        match self {
            DiscoverError::InvalidGuidFormat => "invalid_guid_format",
            DiscoverError::ClusterNotFound => "cluster_not_found",
            DiscoverError::InvalidBase64 => "invalid_base64",
            DiscoverError::InvalidNonceSize => "nonce_must_be_4_bytes",
            DiscoverError::PayloadTooLarge => "payload_too_large",
            DiscoverError::InvalidPayload => "version_name_required",
            DiscoverError::SignatureVerificationFailed => "signature_verification_failed",
            DiscoverError::ReplayAttackDetected => "replay_attack_detected",
            DiscoverError::Storage(_) => "internal_error",
        }
    }
}

/// Failures of cluster registration.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("cluster id is not a valid guid")]
    InvalidGuidFormat,
    #[error("public key is not a valid P-256 key encoding")]
    InvalidPublicKey,
    #[error("cluster is already registered with a different key")]
    PublicKeyMismatch,
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl RegisterError {
    /// Short machine-readable token carried in the HTTP error body.
    pub fn token(&self) -> &'static str {
        match self {
            RegisterError::InvalidGuidFormat => "invalid_guid_format",
            RegisterError::InvalidPublicKey => "invalid_public_key",
            RegisterError::PublicKeyMismatch => "public_key_mismatch",
            RegisterError::Storage(_) => "internal_error",
        }
    }
}
