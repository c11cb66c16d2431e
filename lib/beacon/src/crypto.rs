//! Signature verification for authenticated discovery requests.
//!
//! The algorithm is fixed: curve P-256, digest SHA-256. Public keys arrive
//! and are stored as DER SubjectPublicKeyInfo, which carries the curve
//! identifier alongside the point. Verification is total: any malformed key,
//! malformed signature, or failed check yields `false` rather than an error.

use p256::ecdsa::signature::Verifier;
use p256::ecdsa::{Signature, VerifyingKey};
use p256::pkcs8::DecodePublicKey;

/// Verify an ECDSA-P256/SHA-256 signature over `message`.
///
/// Accepts the fixed-size 64-byte `r ‖ s` signature encoding, falling back
/// to ASN.1 DER for clients that produce it.
pub fn verify(public_key_der: &[u8], message: &[u8], signature: &[u8]) -> bool {
    let Ok(public_key) = p256::PublicKey::from_public_key_der(public_key_der) else {
        return false;
    };
    let verifying_key = VerifyingKey::from(&public_key);

    let signature = match Signature::from_slice(signature) {
        Ok(signature) => signature,
        Err(_) => match Signature::from_der(signature) {
            Ok(signature) => signature,
            Err(_) => return false,
        },
    };

    verifying_key.verify(message, &signature).is_ok()
}

/// Check that `der` is a well-formed SubjectPublicKeyInfo on curve P-256.
///
/// The decoder rejects any other curve's OID, so a successful parse is the
/// curve identity check.
pub fn validate_public_key(der: &[u8]) -> bool {
    p256::PublicKey::from_public_key_der(der).is_ok()
}
