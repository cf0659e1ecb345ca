//! HMAC-SHA256 signing of token payloads.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

/// Length of the emitted signature in hex characters.
///
/// The full HMAC-SHA256 digest is truncated to its first 8 bytes for
/// compactness inside a QR payload.
pub const SIGNATURE_LEN: usize = 16;

const SIGNATURE_BYTES: usize = SIGNATURE_LEN / 2;

/// Signs and verifies opaque payload strings with a server-held secret.
#[derive(Clone)]
pub struct Signer {
    key: Vec<u8>,
}

impl Signer {
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        Self {
            key: secret.as_ref().to_vec(),
        }
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC-SHA256 accepts keys of any length
        HmacSha256::new_from_slice(&self.key).expect("HMAC key of any length")
    }

    /// Sign `payload`, returning the truncated signature as lowercase hex.
    ///
    /// Deterministic for a given secret and payload.
    pub fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let digest = mac.finalize().into_bytes();
        hex::encode(&digest[..SIGNATURE_BYTES])
    }

    /// Verify in constant time; malformed input returns `false`, never errors.
    pub fn verify(&self, payload: &str, signature: &str) -> bool {
        // Signatures are emitted lowercase; uppercase hex is a different token
        if signature.len() != SIGNATURE_LEN || signature.bytes().any(|b| b.is_ascii_uppercase()) {
            return false;
        }
        let Ok(bytes) = hex::decode(signature) else {
            return false;
        };
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        mac.verify_truncated_left(&bytes).is_ok()
    }
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer").field("key", &"<redacted>").finish()
    }
}

/// Generate a fresh random signing secret as hex, for bootstrap tooling.
pub fn generate_secret() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
