//! Session key generation.

use rand::rngs::OsRng;
use rand::RngCore;

/// Bytes of entropy in a session key.
pub const SESSION_KEY_BYTES: usize = 16;

/// Generate a fresh hex-encoded session key from the OS random source.
pub fn generate_session_key() -> String {
    let mut bytes = [0u8; SESSION_KEY_BYTES];
    OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
