//! Prompt fingerprinting
//!
//! Short, deterministic digest used to recognize resubmissions of the same
//! prompt and to key lookups without comparing full prompt text.

use sha2::{Digest, Sha256};

/// Length of the hex fingerprint stored on every job row.
pub const PROMPT_HASH_LEN: usize = 12;

/// Returns a 12-character hex fingerprint of the prompt text.
pub fn prompt_hash(prompt: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(prompt.as_bytes());
    let digest = hasher.finalize();
    let mut hex = String::with_capacity(PROMPT_HASH_LEN);
    for byte in digest.iter().take(PROMPT_HASH_LEN / 2) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}
