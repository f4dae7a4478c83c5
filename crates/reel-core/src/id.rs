//! ID generation for reel cards
//!
//! Hash-based IDs so cards created in different windows never collide.
//! Format: prefix-xxxxxx (6 lowercase alphanumeric chars)

use sha2::{Digest, Sha256};
use uuid::Uuid;

const HASH_LEN: usize = 6;

/// Generate a unique card ID
///
/// Uses UUID + timestamp hash, encoded as base32 lowercase.
pub fn generate_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4();
    let timestamp = chrono::Utc::now().timestamp_nanos_opt().unwrap_or(0);

    let mut hasher = Sha256::new();
    hasher.update(uuid.as_bytes());
    hasher.update(timestamp.to_le_bytes());

    let hash = hasher.finalize();

    // 5 bytes give 8 base32 chars, enough for the 6 we keep
    let encoded = base32::encode(base32::Alphabet::Crockford, &hash[..5])
        .to_lowercase()
        .chars()
        .take(HASH_LEN)
        .collect::<String>();

    format!("{}-{}", prefix, encoded)
}

/// Generate an ID that is not already taken
pub fn generate_unique_id(prefix: &str, taken: impl Fn(&str) -> bool) -> String {
    loop {
        let id = generate_id(prefix);
        if !taken(&id) {
            return id;
        }
    }
}
