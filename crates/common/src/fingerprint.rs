use sha2::{Digest, Sha256};

use crate::types::AttributeMap;

/// Digest of a grant record, used in audit entries instead of raw serial
/// numbers. Keys are hashed in sorted order so equal records always agree.
pub fn compute_fingerprint(record: &AttributeMap) -> String {
    let mut hasher = Sha256::new();
    let mut keys: Vec<&String> = record.keys().collect();
    keys.sort();
    for key in keys {
        hasher.update(key.as_bytes());
        hasher.update(b"=");
        hasher.update(record[key].to_string().as_bytes());
        hasher.update(b"|");
    }
    let digest = hasher.finalize();
    format!("sha256:{}", hex::encode(digest))
}

/// First eight hex digits of a fingerprint, for log lines.
pub fn short_fingerprint(full: &str) -> String {
    let digest = full.strip_prefix("sha256:").unwrap_or(full);
    digest.chars().take(8).collect()
}
