use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntryPayload {
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_fingerprint: Option<String>,
    pub action: String,
}

/// One line of the JSONL audit log, chained to its predecessor by hash.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AuditEntry {
    pub payload: AuditEntryPayload,
    pub prev_hash: Option<String>,
    pub entry_hash: String,
}

impl AuditEntry {
    pub fn compute_hash(prev_hash: Option<&str>, payload: &AuditEntryPayload) -> String {
        let mut hasher = Sha256::new();
        if let Some(p) = prev_hash {
            hasher.update(p.as_bytes());
        }
        hasher.update(payload.timestamp.to_rfc3339().as_bytes());
        for field in [
            Some(payload.event_type.as_str()),
            payload.origin.as_deref(),
            payload.device_fingerprint.as_deref(),
            Some(payload.action.as_str()),
        ] {
            hasher.update(b"|");
            if let Some(f) = field {
                hasher.update(f.as_bytes());
            }
        }
        format!("sha256:{}", hex::encode(hasher.finalize()))
    }

    pub fn new(prev_hash: Option<String>, payload: AuditEntryPayload) -> Self {
        let entry_hash = Self::compute_hash(prev_hash.as_deref(), &payload);
        Self {
            payload,
            prev_hash,
            entry_hash,
        }
    }
}

pub fn verify_chain(entries: &[AuditEntry]) -> bool {
    let mut last: Option<&str> = None;
    for e in entries {
        if AuditEntry::compute_hash(last, &e.payload) != e.entry_hash {
            return false;
        }
        if e.prev_hash.as_deref() != last {
            return false;
        }
        last = Some(&e.entry_hash);
    }
    true
}
