use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Utc;
use serialgate_common::audit::{AuditEntry, AuditEntryPayload};
use serialgate_common::Origin;

/// Append-only JSONL audit log with hash-chained entries.
///
/// Writes are best effort: a failing disk never changes a permission decision.
pub struct AuditLogger {
    path: PathBuf,
    last_hash: Option<String>,
}

impl AuditLogger {
    pub fn new(path: PathBuf) -> std::io::Result<Self> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            #[cfg(unix)]
            {
                use std::os::unix::fs::DirBuilderExt;
                let mut builder = fs::DirBuilder::new();
                builder.recursive(true).mode(0o700);
                builder.create(dir)?;
            }
            #[cfg(not(unix))]
            {
                fs::create_dir_all(dir)?;
            }
        }
        // Continue the chain of an existing log.
        let last_hash = last_entry_hash(&path);
        Ok(Self { path, last_hash })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn log(
        &mut self,
        event_type: &str,
        origin: Option<&Origin>,
        device_fingerprint: Option<String>,
        action: &str,
    ) {
        let payload = AuditEntryPayload {
            timestamp: Utc::now(),
            event_type: event_type.into(),
            origin: origin.map(|o| o.to_string()),
            device_fingerprint,
            action: action.into(),
        };
        let entry = AuditEntry::new(self.last_hash.take(), payload);
        self.last_hash = Some(entry.entry_hash.clone());
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| {
                let line = serde_json::to_string(&entry)?;
                writeln!(f, "{line}")
            });
        if let Err(e) = written {
            tracing::warn!(target: "serialgate", path = %self.path.display(), error = %e, "audit write failed");
        }
    }
}

fn last_entry_hash(path: &Path) -> Option<String> {
    let text = fs::read_to_string(path).ok()?;
    let line = text.lines().rev().find(|l| !l.trim().is_empty())?;
    serde_json::from_str::<AuditEntry>(line)
        .ok()
        .map(|e| e.entry_hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialgate_common::audit::verify_chain;

    fn read_entries(path: &Path) -> Vec<AuditEntry> {
        fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn chain_continues_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("audit.log");
        let origin = Origin::new("https://example.com");

        let mut first = AuditLogger::new(path.clone()).unwrap();
        first.log("grant", Some(&origin), Some("sha256:aa".into()), "persistent");
        first.log("connection", None, None, "connection_lost");
        drop(first);

        let mut second = AuditLogger::new(path.clone()).unwrap();
        second.log("grant", Some(&origin), Some("sha256:bb".into()), "ephemeral");

        let entries = read_entries(&path);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].payload.origin.as_deref(), Some("https://example.com"));
        assert!(verify_chain(&entries));
    }
}
