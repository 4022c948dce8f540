use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serialgate_common::error::StoreError;
use serialgate_common::prefs::{GrantedObjectStore, GrantsDocument};
use serialgate_common::{AttributeMap, Origin};
use tracing::debug;

/// Durable grant store kept as a JSON document on disk.
///
/// The whole document is rewritten on every change through a temp file and a
/// rename, so readers never see a half-written file.
pub struct JsonGrantStore {
    path: PathBuf,
    doc: Mutex<GrantsDocument>,
}

impl JsonGrantStore {
    /// Open the store at `path`, starting empty if the file does not exist.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let doc = read_document(&path)?;
        Ok(Self {
            path,
            doc: Mutex::new(doc),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn doc(&self) -> MutexGuard<'_, GrantsDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn snapshot(&self) -> GrantsDocument {
        self.doc().clone()
    }

    fn persist(&self, doc: &GrantsDocument) -> Result<(), StoreError> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut f = File::create(&tmp)?;
            #[cfg(unix)]
            {
                use std::os::unix::fs::PermissionsExt;
                f.set_permissions(fs::Permissions::from_mode(0o600))?;
            }
            f.write_all(&serde_json::to_vec_pretty(doc)?)?;
            f.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

pub fn read_document(path: &Path) -> Result<GrantsDocument, StoreError> {
    match fs::read(path) {
        Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(GrantsDocument::new()),
        Err(e) => Err(e.into()),
    }
}

impl GrantedObjectStore for JsonGrantStore {
    fn grant_object(
        &self,
        origin: &Origin,
        object: AttributeMap,
        collection: &str,
    ) -> Result<(), StoreError> {
        let mut doc = self.doc();
        let mut updated = doc.clone();
        if !updated.upsert(origin, collection, object) {
            return Ok(());
        }
        // Only adopt the change once it is on disk.
        self.persist(&updated)?;
        *doc = updated;
        debug!(target: "serialgate", %origin, collection, path = %self.path.display(), "grant persisted");
        Ok(())
    }

    fn granted_objects(&self, origin: &Origin, collection: &str) -> Vec<AttributeMap> {
        self.doc().objects(origin, collection)
    }
}
