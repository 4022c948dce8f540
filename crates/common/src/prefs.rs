use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::types::{AttributeMap, Origin};

/// Collection under which serial port grants are kept in the profile store.
pub const SERIAL_GRANTED_DEVICES: &str = "serial-granted-devices";

/// Profile-scoped durable store of per-origin granted objects.
///
/// Shared by every chooser context of a profile; implementations provide their
/// own consistency. Granting an object that is already present must not create
/// a second copy.
pub trait GrantedObjectStore: Send + Sync {
    fn grant_object(
        &self,
        origin: &Origin,
        object: AttributeMap,
        collection: &str,
    ) -> Result<(), StoreError>;

    /// Objects granted to `origin` in `collection`, oldest first.
    fn granted_objects(&self, origin: &Origin, collection: &str) -> Vec<AttributeMap>;
}

pub const GRANTS_DOCUMENT_VERSION: u32 = 1;

/// On-disk layout of the file-backed grant store: origin, then collection,
/// then the granted records in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GrantsDocument {
    pub version: u32,
    #[serde(default)]
    pub origins: BTreeMap<Origin, BTreeMap<String, Vec<AttributeMap>>>,
}

impl GrantsDocument {
    pub fn new() -> Self {
        Self {
            version: GRANTS_DOCUMENT_VERSION,
            origins: BTreeMap::new(),
        }
    }

    /// Append `object` unless an identical record is already present.
    /// Returns whether the document changed.
    pub fn upsert(&mut self, origin: &Origin, collection: &str, object: AttributeMap) -> bool {
        let records = self
            .origins
            .entry(origin.clone())
            .or_default()
            .entry(collection.to_string())
            .or_default();
        if records.contains(&object) {
            return false;
        }
        records.push(object);
        true
    }

    pub fn objects(&self, origin: &Origin, collection: &str) -> Vec<AttributeMap> {
        self.origins
            .get(origin)
            .and_then(|c| c.get(collection))
            .cloned()
            .unwrap_or_default()
    }
}
