use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serialgate_common::identity::TOKEN_KEY;
use serialgate_common::prefs::{GrantedObjectStore, SERIAL_GRANTED_DEVICES};
use serialgate_common::{AttributeMap, IdentityScheme, Origin, PortInfo, SessionToken};
use tracing::{debug, warn};

/// Which lifecycle a grant ended up with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GrantKind {
    /// Session-only, keyed by the port's session token.
    Ephemeral,
    /// Written to the profile's durable grant store.
    Persistent,
    /// Eligible for the durable store, but the write failed. Nothing was
    /// granted.
    PersistFailed,
}

impl GrantKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantKind::Ephemeral => "ephemeral",
            GrantKind::Persistent => "persistent",
            GrantKind::PersistFailed => "persistent_failed",
        }
    }
}

/// Per-origin serial port grants.
///
/// Ephemeral grants and the map of known ports live here and die with the
/// enumeration service connection. Persistent grants belong to the durable
/// store and are only ever appended to or read.
pub struct PermissionStore {
    scheme: IdentityScheme,
    prefs: Arc<dyn GrantedObjectStore>,
    port_info: HashMap<SessionToken, PortInfo>,
    ephemeral_ports: HashMap<Origin, HashSet<SessionToken>>,
}

impl PermissionStore {
    pub fn new(scheme: IdentityScheme, prefs: Arc<dyn GrantedObjectStore>) -> Self {
        Self {
            scheme,
            prefs,
            port_info: HashMap::new(),
            ephemeral_ports: HashMap::new(),
        }
    }

    pub fn scheme(&self) -> IdentityScheme {
        self.scheme
    }

    pub fn grant(&mut self, origin: &Origin, port: &PortInfo) -> GrantKind {
        self.port_info.insert(port.token, port.clone());

        if self.scheme.can_persist(port) {
            let record = self.scheme.to_attributes(port);
            return match self.prefs.grant_object(origin, record, SERIAL_GRANTED_DEVICES) {
                Ok(()) => GrantKind::Persistent,
                Err(e) => {
                    warn!(target: "serialgate", %origin, error = %e, "failed to store persistent grant");
                    GrantKind::PersistFailed
                }
            };
        }

        self.ephemeral_ports
            .entry(origin.clone())
            .or_default()
            .insert(port.token);
        GrantKind::Ephemeral
    }

    pub fn check(&self, origin: &Origin, port: &PortInfo) -> bool {
        if self
            .ephemeral_ports
            .get(origin)
            .is_some_and(|tokens| tokens.contains(&port.token))
        {
            return true;
        }

        if !self.scheme.can_persist(port) {
            return false;
        }

        self.prefs
            .granted_objects(origin, SERIAL_GRANTED_DEVICES)
            .iter()
            .any(|record| self.scheme.matches(record, port))
    }

    pub fn port_added(&mut self, port: PortInfo) {
        self.port_info.insert(port.token, port);
    }

    /// Forget a departed port. Grants are left alone so a replug of a
    /// re-identifiable device needs no new prompt.
    pub fn port_removed(&mut self, token: &SessionToken) -> Option<PortInfo> {
        self.port_info.remove(token)
    }

    /// Drop everything tied to the enumeration service connection.
    pub fn reset(&mut self) {
        debug!(
            target: "serialgate",
            ports = self.port_info.len(),
            origins = self.ephemeral_ports.len(),
            "clearing connection-scoped permission state"
        );
        self.port_info.clear();
        self.ephemeral_ports.clear();
    }

    pub fn known_port(&self, token: &SessionToken) -> Option<&PortInfo> {
        self.port_info.get(token)
    }

    pub fn known_ports(&self) -> impl Iterator<Item = &PortInfo> {
        self.port_info.values()
    }

    /// Currently known port a stored grant record refers to, if any.
    ///
    /// Token-shaped records resolve by token; an undecodable token is simply
    /// no match.
    pub fn connected_port(&self, record: &AttributeMap) -> Option<&PortInfo> {
        if let Some(encoded) = record.get(TOKEN_KEY).and_then(|v| v.as_str()) {
            let token = SessionToken::decode(encoded).ok()?;
            return self.port_info.get(&token);
        }
        self.port_info
            .values()
            .find(|port| self.scheme.matches(record, port))
    }

    pub fn ephemeral_grant_count(&self) -> usize {
        self.ephemeral_ports.values().map(HashSet::len).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serialgate_backend_mock::MemoryGrantStore;

    fn widget() -> PortInfo {
        PortInfo::new(SessionToken::generate(), "/dev/ttyUSB0")
            .with_display_name("Widget Adapter")
            .with_usb_ids(0x1234, 0x5678)
            .with_serial_number("ABC123")
    }

    fn store() -> (PermissionStore, MemoryGrantStore) {
        let prefs = MemoryGrantStore::new();
        (
            PermissionStore::new(IdentityScheme::VendorProductSerial, Arc::new(prefs.clone())),
            prefs,
        )
    }

    #[test]
    fn persistable_grant_goes_to_durable_store_only() {
        let (mut store, prefs) = store();
        let origin = Origin::new("https://a.example");
        let port = widget();
        assert_eq!(store.grant(&origin, &port), GrantKind::Persistent);
        assert_eq!(store.ephemeral_grant_count(), 0);
        assert_eq!(prefs.object_count(&origin, SERIAL_GRANTED_DEVICES), 1);
        assert!(store.check(&origin, &port));
        assert!(!store.check(&Origin::new("https://b.example"), &port));
    }

    #[test]
    fn anonymous_grant_stays_ephemeral() {
        let (mut store, prefs) = store();
        let origin = Origin::new("https://a.example");
        let port = PortInfo::new(SessionToken::generate(), "/dev/ttyS0");
        assert_eq!(store.grant(&origin, &port), GrantKind::Ephemeral);
        assert_eq!(store.grant(&origin, &port), GrantKind::Ephemeral);
        assert_eq!(store.ephemeral_grant_count(), 1);
        assert_eq!(prefs.object_count(&origin, SERIAL_GRANTED_DEVICES), 0);
        assert!(store.check(&origin, &port));

        let replugged = port.reconnected(SessionToken::generate());
        assert!(!store.check(&origin, &replugged));
    }

    #[test]
    fn removal_keeps_grants() {
        let (mut store, _) = store();
        let origin = Origin::new("https://a.example");
        let port = PortInfo::new(SessionToken::generate(), "/dev/ttyS0");
        store.port_added(port.clone());
        store.grant(&origin, &port);
        assert_eq!(store.port_removed(&port.token), Some(port.clone()));
        assert!(store.known_port(&port.token).is_none());
        assert!(store.check(&origin, &port));
    }

    #[test]
    fn reset_clears_ephemeral_state_but_not_durable() {
        let (mut store, prefs) = store();
        let origin = Origin::new("https://a.example");
        let durable = widget();
        let session = PortInfo::new(SessionToken::generate(), "/dev/ttyS0");
        store.grant(&origin, &durable);
        store.grant(&origin, &session);

        store.reset();
        assert_eq!(store.ephemeral_grant_count(), 0);
        assert_eq!(store.known_ports().count(), 0);
        assert!(!store.check(&origin, &session));
        assert!(store.check(&origin, &durable.reconnected(SessionToken::generate())));
        assert_eq!(prefs.object_count(&origin, SERIAL_GRANTED_DEVICES), 1);
    }

    #[test]
    fn durable_scan_skips_foreign_records() {
        let (mut store, prefs) = store();
        let origin = Origin::new("https://a.example");
        let mut foreign = AttributeMap::new();
        foreign.insert("name".into(), "Mystery".into());
        foreign.insert("vendor_id".into(), "not a number".into());
        prefs
            .grant_object(&origin, foreign, SERIAL_GRANTED_DEVICES)
            .expect("seed");

        let port = widget();
        assert!(!store.check(&origin, &port));
        store.grant(&origin, &port);
        assert!(store.check(&origin, &port));
    }

    #[test]
    fn failed_durable_write_does_not_grant() {
        let (mut store, prefs) = store();
        prefs.fail_writes(true);
        let origin = Origin::new("https://a.example");
        let port = widget();
        assert_eq!(store.grant(&origin, &port), GrantKind::PersistFailed);
        assert!(!store.check(&origin, &port));
        assert_eq!(store.ephemeral_grant_count(), 0);

        prefs.fail_writes(false);
        assert_eq!(store.grant(&origin, &port), GrantKind::Persistent);
        assert!(store.check(&origin, &port));
    }

    #[test]
    fn connected_port_resolves_both_record_shapes() {
        let (mut store, _) = store();
        let scheme = store.scheme();
        let durable = widget();
        let session = PortInfo::new(SessionToken::generate(), "/dev/ttyS0");
        store.port_added(durable.clone());
        store.port_added(session.clone());

        assert_eq!(store.connected_port(&scheme.to_attributes(&durable)), Some(&durable));
        assert_eq!(store.connected_port(&scheme.to_attributes(&session)), Some(&session));

        let mut garbled = scheme.to_attributes(&session);
        garbled.insert(TOKEN_KEY.into(), "%%%".into());
        assert_eq!(store.connected_port(&garbled), None);
    }
}
