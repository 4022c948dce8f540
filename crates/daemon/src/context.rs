use std::sync::Arc;

use serialgate_common::error::ServiceError;
use serialgate_common::fingerprint::{compute_fingerprint, short_fingerprint};
use serialgate_common::prefs::GrantedObjectStore;
use serialgate_common::service::{PortEvent, PortManager, PortService};
use serialgate_common::{IdentityScheme, Origin, PortInfo, SessionToken};
use tracing::{debug, info, warn};

use crate::audit::AuditLogger;
use crate::connection::{ConnectionState, Delivery, Supervisor};
use crate::observer::{ObserverList, PortObserver};
use crate::permissions::{GrantKind, PermissionStore};

/// Serial port permission authority for one browsing context.
///
/// Everything runs on the task that owns the context. The only suspension
/// points are binding the port manager and waiting for service events;
/// grants and checks are synchronous.
///
/// Dropping the context drops the client endpoint, so the service can no
/// longer deliver events into it.
pub struct SerialChooserContext {
    permissions: PermissionStore,
    observers: ObserverList,
    supervisor: Supervisor,
    audit: Option<AuditLogger>,
}

impl SerialChooserContext {
    pub fn new(
        service: Arc<dyn PortService>,
        prefs: Arc<dyn GrantedObjectStore>,
        scheme: IdentityScheme,
    ) -> Self {
        Self {
            permissions: PermissionStore::new(scheme, prefs),
            observers: ObserverList::new(),
            supervisor: Supervisor::new(service),
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditLogger) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn permissions(&self) -> &PermissionStore {
        &self.permissions
    }

    pub fn identity_scheme(&self) -> IdentityScheme {
        self.permissions.scheme()
    }

    pub fn can_store_persistent_entry(&self, port: &PortInfo) -> bool {
        self.permissions.scheme().can_persist(port)
    }

    pub fn grant_port_permission(&mut self, origin: &Origin, port: &PortInfo) -> GrantKind {
        let kind = self.permissions.grant(origin, port);
        let fingerprint = compute_fingerprint(&self.permissions.scheme().to_attributes(port));
        info!(
            target: "serialgate",
            event = "grant",
            %origin,
            port = %port.path.display(),
            device = %short_fingerprint(&fingerprint),
            kind = kind.as_str()
        );
        if let Some(audit) = self.audit.as_mut() {
            audit.log("grant", Some(origin), Some(fingerprint), kind.as_str());
        }
        kind
    }

    pub fn has_port_permission(&self, origin: &Origin, port: &PortInfo) -> bool {
        self.permissions.check(origin, port)
    }

    pub fn add_port_observer(&mut self, observer: &Arc<dyn PortObserver>) {
        self.observers.add(observer);
    }

    pub fn remove_port_observer(&mut self, observer: &Arc<dyn PortObserver>) {
        self.observers.remove(observer);
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.supervisor.state()
    }

    /// Live port manager handle, connecting first if needed.
    ///
    /// Dropping the returned future mid-connect abandons the attempt: the
    /// context drops back to disconnected and is torn down once.
    pub async fn port_manager(&mut self) -> Result<Arc<dyn PortManager>, ServiceError> {
        if let Some(manager) = self.supervisor.manager() {
            return Ok(manager);
        }

        debug!(target: "serialgate", event = "port_manager_connecting");
        let mut pending = PendingConnect {
            context: self,
            settled: false,
        };
        let result = pending.context.supervisor.connect().await;
        pending.settled = true;
        match result {
            Ok(manager) => {
                info!(target: "serialgate", event = "port_manager_connected");
                Ok(manager)
            }
            Err(e) => {
                warn!(target: "serialgate", event = "port_manager_connect_failed", error = %e);
                pending.context.on_port_manager_connection_error();
                Err(e)
            }
        }
    }

    /// Ports the service currently reports, connecting first if needed.
    ///
    /// They become known ports without any arrival notification, so a later
    /// removal reaches observers with the full descriptor.
    pub async fn get_ports(&mut self) -> Result<Vec<PortInfo>, ServiceError> {
        let manager = self.port_manager().await?;
        match manager.get_devices().await {
            Ok(ports) => {
                for port in &ports {
                    self.permissions.port_added(port.clone());
                }
                debug!(target: "serialgate", event = "ports_enumerated", ports = ports.len());
                Ok(ports)
            }
            Err(e) => {
                warn!(target: "serialgate", event = "enumeration_failed", error = %e);
                self.on_port_manager_connection_error();
                Err(e)
            }
        }
    }

    pub fn on_port_added(&mut self, port: PortInfo) {
        debug!(target: "serialgate", event = "port_added", port = %port.path.display(), token = %port.token);
        self.permissions.port_added(port.clone());
        self.observers.notify_added(&port);
    }

    pub fn on_port_removed(&mut self, token: SessionToken) {
        // Observers get the last known descriptor, then it is forgotten.
        let Some(port) = self.permissions.known_port(&token).cloned() else {
            debug!(target: "serialgate", event = "port_removed_unknown", %token);
            return;
        };
        debug!(target: "serialgate", event = "port_removed", port = %port.path.display(), %token);
        self.observers.notify_removed(&port);
        self.permissions.port_removed(&token);
    }

    /// Tear down the service connection and everything derived from it.
    /// Does nothing when already disconnected.
    pub fn on_port_manager_connection_error(&mut self) {
        if !self.supervisor.teardown() {
            return;
        }
        self.permissions.reset();
        self.observers.notify_connection_error();
        info!(target: "serialgate", event = "port_manager_disconnected");
        if let Some(audit) = self.audit.as_mut() {
            audit.log("connection", None, None, "connection_lost");
        }
    }

    /// Wait for and handle the next service event.
    ///
    /// Returns false when not connected or when the connection was just lost.
    pub async fn process_next_event(&mut self) -> bool {
        let delivery = self.supervisor.next().await;
        self.handle(delivery)
    }

    /// Handle every event already queued, without waiting. Returns how many
    /// events were handled.
    pub fn process_pending_events(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.supervisor.try_next() {
                Delivery::Idle => return handled,
                delivery => {
                    let more = self.handle(delivery);
                    if !more {
                        return handled;
                    }
                    handled += 1;
                }
            }
        }
    }

    /// Handle events until the connection is lost.
    pub async fn run(&mut self) {
        while self.process_next_event().await {}
    }

    fn handle(&mut self, delivery: Delivery) -> bool {
        match delivery {
            Delivery::Event(PortEvent::Added(port)) => {
                self.on_port_added(port);
                true
            }
            Delivery::Event(PortEvent::Removed(token)) => {
                self.on_port_removed(token);
                true
            }
            Delivery::Lost => {
                self.on_port_manager_connection_error();
                false
            }
            Delivery::Idle => false,
        }
    }
}

/// Tears the context down if a connect attempt is dropped before it settles.
struct PendingConnect<'a> {
    context: &'a mut SerialChooserContext,
    settled: bool,
}

impl Drop for PendingConnect<'_> {
    fn drop(&mut self) {
        if !self.settled {
            debug!(target: "serialgate", event = "port_manager_connect_abandoned");
            self.context.on_port_manager_connection_error();
        }
    }
}
