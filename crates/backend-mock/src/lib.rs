//! In-memory stand-ins for the two collaborators of a serial chooser context:
//! the port enumeration service and the profile's durable grant store.
//!
//! Both are cheap to clone and share their state between clones, so a test
//! can keep one handle to drive topology changes while the context owns
//! another.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serialgate_common::error::{ServiceError, StoreError};
use serialgate_common::prefs::{GrantedObjectStore, GrantsDocument};
use serialgate_common::service::{PortClient, PortManager, PortService};
use serialgate_common::{AttributeMap, Origin, PortInfo, SessionToken};

#[derive(Default)]
struct ServiceState {
    ports: Vec<PortInfo>,
    client: Option<PortClient>,
    // Bumped on every disconnect; managers bound under an older generation are dead.
    generation: u64,
    refuse_reason: Option<String>,
    reject_clients: bool,
    stall_bindings: bool,
    bind_count: usize,
}

#[derive(Clone, Default)]
pub struct MockPortService {
    inner: Arc<Mutex<ServiceState>>,
}

impl MockPortService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ports(ports: Vec<PortInfo>) -> Self {
        let service = Self::default();
        service.lock().ports = ports;
        service
    }

    fn lock(&self) -> MutexGuard<'_, ServiceState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Plug in a port. Returns whether a listening client was told about it.
    pub fn add_port(&self, port: PortInfo) -> bool {
        let mut state = self.lock();
        state.ports.push(port.clone());
        match &state.client {
            Some(client) => client.port_added(port),
            None => false,
        }
    }

    pub fn remove_port(&self, token: SessionToken) -> Option<PortInfo> {
        let mut state = self.lock();
        let idx = state.ports.iter().position(|p| p.token == token)?;
        let port = state.ports.remove(idx);
        if let Some(client) = &state.client {
            client.port_removed(token);
        }
        Some(port)
    }

    /// Drop the connection without warning, as a crashed service would.
    pub fn disconnect(&self) {
        let mut state = self.lock();
        state.client = None;
        state.generation += 1;
    }

    /// Make future bindings fail with `ServiceError::Unavailable`.
    pub fn refuse_bindings(&self, reason: Option<&str>) {
        self.lock().refuse_reason = reason.map(str::to_string);
    }

    pub fn reject_clients(&self, reject: bool) {
        self.lock().reject_clients = reject;
    }

    /// Make future bindings hang until the caller gives up on them.
    pub fn stall_bindings(&self, stall: bool) {
        self.lock().stall_bindings = stall;
    }

    pub fn bind_count(&self) -> usize {
        self.lock().bind_count
    }

    pub fn has_live_client(&self) -> bool {
        self.lock().client.as_ref().is_some_and(|c| !c.is_closed())
    }

    pub fn ports(&self) -> Vec<PortInfo> {
        self.lock().ports.clone()
    }
}

#[async_trait]
impl PortService for MockPortService {
    async fn bind_port_manager(&self) -> Result<Arc<dyn PortManager>, ServiceError> {
        let stall = {
            let mut state = self.lock();
            state.bind_count += 1;
            if let Some(reason) = &state.refuse_reason {
                return Err(ServiceError::Unavailable(reason.clone()));
            }
            state.stall_bindings
        };
        if stall {
            std::future::pending::<()>().await;
        }
        let generation = self.lock().generation;
        Ok(Arc::new(MockPortManager {
            inner: self.inner.clone(),
            generation,
        }))
    }
}

struct MockPortManager {
    inner: Arc<Mutex<ServiceState>>,
    generation: u64,
}

impl MockPortManager {
    fn lock_live(&self) -> Result<MutexGuard<'_, ServiceState>, ServiceError> {
        let state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if state.generation != self.generation {
            return Err(ServiceError::Disconnected);
        }
        Ok(state)
    }
}

#[async_trait]
impl PortManager for MockPortManager {
    async fn set_client(&self, client: PortClient) -> Result<(), ServiceError> {
        let mut state = self.lock_live()?;
        if state.reject_clients {
            return Err(ServiceError::ClientRejected("mock rejects clients".into()));
        }
        tracing::debug!(target: "serialgate", event = "mock_client_registered", generation = self.generation);
        state.client = Some(client);
        Ok(())
    }

    async fn get_devices(&self) -> Result<Vec<PortInfo>, ServiceError> {
        Ok(self.lock_live()?.ports.clone())
    }
}

/// Durable grant store kept in memory, with an optional write failure switch.
#[derive(Clone)]
pub struct MemoryGrantStore {
    doc: Arc<Mutex<GrantsDocument>>,
    fail_writes: Arc<Mutex<bool>>,
}

impl MemoryGrantStore {
    pub fn new() -> Self {
        Self {
            doc: Arc::new(Mutex::new(GrantsDocument::new())),
            fail_writes: Arc::new(Mutex::new(false)),
        }
    }

    fn doc(&self) -> MutexGuard<'_, GrantsDocument> {
        self.doc.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_writes(&self, fail: bool) {
        *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) = fail;
    }

    pub fn object_count(&self, origin: &Origin, collection: &str) -> usize {
        self.doc().objects(origin, collection).len()
    }

    pub fn snapshot(&self) -> GrantsDocument {
        self.doc().clone()
    }
}

impl Default for MemoryGrantStore {
    fn default() -> Self {
        Self::new()
    }
}

impl GrantedObjectStore for MemoryGrantStore {
    fn grant_object(
        &self,
        origin: &Origin,
        object: AttributeMap,
        collection: &str,
    ) -> Result<(), StoreError> {
        if *self.fail_writes.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Io(std::io::Error::other("mock write failure")));
        }
        self.doc().upsert(origin, collection, object);
        Ok(())
    }

    fn granted_objects(&self, origin: &Origin, collection: &str) -> Vec<AttributeMap> {
        self.doc().objects(origin, collection)
    }
}
