use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::ServiceError;
use crate::token::SessionToken;
use crate::types::PortInfo;

/// Topology change pushed by the enumeration service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortEvent {
    Added(PortInfo),
    Removed(SessionToken),
}

/// Callback endpoint a chooser context registers with the port manager.
///
/// The receiving half stays with the context. Once the context drops it,
/// every send fails and `is_closed` reports true, so a service never delivers
/// into a context that is gone.
#[derive(Debug, Clone)]
pub struct PortClient {
    tx: mpsc::UnboundedSender<PortEvent>,
}

impl PortClient {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<PortEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Returns false when the context is no longer listening.
    pub fn port_added(&self, port: PortInfo) -> bool {
        self.tx.send(PortEvent::Added(port)).is_ok()
    }

    pub fn port_removed(&self, token: SessionToken) -> bool {
        self.tx.send(PortEvent::Removed(token)).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Live handle to a bound port manager.
#[async_trait]
pub trait PortManager: Send + Sync {
    /// Register the context's callback endpoint. Replaces any previous client.
    async fn set_client(&self, client: PortClient) -> Result<(), ServiceError>;

    async fn get_devices(&self) -> Result<Vec<PortInfo>, ServiceError>;
}

/// Device service able to hand out port manager bindings.
#[async_trait]
pub trait PortService: Send + Sync {
    async fn bind_port_manager(&self) -> Result<Arc<dyn PortManager>, ServiceError>;
}
