use std::fmt;
use std::sync::Arc;

use serialgate_common::error::ServiceError;
use serialgate_common::service::{PortClient, PortEvent, PortManager, PortService};
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
        })
    }
}

enum Link {
    Disconnected,
    Connecting,
    Connected {
        manager: Arc<dyn PortManager>,
        events: UnboundedReceiver<PortEvent>,
    },
}

/// What the event endpoint produced.
pub(crate) enum Delivery {
    Event(PortEvent),
    /// Nothing queued right now, or no connection to read from.
    Idle,
    /// The service closed its end of the client endpoint.
    Lost,
}

/// Owner of the single port manager binding.
///
/// Only this type moves between states. It never reconnects on its own; the
/// owning context asks for a connection when it needs one.
pub(crate) struct Supervisor {
    service: Arc<dyn PortService>,
    link: Link,
}

impl Supervisor {
    pub(crate) fn new(service: Arc<dyn PortService>) -> Self {
        Self {
            service,
            link: Link::Disconnected,
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        match self.link {
            Link::Disconnected => ConnectionState::Disconnected,
            Link::Connecting => ConnectionState::Connecting,
            Link::Connected { .. } => ConnectionState::Connected,
        }
    }

    pub(crate) fn manager(&self) -> Option<Arc<dyn PortManager>> {
        match &self.link {
            Link::Connected { manager, .. } => Some(manager.clone()),
            _ => None,
        }
    }

    /// Bind the port manager and register a fresh client endpoint.
    ///
    /// Leaves the link in `Connecting` on failure, or if the future is dropped
    /// before completion. The caller tears down in both cases.
    pub(crate) async fn connect(&mut self) -> Result<Arc<dyn PortManager>, ServiceError> {
        self.link = Link::Connecting;
        let manager = self.service.bind_port_manager().await?;
        let (client, events) = PortClient::channel();
        manager.set_client(client).await?;
        self.link = Link::Connected {
            manager: manager.clone(),
            events,
        };
        Ok(manager)
    }

    /// Drop the manager handle and the client endpoint. Returns false when
    /// there was no connection or attempt to tear down.
    pub(crate) fn teardown(&mut self) -> bool {
        let was_live = !matches!(self.link, Link::Disconnected);
        self.link = Link::Disconnected;
        was_live
    }

    pub(crate) async fn next(&mut self) -> Delivery {
        match &mut self.link {
            Link::Connected { events, .. } => match events.recv().await {
                Some(event) => Delivery::Event(event),
                None => Delivery::Lost,
            },
            _ => Delivery::Idle,
        }
    }

    pub(crate) fn try_next(&mut self) -> Delivery {
        match &mut self.link {
            Link::Connected { events, .. } => match events.try_recv() {
                Ok(event) => Delivery::Event(event),
                Err(TryRecvError::Empty) => Delivery::Idle,
                Err(TryRecvError::Disconnected) => Delivery::Lost,
            },
            _ => Delivery::Idle,
        }
    }
}
