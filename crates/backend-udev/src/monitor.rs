use std::collections::HashMap;
use std::io;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use serialgate_common::error::ServiceError;
use serialgate_common::service::{PortClient, PortEvent, PortManager, PortService};
use serialgate_common::PortInfo;
use tokio::sync::oneshot;
use tracing::{debug, error, info};

use crate::{monitor_started, BackendError, PortTable, UdevAction, PORT_PROPERTIES};

const TTY_SUBSYSTEM: &str = "tty";

/// udev-backed enumeration service. Every binding owns its own monitor thread,
/// which exits once the binding is dropped or its client stops listening.
#[derive(Debug, Clone)]
pub struct UdevPortService {
    poll_interval: Duration,
}

impl UdevPortService {
    pub fn new(poll_interval: Duration) -> Self {
        Self { poll_interval }
    }
}

impl Default for UdevPortService {
    fn default() -> Self {
        Self::new(Duration::from_millis(250))
    }
}

#[derive(Default)]
struct Shared {
    table: Mutex<PortTable>,
    client: Mutex<Option<PortClient>>,
}

impl Shared {
    fn table(&self) -> MutexGuard<'_, PortTable> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn client(&self) -> MutexGuard<'_, Option<PortClient>> {
        self.client.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct UdevPortManager {
    shared: Arc<Shared>,
}

#[async_trait]
impl PortService for UdevPortService {
    async fn bind_port_manager(&self) -> Result<Arc<dyn PortManager>, ServiceError> {
        let shared = Arc::new(Shared::default());

        // Listen before enumerating so no arrival falls between the two.
        let weak = Arc::downgrade(&shared);
        let interval = self.poll_interval;
        let (started, ready) = oneshot::channel();
        thread::Builder::new()
            .name("serialgate-udev".into())
            .spawn(move || monitor_loop(weak, interval, started))
            .map_err(BackendError::Udev)?;
        monitor_started(ready.await)?;

        let initial = tokio::task::spawn_blocking(enumerate_ports)
            .await
            .map_err(|e| BackendError::Task(e.to_string()))??;
        {
            let mut table = shared.table();
            for (devnode, props) in &initial {
                table.insert(devnode, |k| props.get(k).cloned());
            }
            info!(target: "serialgate", event = "udev_enumerated", ports = table.len());
        }

        Ok(Arc::new(UdevPortManager { shared }))
    }
}

#[async_trait]
impl PortManager for UdevPortManager {
    async fn set_client(&self, client: PortClient) -> Result<(), ServiceError> {
        *self.shared.client() = Some(client);
        Ok(())
    }

    async fn get_devices(&self) -> Result<Vec<PortInfo>, ServiceError> {
        Ok(self.shared.table().snapshot())
    }
}

type Properties = HashMap<String, String>;

fn read_properties(device: &udev::Device) -> Option<(PathBuf, Properties)> {
    let devnode = device.devnode()?.to_path_buf();
    let props = PORT_PROPERTIES
        .iter()
        .filter_map(|key| {
            device
                .property_value(key)
                .and_then(|v| v.to_str())
                .map(|v| (key.to_string(), v.to_string()))
        })
        .collect();
    Some((devnode, props))
}

fn enumerate_ports() -> Result<Vec<(PathBuf, Properties)>, BackendError> {
    let mut enumerator = udev::Enumerator::new()?;
    enumerator.match_subsystem(TTY_SUBSYSTEM)?;
    let ports = enumerator
        .scan_devices()?
        // Virtual consoles have no parent device.
        .filter(|device| device.parent().is_some())
        .filter_map(|device| read_properties(&device))
        .collect();
    Ok(ports)
}

fn monitor_loop(shared: Weak<Shared>, interval: Duration, started: oneshot::Sender<io::Result<()>>) {
    let socket = match udev::MonitorBuilder::new()
        .and_then(|b| b.match_subsystem(TTY_SUBSYSTEM))
        .and_then(|b| b.listen())
    {
        Ok(socket) => socket,
        Err(e) => {
            error!(target: "serialgate", error = %e, "udev monitor failed to start");
            let _ = started.send(Err(e));
            return;
        }
    };
    if started.send(Ok(())).is_err() {
        debug!(target: "serialgate", "udev binding abandoned before monitor start");
        return;
    }

    loop {
        let Some(shared) = shared.upgrade() else {
            debug!(target: "serialgate", "udev binding dropped, monitor exiting");
            return;
        };
        if shared.client().as_ref().is_some_and(|c| c.is_closed()) {
            debug!(target: "serialgate", "udev client closed, monitor exiting");
            return;
        }

        for event in socket.iter() {
            let action = match event.event_type() {
                udev::EventType::Add => UdevAction::Add,
                udev::EventType::Remove => UdevAction::Remove,
                _ => UdevAction::Other,
            };
            let device = event.device();
            let Some((devnode, props)) = read_properties(&device) else {
                continue;
            };
            let has_parent = device.parent().is_some();
            let change = shared
                .table()
                .apply(action, &devnode, has_parent, |k| props.get(k).cloned());
            match (change, shared.client().as_ref()) {
                (Some(PortEvent::Added(port)), Some(client)) => {
                    client.port_added(port);
                }
                (Some(PortEvent::Removed(token)), Some(client)) => {
                    client.port_removed(token);
                }
                _ => {}
            }
        }

        drop(shared);
        thread::sleep(interval);
    }
}
