//! Serial port enumeration for Linux hosts.
//!
//! The udev-facing service lives behind the `udev` feature since it needs
//! libudev at build time. The mapping from udev properties to [`PortInfo`]
//! and the path-to-token bookkeeping are plain code and always available.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serialgate_common::error::ServiceError;
use serialgate_common::service::PortEvent;
use serialgate_common::{PortInfo, SessionToken};
use thiserror::Error;

#[cfg(feature = "udev")]
mod monitor;
#[cfg(feature = "udev")]
pub use monitor::UdevPortService;

/// udev properties read for every tty device.
pub const PORT_PROPERTIES: &[&str] = &[
    "ID_VENDOR_ID",
    "ID_MODEL_ID",
    "ID_SERIAL_SHORT",
    "ID_MODEL_FROM_DATABASE",
    "ID_MODEL",
    "ID_USB_DRIVER",
];

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("udev error: {0}")]
    Udev(#[from] std::io::Error),
    #[error("enumeration task failed: {0}")]
    Task(String),
}

impl From<BackendError> for ServiceError {
    fn from(err: BackendError) -> Self {
        ServiceError::Unavailable(err.to_string())
    }
}

/// Result of starting a monitor thread, as reported back to the binding.
/// A thread that goes away without reporting counts as a failure.
pub fn monitor_started<E: std::fmt::Display>(
    report: Result<std::io::Result<()>, E>,
) -> Result<(), BackendError> {
    match report {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(BackendError::Udev(e)),
        Err(e) => Err(BackendError::Task(e.to_string())),
    }
}

/// udev event kinds the port table reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UdevAction {
    Add,
    Remove,
    Other,
}

/// Build a descriptor from the udev properties of `devnode`.
pub fn port_from_properties<F>(token: SessionToken, devnode: &Path, property: F) -> PortInfo
where
    F: Fn(&str) -> Option<String>,
{
    let non_empty = |key: &str| property(key).filter(|v| !v.is_empty());
    PortInfo {
        token,
        path: devnode.to_path_buf(),
        display_name: non_empty("ID_MODEL_FROM_DATABASE").or_else(|| non_empty("ID_MODEL")),
        device_instance_id: None,
        vendor_id: property("ID_VENDOR_ID").as_deref().and_then(parse_usb_id),
        product_id: property("ID_MODEL_ID").as_deref().and_then(parse_usb_id),
        serial_number: property("ID_SERIAL_SHORT"),
        usb_driver_name: non_empty("ID_USB_DRIVER"),
    }
}

/// udev reports USB ids as four hex digits without prefix, e.g. `0403`.
pub fn parse_usb_id(raw: &str) -> Option<u16> {
    let raw = raw.trim();
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .unwrap_or(raw);
    u16::from_str_radix(digits, 16).ok()
}

/// Ports currently present, keyed by device node.
///
/// A port keeps its session token for as long as it stays plugged in; a
/// replug is a new port with a new token.
#[derive(Debug, Default)]
pub struct PortTable {
    ports: BTreeMap<PathBuf, PortInfo>,
}

impl PortTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a port arrival. Returns the new descriptor, or `None` when the
    /// node is already known (udev repeats `add` for `change`/`bind` noise).
    pub fn insert<F>(&mut self, devnode: &Path, property: F) -> Option<PortInfo>
    where
        F: Fn(&str) -> Option<String>,
    {
        if self.ports.contains_key(devnode) {
            return None;
        }
        let port = port_from_properties(SessionToken::generate(), devnode, property);
        self.ports.insert(devnode.to_path_buf(), port.clone());
        Some(port)
    }

    pub fn remove(&mut self, devnode: &Path) -> Option<PortInfo> {
        self.ports.remove(devnode)
    }

    /// Apply one monitor event and return what the client should hear.
    ///
    /// Arrivals without a parent device (virtual consoles) are ignored.
    /// Removals match on the node alone: an unplugged adapter's parent is
    /// usually gone before its tty's `remove` arrives.
    pub fn apply<F>(
        &mut self,
        action: UdevAction,
        devnode: &Path,
        has_parent: bool,
        property: F,
    ) -> Option<PortEvent>
    where
        F: Fn(&str) -> Option<String>,
    {
        match action {
            UdevAction::Add if has_parent => self.insert(devnode, property).map(PortEvent::Added),
            UdevAction::Remove => self.remove(devnode).map(|port| PortEvent::Removed(port.token)),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> Vec<PortInfo> {
        self.ports.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.ports.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ports.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn ftdi_adapter_properties() {
        let p = props(&[
            ("ID_VENDOR_ID", "0403"),
            ("ID_MODEL_ID", "6001"),
            ("ID_SERIAL_SHORT", "A50285BI"),
            ("ID_MODEL", "FT232R_USB_UART"),
            ("ID_MODEL_FROM_DATABASE", "FT232 Serial (UART) IC"),
            ("ID_USB_DRIVER", "ftdi_sio"),
        ]);
        let token = SessionToken::generate();
        let port = port_from_properties(token, Path::new("/dev/ttyUSB0"), |k| p.get(k).cloned());
        assert_eq!(port.token, token);
        assert_eq!(port.path, PathBuf::from("/dev/ttyUSB0"));
        assert_eq!(port.display_name.as_deref(), Some("FT232 Serial (UART) IC"));
        assert_eq!(port.vendor_id, Some(0x0403));
        assert_eq!(port.product_id, Some(0x6001));
        assert_eq!(port.serial_number.as_deref(), Some("A50285BI"));
        assert_eq!(port.usb_driver_name.as_deref(), Some("ftdi_sio"));
        assert_eq!(port.device_instance_id, None);
    }

    #[test]
    fn bare_tty_has_no_identity() {
        let port = port_from_properties(SessionToken::generate(), Path::new("/dev/ttyS0"), |_| None);
        assert_eq!(port.display_name, None);
        assert_eq!(port.vendor_id, None);
        assert_eq!(port.name(), "/dev/ttyS0");
    }

    #[test]
    fn model_name_falls_back_when_database_name_is_empty() {
        let p = props(&[("ID_MODEL_FROM_DATABASE", ""), ("ID_MODEL", "CP2102_USB_to_UART")]);
        let port = port_from_properties(SessionToken::generate(), Path::new("/dev/ttyUSB1"), |k| p.get(k).cloned());
        assert_eq!(port.display_name.as_deref(), Some("CP2102_USB_to_UART"));
    }

    #[test]
    fn usb_id_parsing() {
        assert_eq!(parse_usb_id("0403"), Some(0x0403));
        assert_eq!(parse_usb_id("0x10C4"), Some(0x10c4));
        assert_eq!(parse_usb_id("zz"), None);
        assert_eq!(parse_usb_id("12345"), None);
    }

    #[test]
    fn table_keeps_token_until_replug() {
        let mut table = PortTable::new();
        let node = Path::new("/dev/ttyACM0");
        let first = table.insert(node, |_| None).expect("new port");
        assert!(table.insert(node, |_| None).is_none());
        assert_eq!(table.snapshot(), vec![first.clone()]);

        assert_eq!(table.remove(node), Some(first.clone()));
        assert!(table.is_empty());
        let second = table.insert(node, |_| None).expect("replugged");
        assert_ne!(second.token, first.token);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn orphaned_remove_frees_node_for_replug() {
        let mut table = PortTable::new();
        let node = Path::new("/dev/ttyUSB0");
        let p = props(&[("ID_VENDOR_ID", "0403"), ("ID_MODEL_ID", "6001")]);

        let Some(PortEvent::Added(first)) =
            table.apply(UdevAction::Add, node, true, |k| p.get(k).cloned())
        else {
            panic!("first arrival not announced");
        };
        // The adapter's parent is already gone when the tty removal arrives.
        assert_eq!(
            table.apply(UdevAction::Remove, node, false, |_| None),
            Some(PortEvent::Removed(first.token))
        );
        assert!(table.is_empty());

        let Some(PortEvent::Added(second)) =
            table.apply(UdevAction::Add, node, true, |k| p.get(k).cloned())
        else {
            panic!("replug not announced");
        };
        assert_ne!(second.token, first.token);
        assert_eq!(second.vendor_id, Some(0x0403));
    }

    #[test]
    fn parentless_and_unrelated_events_are_ignored() {
        let mut table = PortTable::new();
        let node = Path::new("/dev/tty1");
        assert_eq!(table.apply(UdevAction::Add, node, false, |_| None), None);
        assert_eq!(table.apply(UdevAction::Remove, node, false, |_| None), None);

        table.insert(Path::new("/dev/ttyACM0"), |_| None);
        assert_eq!(
            table.apply(UdevAction::Other, Path::new("/dev/ttyACM0"), true, |_| None),
            None
        );
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn monitor_startup_report() {
        assert!(monitor_started::<String>(Ok(Ok(()))).is_ok());

        let denied = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "netlink");
        let err = monitor_started::<String>(Ok(Err(denied))).unwrap_err();
        assert!(matches!(err, BackendError::Udev(_)));
        assert!(matches!(ServiceError::from(err), ServiceError::Unavailable(_)));

        let vanished = monitor_started(Err("thread exited")).unwrap_err();
        assert!(matches!(vanished, BackendError::Task(ref m) if m == "thread exited"));
    }
}
