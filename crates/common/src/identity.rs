use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{AttributeMap, PortInfo};

pub const PORT_NAME_KEY: &str = "name";
pub const TOKEN_KEY: &str = "token";
pub const DEVICE_INSTANCE_ID_KEY: &str = "device_instance_id";
pub const VENDOR_ID_KEY: &str = "vendor_id";
pub const PRODUCT_ID_KEY: &str = "product_id";
pub const SERIAL_NUMBER_KEY: &str = "serial_number";
pub const USB_DRIVER_KEY: &str = "usb_driver";

/// How a port is re-recognized after it disappears and comes back.
///
/// Each platform exposes a different set of stable attributes, so the scheme
/// is chosen once at startup and then drives both the persistence rule and the
/// shape of stored grant records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IdentityScheme {
    /// OS-assigned device instance id (Windows).
    InstanceId,
    /// USB vendor id, product id and serial number.
    VendorProductSerial,
    /// Vendor/product/serial plus the USB driver name. macOS can surface the
    /// same adapter twice when both the built-in and the vendor driver claim it.
    VendorProductSerialDriver,
}

impl IdentityScheme {
    pub fn native() -> Self {
        if cfg!(target_os = "windows") {
            IdentityScheme::InstanceId
        } else if cfg!(target_os = "macos") {
            IdentityScheme::VendorProductSerialDriver
        } else {
            IdentityScheme::VendorProductSerial
        }
    }

    /// Whether a grant for `port` may outlive the current session.
    ///
    /// Without a display name the path would be shown instead, and paths like
    /// `/dev/ttyUSB0` get reused for unrelated devices.
    pub fn can_persist(&self, port: &PortInfo) -> bool {
        if !non_empty(port.display_name.as_deref()) {
            return false;
        }
        match self {
            IdentityScheme::InstanceId => non_empty(port.device_instance_id.as_deref()),
            IdentityScheme::VendorProductSerial => has_usb_identity(port),
            IdentityScheme::VendorProductSerialDriver => {
                has_usb_identity(port) && non_empty(port.usb_driver_name.as_deref())
            }
        }
    }

    /// Build the record stored for a grant on `port`.
    ///
    /// Ports that cannot persist only get their session token, so the record is
    /// recognizably ephemeral even if it ends up in durable storage by mistake.
    pub fn to_attributes(&self, port: &PortInfo) -> AttributeMap {
        let mut map = AttributeMap::new();
        map.insert(PORT_NAME_KEY.into(), Value::String(port.name()));

        if !self.can_persist(port) {
            map.insert(TOKEN_KEY.into(), Value::String(port.token.encode()));
            return map;
        }

        match self {
            IdentityScheme::InstanceId => {
                insert_str(&mut map, DEVICE_INSTANCE_ID_KEY, &port.device_instance_id);
            }
            IdentityScheme::VendorProductSerial | IdentityScheme::VendorProductSerialDriver => {
                insert_id(&mut map, VENDOR_ID_KEY, port.vendor_id);
                insert_id(&mut map, PRODUCT_ID_KEY, port.product_id);
                insert_str(&mut map, SERIAL_NUMBER_KEY, &port.serial_number);
                if *self == IdentityScheme::VendorProductSerialDriver {
                    insert_str(&mut map, USB_DRIVER_KEY, &port.usb_driver_name);
                }
            }
        }
        map
    }

    /// Whether a stored record describes `port`. Missing or mistyped fields
    /// never match.
    pub fn matches(&self, stored: &AttributeMap, port: &PortInfo) -> bool {
        match self {
            IdentityScheme::InstanceId => {
                same_str(stored, DEVICE_INSTANCE_ID_KEY, &port.device_instance_id)
            }
            IdentityScheme::VendorProductSerial => usb_identity_matches(stored, port),
            IdentityScheme::VendorProductSerialDriver => {
                usb_identity_matches(stored, port)
                    && same_str(stored, USB_DRIVER_KEY, &port.usb_driver_name)
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityScheme::InstanceId => "instance-id",
            IdentityScheme::VendorProductSerial => "vendor-product-serial",
            IdentityScheme::VendorProductSerialDriver => "vendor-product-serial-driver",
        }
    }
}

impl Default for IdentityScheme {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for IdentityScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IdentityScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "instance-id" => Ok(IdentityScheme::InstanceId),
            "vendor-product-serial" => Ok(IdentityScheme::VendorProductSerial),
            "vendor-product-serial-driver" => Ok(IdentityScheme::VendorProductSerialDriver),
            other => Err(format!("unknown identity scheme: {other}")),
        }
    }
}

fn non_empty(value: Option<&str>) -> bool {
    value.is_some_and(|v| !v.is_empty())
}

fn has_usb_identity(port: &PortInfo) -> bool {
    port.vendor_id.is_some()
        && port.product_id.is_some()
        && non_empty(port.serial_number.as_deref())
}

fn usb_identity_matches(stored: &AttributeMap, port: &PortInfo) -> bool {
    same_id(stored, VENDOR_ID_KEY, port.vendor_id)
        && same_id(stored, PRODUCT_ID_KEY, port.product_id)
        && same_str(stored, SERIAL_NUMBER_KEY, &port.serial_number)
}

fn insert_str(map: &mut AttributeMap, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        map.insert(key.into(), Value::String(v.clone()));
    }
}

fn insert_id(map: &mut AttributeMap, key: &str, value: Option<u16>) {
    if let Some(v) = value {
        map.insert(key.into(), Value::from(v));
    }
}

fn same_str(stored: &AttributeMap, key: &str, live: &Option<String>) -> bool {
    match (stored.get(key).and_then(Value::as_str), live.as_deref()) {
        (Some(s), Some(l)) => s == l,
        _ => false,
    }
}

fn same_id(stored: &AttributeMap, key: &str, live: Option<u16>) -> bool {
    let stored = stored
        .get(key)
        .and_then(Value::as_u64)
        .and_then(|v| u16::try_from(v).ok());
    matches!((stored, live), (Some(s), Some(l)) if s == l)
}
