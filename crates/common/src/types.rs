use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::token::SessionToken;

/// Persisted form of a granted device: a flat JSON object.
pub type AttributeMap = serde_json::Map<String, serde_json::Value>;

/// Web origin a grant is scoped to, e.g. `https://example.com`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Origin(String);

impl Origin {
    pub fn new(origin: impl Into<String>) -> Self {
        Self(origin.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Origin {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// A serial port as currently reported by the enumeration service.
///
/// Only `token` is guaranteed; every other field depends on what the platform
/// could tell us about the device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortInfo {
    pub token: SessionToken,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_instance_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usb_driver_name: Option<String>,
}

impl PortInfo {
    pub fn new(token: SessionToken, path: impl Into<PathBuf>) -> Self {
        Self {
            token,
            path: path.into(),
            display_name: None,
            device_instance_id: None,
            vendor_id: None,
            product_id: None,
            serial_number: None,
            usb_driver_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_instance_id(mut self, id: impl Into<String>) -> Self {
        self.device_instance_id = Some(id.into());
        self
    }

    pub fn with_usb_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = Some(vendor_id);
        self.product_id = Some(product_id);
        self
    }

    pub fn with_serial_number(mut self, serial: impl Into<String>) -> Self {
        self.serial_number = Some(serial.into());
        self
    }

    pub fn with_usb_driver(mut self, driver: impl Into<String>) -> Self {
        self.usb_driver_name = Some(driver.into());
        self
    }

    /// Same device identity under a new session token, as seen after a replug.
    pub fn reconnected(&self, token: SessionToken) -> Self {
        Self {
            token,
            ..self.clone()
        }
    }

    /// Name shown to users: the display name, else the device path.
    pub fn name(&self) -> String {
        match self.display_name.as_deref() {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => self.path.to_string_lossy().into_owned(),
        }
    }
}
