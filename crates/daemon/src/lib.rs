//! Serial port permission authority.
//!
//! [`SerialChooserContext`] decides per origin whether a serial port may be
//! opened. Ports that can be re-identified after a replug get durable grants
//! in a profile-wide [`GrantedObjectStore`]; all others get session grants
//! that vanish with the enumeration service connection.
//!
//! [`GrantedObjectStore`]: serialgate_common::prefs::GrantedObjectStore

pub mod audit;
pub mod config;
mod connection;
pub mod context;
pub mod observer;
pub mod permissions;
pub mod store;

pub use audit::AuditLogger;
pub use config::{load_config, DaemonConfig, DEFAULT_CONFIG_PATH};
pub use connection::ConnectionState;
pub use context::SerialChooserContext;
pub use observer::{ObserverList, PortObserver};
pub use permissions::{GrantKind, PermissionStore};
pub use store::JsonGrantStore;
