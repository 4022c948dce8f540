pub mod audit;
pub mod error;
pub mod fingerprint;
pub mod identity;
pub mod prefs;
pub mod service;
pub mod token;
pub mod types;

pub use error::{ServiceError, StoreError, TokenError};
pub use identity::IdentityScheme;
pub use service::{PortClient, PortEvent, PortManager, PortService};
pub use token::SessionToken;
pub use types::{AttributeMap, Origin, PortInfo};
