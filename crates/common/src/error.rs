use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token is not valid base64: {0}")]
    Malformed(String),
    #[error("decoded token is {0} bytes, expected 16")]
    Length(usize),
}

/// Failures talking to the device enumeration service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    #[error("enumeration service unavailable: {0}")]
    Unavailable(String),
    #[error("enumeration service disconnected")]
    Disconnected,
    #[error("client registration rejected: {0}")]
    ClientRejected(String),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("grant store io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("grant store encoding error: {0}")]
    Encoding(#[from] serde_json::Error),
}
