use std::fmt;

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::TokenError;

const TOKEN_LEN: usize = 16;

/// Unguessable per-connection identifier the enumeration service assigns to a port.
///
/// Serialized as its base64 encoding so that attribute maps and logs only ever
/// carry the textual form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct SessionToken {
    high: u64,
    low: u64,
}

impl SessionToken {
    /// Draw a fresh token from the OS RNG. Never returns the null token.
    pub fn generate() -> Self {
        loop {
            let token = Self {
                high: OsRng.next_u64(),
                low: OsRng.next_u64(),
            };
            if !token.is_null() {
                return token;
            }
        }
    }

    pub const fn from_parts(high: u64, low: u64) -> Self {
        Self { high, low }
    }

    pub fn high(&self) -> u64 {
        self.high
    }

    pub fn low(&self) -> u64 {
        self.low
    }

    pub fn is_null(&self) -> bool {
        self.high == 0 && self.low == 0
    }

    /// Fixed-length base64 form: 16 bytes in, 24 characters out.
    pub fn encode(&self) -> String {
        let mut buf = [0u8; TOKEN_LEN];
        buf[..8].copy_from_slice(&self.high.to_le_bytes());
        buf[8..].copy_from_slice(&self.low.to_le_bytes());
        B64.encode(buf)
    }

    pub fn decode(input: &str) -> Result<Self, TokenError> {
        let bytes = B64
            .decode(input)
            .map_err(|e| TokenError::Malformed(e.to_string()))?;
        if bytes.len() != TOKEN_LEN {
            return Err(TokenError::Length(bytes.len()));
        }
        let mut high = [0u8; 8];
        let mut low = [0u8; 8];
        high.copy_from_slice(&bytes[..8]);
        low.copy_from_slice(&bytes[8..]);
        Ok(Self {
            high: u64::from_le_bytes(high),
            low: u64::from_le_bytes(low),
        })
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

impl From<SessionToken> for String {
    fn from(token: SessionToken) -> Self {
        token.encode()
    }
}

impl TryFrom<String> for SessionToken {
    type Error = TokenError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::decode(&value)
    }
}
