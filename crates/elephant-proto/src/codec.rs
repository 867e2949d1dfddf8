//! Payload codec selection. A request's second preamble byte picks the
//! format; every response on that exchange reuses it.

use serde::de::DeserializeOwned;
use serde::Serialize;

/// The two interchangeable payload encodings.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WireFormat {
    /// Compact binary (postcard).
    #[default]
    Binary,
    /// Textual (JSON), for scripting and debugging clients.
    Text,
}

impl WireFormat {
    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(Self::Binary),
            1 => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_byte(self) -> u8 {
        match self {
            Self::Binary => 0,
            Self::Text => 1,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("binary codec: {0}")]
    Binary(#[from] postcard::Error),
    #[error("text codec: {0}")]
    Text(#[from] serde_json::Error),
}

pub fn encode<T: Serialize>(format: WireFormat, value: &T) -> Result<Vec<u8>, CodecError> {
    match format {
        WireFormat::Binary => Ok(postcard::to_allocvec(value)?),
        WireFormat::Text => Ok(serde_json::to_vec(value)?),
    }
}

pub fn decode<T: DeserializeOwned>(format: WireFormat, bytes: &[u8]) -> Result<T, CodecError> {
    match format {
        WireFormat::Binary => Ok(postcard::from_bytes(bytes)?),
        WireFormat::Text => Ok(serde_json::from_slice(bytes)?),
    }
}
