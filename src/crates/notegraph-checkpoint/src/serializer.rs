use crate::error::Result;
use serde::{de::DeserializeOwned, Serialize};

/// On-disk encoding for checkpoint records.
///
/// JSON is the default (debuggable, cross-language); bincode is available
/// where snapshot size matters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Serializer {
    #[default]
    Json,
    Bincode,
}

impl Serializer {
    pub fn to_bytes<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        match self {
            Serializer::Json => Ok(serde_json::to_vec(value)?),
            Serializer::Bincode => Ok(bincode::serialize(value)?),
        }
    }

    pub fn from_bytes<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        match self {
            Serializer::Json => Ok(serde_json::from_slice(bytes)?),
            Serializer::Bincode => Ok(bincode::deserialize(bytes)?),
        }
    }

    /// File extension used by [`crate::FileSaver`].
    pub fn extension(&self) -> &'static str {
        match self {
            Serializer::Json => "json",
            Serializer::Bincode => "bin",
        }
    }
}
