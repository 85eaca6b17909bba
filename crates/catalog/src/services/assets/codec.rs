//! Conversion between a live binary payload and the byte buffer that is
//! actually persisted.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{de, Deserialize, Deserializer, Serializer};
use tracing::debug;

use crate::error::CatalogError;

use super::Asset;

pub trait BinarySource: fmt::Debug + Send + Sync {
    fn name(&self) -> &str;
    fn mime_type(&self) -> &str;
    fn read_all(&self) -> io::Result<Vec<u8>>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    name: String,
    mime_type: String,
    bytes: Arc<[u8]>,
}

impl MemoryFile {
    pub fn new(
        name: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: impl Into<Vec<u8>>,
    ) -> Self {
        let bytes: Vec<u8> = bytes.into();
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: Arc::from(bytes),
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl BinarySource for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_all(&self) -> io::Result<Vec<u8>> {
        Ok(self.bytes.to_vec())
    }
}

#[derive(Debug, Clone)]
pub struct PathSource {
    path: PathBuf,
    name: String,
    mime_type: String,
}

impl PathSource {
    pub fn new(path: impl Into<PathBuf>, mime_type: impl Into<String>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            name,
            mime_type: mime_type.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BinarySource for PathSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn mime_type(&self) -> &str {
        &self.mime_type
    }

    fn read_all(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }
}

/// The two forms of an asset's bytes. `Live` exists only in memory;
/// `AtRest` is what the store keeps.
#[derive(Debug, Clone)]
pub enum AssetPayload {
    Live(Arc<dyn BinarySource>),
    AtRest { buffer: Vec<u8>, mime_type: String },
}

impl AssetPayload {
    pub fn live(source: impl BinarySource + 'static) -> Self {
        Self::Live(Arc::new(source))
    }

    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    pub fn mime_type(&self) -> &str {
        match self {
            Self::Live(source) => source.mime_type(),
            Self::AtRest { mime_type, .. } => mime_type,
        }
    }

    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match self {
            Self::Live(source) => source.read_all(),
            Self::AtRest { buffer, .. } => Ok(buffer.clone()),
        }
    }
}

pub fn to_at_rest(mut asset: Asset) -> Result<Asset, CatalogError> {
    asset.file = match asset.file.take() {
        Some(AssetPayload::Live(source)) => {
            let buffer = source.read_all().map_err(|error| CatalogError::Codec {
                name: asset.name.clone(),
                source: error,
            })?;
            debug!(
                asset = %asset.name,
                byte_len = buffer.len(),
                mime_type = source.mime_type(),
                "asset_payload_buffered"
            );
            Some(AssetPayload::AtRest {
                buffer,
                mime_type: source.mime_type().to_string(),
            })
        }
        other => other,
    };
    Ok(asset)
}

pub fn to_live(mut asset: Asset) -> Asset {
    asset.file = match asset.file.take() {
        Some(AssetPayload::AtRest { buffer, mime_type }) if !mime_type.is_empty() => Some(
            AssetPayload::live(MemoryFile::new(asset.name.clone(), mime_type, buffer)),
        ),
        other => other,
    };
    asset
}

pub(super) fn serialize_buffer<S: Serializer>(
    buffer: &Option<&[u8]>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match buffer {
        Some(bytes) => serializer.serialize_str(&STANDARD.encode(bytes)),
        None => serializer.serialize_none(),
    }
}

pub(super) fn deserialize_buffer<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<u8>>, D::Error> {
    Option::<String>::deserialize(deserializer)?
        .map(|encoded| STANDARD.decode(encoded).map_err(de::Error::custom))
        .transpose()
}
