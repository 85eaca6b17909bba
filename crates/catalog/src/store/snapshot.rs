use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::atomic_io::write_snapshot_atomic;
use super::database::DbState;

const MAGIC: &[u8; 4] = b"CTDB";

pub(crate) const SNAPSHOT_FORMAT_VERSION: u16 = 1;

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read/write snapshot {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("snapshot at {path} has invalid format: {message}")]
    InvalidFormat { path: PathBuf, message: String },
}

/// Layout: magic, format version (u16), table count (u32), payload length
/// (u32), SHA-256 of the payload, then the JSON payload. Integers are
/// little-endian.
pub(crate) fn write_snapshot(path: &Path, state: &DbState) -> Result<(), SnapshotError> {
    let payload = serde_json::to_vec(state)
        .map_err(|error| invalid_format(path, &format!("failed to encode tables: {error}")))?;
    let table_count = u32::try_from(state.table_count())
        .map_err(|_| invalid_format(path, "too many tables"))?;
    let payload_len =
        u32::try_from(payload.len()).map_err(|_| invalid_format(path, "payload too large"))?;

    let mut bytes = Vec::<u8>::with_capacity(payload.len() + 46);
    bytes.extend_from_slice(MAGIC);
    bytes.extend_from_slice(&SNAPSHOT_FORMAT_VERSION.to_le_bytes());
    bytes.extend_from_slice(&table_count.to_le_bytes());
    bytes.extend_from_slice(&payload_len.to_le_bytes());
    bytes.extend_from_slice(&sha256_bytes(&payload));
    bytes.extend_from_slice(&payload);

    write_snapshot_atomic(path, &bytes).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn read_snapshot(path: &Path) -> Result<DbState, SnapshotError> {
    let bytes = fs::read(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut cursor = 0usize;

    if read_exact(&bytes, &mut cursor, 4, path)? != MAGIC {
        return Err(invalid_format(path, "invalid magic"));
    }
    let version = read_u16(&bytes, &mut cursor, path)?;
    if version != SNAPSHOT_FORMAT_VERSION {
        return Err(invalid_format(
            path,
            &format!("unsupported format version {version}"),
        ));
    }
    let table_count = read_u32(&bytes, &mut cursor, path)? as usize;
    let payload_len = read_u32(&bytes, &mut cursor, path)? as usize;
    let expected_hash = read_exact(&bytes, &mut cursor, 32, path)?;
    let payload = read_exact(&bytes, &mut cursor, payload_len, path)?;
    if cursor != bytes.len() {
        return Err(invalid_format(path, "unexpected trailing bytes"));
    }
    if expected_hash != sha256_bytes(payload) {
        return Err(invalid_format(path, "payload hash mismatch"));
    }

    let mut deserializer = serde_json::Deserializer::from_slice(payload);
    let state: DbState = serde_path_to_error::deserialize(&mut deserializer).map_err(|error| {
        invalid_format(
            path,
            &format!("invalid table data at {}: {}", error.path(), error.inner()),
        )
    })?;
    if state.table_count() != table_count {
        return Err(invalid_format(path, "table count mismatch"));
    }
    Ok(state)
}

fn read_u16(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u16, SnapshotError> {
    let raw = read_exact(bytes, cursor, 2, path)?;
    raw.try_into()
        .map(u16::from_le_bytes)
        .map_err(|_| invalid_format(path, "invalid u16 encoding"))
}

fn read_u32(bytes: &[u8], cursor: &mut usize, path: &Path) -> Result<u32, SnapshotError> {
    let raw = read_exact(bytes, cursor, 4, path)?;
    raw.try_into()
        .map(u32::from_le_bytes)
        .map_err(|_| invalid_format(path, "invalid u32 encoding"))
}

fn read_exact<'a>(
    bytes: &'a [u8],
    cursor: &mut usize,
    len: usize,
    path: &Path,
) -> Result<&'a [u8], SnapshotError> {
    let end = cursor.saturating_add(len);
    if end > bytes.len() {
        return Err(invalid_format(path, "unexpected end of file"));
    }
    let out = &bytes[*cursor..end];
    *cursor = end;
    Ok(out)
}

fn sha256_bytes(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn invalid_format(path: &Path, message: &str) -> SnapshotError {
    SnapshotError::InvalidFormat {
        path: path.to_path_buf(),
        message: message.to_string(),
    }
}
