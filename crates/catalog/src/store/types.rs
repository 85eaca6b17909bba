use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::snapshot::SnapshotError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no row with id {id} in table {table}")]
    NotFound { table: &'static str, id: RecordId },
    #[error("failed to encode row for table {table}: {source}")]
    Encode {
        table: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("row in table {table} failed to decode at {path}: {message}")]
    Decode {
        table: &'static str,
        path: String,
        message: String,
    },
    #[error(transparent)]
    Snapshot(#[from] SnapshotError),
}
