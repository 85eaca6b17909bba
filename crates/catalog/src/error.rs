use std::io;

use thiserror::Error;

use crate::store::StoreError;

/// Broad failure classes the presentation layer branches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Validation,
    Codec,
    Storage,
}

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("invalid {kind}: {message}")]
    Validation { kind: &'static str, message: String },
    #[error("failed to read payload of asset '{name}': {source}")]
    Codec {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl CatalogError {
    pub(crate) fn validation(kind: &'static str, message: impl Into<String>) -> Self {
        Self::Validation {
            kind,
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } => ErrorKind::Validation,
            Self::Codec { .. } => ErrorKind::Codec,
            Self::Store(StoreError::NotFound { .. }) => ErrorKind::NotFound,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}
