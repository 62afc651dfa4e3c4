//! Error kinds crossing the connector boundary.

use cellar_store::StoreError;
use thiserror::Error;

/// Connector-level failures. `Backend` wraps any storage fault and is not
/// recovered internally; `Misconfiguration` marks bad schema or serializer
/// setup; `Invariant` marks external corruption of the index or metrics
/// tables and is fatal.
#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error(transparent)]
    Backend(#[from] StoreError),
    #[error("misconfiguration: {0}")]
    Misconfiguration(String),
    #[error("invariant violation: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, ConnectorError>;
