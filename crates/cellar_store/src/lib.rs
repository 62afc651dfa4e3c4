//! Cellar store: a sorted, tablet-partitioned cell store.
//!
//! A single node hosts:
//! - a `TabletEngine` (in-memory or fjall-backed) holding cells sorted by
//!   `(row, family, qualifier)` per table,
//! - tablet bookkeeping: split points, locality groups, server-side
//!   iterator settings, and a metadata catalog for location discovery,
//! - the `CellarClient` surface used by the connector crate: batch
//!   writers, scanners, range splitting, and table administration.
//!
//! `start_embedded_node` wires these together in-process; production
//! deployments would swap the embedded node for a remote cluster behind
//! the same client surface.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

pub mod cell;
pub mod client;
pub mod kv;
pub mod tablet;

pub use cell::{successor, Cell, CellKey, ColumnUpdate, Mutation, RowRange};
pub use client::{
    Authorizations, BatchWriter, BatchWriterConfig, CellarClient, ColumnFilter, ScanSpec,
};
pub use kv::{FjallEngine, MemoryEngine, TableId, TabletEngine};
pub use tablet::{CombinerKind, IteratorScope, IteratorSetting, METADATA_TABLE};

/// Error kinds crossing the store boundary. Callers treat `Backend` as
/// non-recoverable within one operation.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backend failure: {0}")]
    Backend(String),
    #[error("authorization failure: {0}")]
    Auth(String),
    #[error("table not found: {0}")]
    NotFound(String),
}

impl From<fjall::Error> for StoreError {
    fn from(err: fjall::Error) -> Self {
        StoreError::Backend(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Configuration for an embedded single-process node.
#[derive(Debug, Clone)]
pub struct EmbeddedNodeConfig {
    /// Engine directory; `None` keeps all cells in memory.
    pub data_dir: Option<PathBuf>,
    /// Advertised tablet-server addresses used for location assignment.
    pub tablet_servers: Vec<String>,
}

impl Default for EmbeddedNodeConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            tablet_servers: vec!["localhost:9997".to_string()],
        }
    }
}

/// Start an embedded node and return a connected client.
pub fn start_embedded_node(config: EmbeddedNodeConfig) -> Result<CellarClient> {
    let engine: Arc<dyn TabletEngine> = match &config.data_dir {
        Some(dir) => Arc::new(FjallEngine::open(dir)?),
        None => Arc::new(MemoryEngine::new()),
    };
    let servers = if config.tablet_servers.is_empty() {
        EmbeddedNodeConfig::default().tablet_servers
    } else {
        config.tablet_servers
    };
    Ok(CellarClient::new(Arc::new(client::Node::new(
        engine, servers,
    ))))
}
