//! # Document Store Module
//!
//! The outbound side of the adapter: the handful of document-database calls
//! the adapter needs, behind one trait so the Cosmos DB client and the
//! in-memory store are interchangeable.

pub mod cosmos;
pub mod memory;

pub use cosmos::{ConnectionString, CosmosClient};
pub use memory::MemoryStore;

use crate::query::SqlQuerySpec;
use crate::record::PolicyRecord;
use thiserror::Error;

/// Document path the container is partitioned on.
pub const PARTITION_KEY_PATH: &str = "/pType";

/// Errors raised by a document store call.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Unable to {operation}: unexpected status code {status}")]
    UnexpectedStatus { operation: String, status: u16 },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported query: {0}")]
    UnsupportedQuery(String),

    #[error("Resource not found")]
    NotFound,
}

impl StoreError {
    /// True when the store reported the resource as missing.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NotFound | StoreError::Status { status: 404, .. }
        )
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Document database operations used by the policy adapter.
///
/// Records are partitioned by their policy type.
pub trait DocumentStore {
    /// Creates the database if it does not exist yet.
    fn ensure_database(&self) -> StoreResult<()>;

    /// Creates the container, partitioned on [`PARTITION_KEY_PATH`], if it
    /// does not exist yet.
    fn ensure_container(&self) -> StoreResult<()>;

    /// Drops the container with everything in it and creates it again empty.
    fn recreate_container(&self) -> StoreResult<()>;

    /// Inserts a new record into partition `record.ptype`.
    fn create_item(&self, record: &PolicyRecord) -> StoreResult<()>;

    /// Deletes the record `id` from `partition`.
    fn delete_item(&self, partition: &str, id: &str) -> StoreResult<()>;

    /// Runs `spec`, following continuation pages until exhausted.
    ///
    /// `partition` scopes the query to one partition; `None` queries across
    /// all of them.
    fn query_items(
        &self,
        spec: &SqlQuerySpec,
        partition: Option<&str>,
    ) -> StoreResult<Vec<PolicyRecord>>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for Box<T> {
    fn ensure_database(&self) -> StoreResult<()> {
        (**self).ensure_database()
    }

    fn ensure_container(&self) -> StoreResult<()> {
        (**self).ensure_container()
    }

    fn recreate_container(&self) -> StoreResult<()> {
        (**self).recreate_container()
    }

    fn create_item(&self, record: &PolicyRecord) -> StoreResult<()> {
        (**self).create_item(record)
    }

    fn delete_item(&self, partition: &str, id: &str) -> StoreResult<()> {
        (**self).delete_item(partition, id)
    }

    fn query_items(
        &self,
        spec: &SqlQuerySpec,
        partition: Option<&str>,
    ) -> StoreResult<Vec<PolicyRecord>> {
        (**self).query_items(spec, partition)
    }
}
