//! # Cosmos Policy Adapter
//!
//! Stores Casbin-style policy rules in an Azure Cosmos DB container, one
//! document per rule.

// Core modules
pub mod adapter;
pub mod config;
pub mod error;
pub mod model;
pub mod query;
pub mod record;
pub mod store;

// Re-export commonly used types
pub use adapter::{Adapter, CosmosAdapter};
pub use config::{AdapterOptions, ClientOptions};
pub use error::{AdapterError, Result};
pub use model::{DefaultModel, Model};
pub use query::{QueryParameter, SqlQuerySpec};
pub use record::PolicyRecord;
pub use store::{ConnectionString, CosmosClient, DocumentStore, MemoryStore, StoreError};
