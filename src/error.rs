//! # Adapter Errors
//!
//! Three failure classes reach the caller:
//! - `Configuration`: the adapter could not be constructed (bad connection
//!   string, unreachable account, failed database/container bootstrap)
//! - `Store`: any failure talking to the document store during an operation
//! - `FilteredState`: a full save or clear was attempted on a partial view

use crate::store::StoreError;
use thiserror::Error;

/// Errors returned by the policy adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Cannot save a filtered policy")]
    FilteredState,
}

impl AdapterError {
    /// Wraps a bootstrap-time store failure as a configuration error.
    pub(crate) fn bootstrap(step: &str, err: StoreError) -> Self {
        AdapterError::Configuration(format!("{} failed: {}", step, err))
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
