//! # Adapter Configuration
//!
//! Where policies are stored and how the HTTP client behaves. Every field has
//! a default, so `AdapterOptions::default()` targets database `casbin` and
//! container `casbin_rule`. Options also deserialize from JSON with missing
//! fields taking their defaults.

use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_DATABASE_NAME: &str = "casbin";
pub const DEFAULT_CONTAINER_NAME: &str = "casbin_rule";
pub const DEFAULT_API_VERSION: &str = "2018-12-31";

/// Storage location for the policy adapter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdapterOptions {
    /// Database holding the policy container, created if missing
    pub database_name: String,
    /// Container holding one document per rule, created if missing
    pub container_name: String,
    /// HTTP client settings
    pub client: ClientOptions,
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            database_name: DEFAULT_DATABASE_NAME.to_string(),
            container_name: DEFAULT_CONTAINER_NAME.to_string(),
            client: ClientOptions::default(),
        }
    }
}

impl AdapterOptions {
    pub fn with_database(mut self, name: impl Into<String>) -> Self {
        self.database_name = name.into();
        self
    }

    pub fn with_container(mut self, name: impl Into<String>) -> Self {
        self.container_name = name.into();
        self
    }
}

/// Settings for the Cosmos DB REST client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientOptions {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Value sent as `x-ms-version`
    pub api_version: String,
    /// Value sent as `User-Agent`
    pub user_agent: String,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            api_version: DEFAULT_API_VERSION.to_string(),
            user_agent: concat!("cosmos-policy-adapter/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

impl ClientOptions {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
