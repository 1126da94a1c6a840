//! # Cosmos DB REST Client
//!
//! Blocking client for the handful of Cosmos DB (SQL API) REST calls the
//! adapter needs, authenticated with the account master key.
//!
//! Every request carries `x-ms-date`, `x-ms-version` and an `Authorization`
//! token of the form `type=master&ver=1.0&sig=<sig>` (url-encoded), where
//! `sig` is base64 HMAC-SHA256 over
//! `verb\nresourceType\nresourceLink\ndate\n\n` with verb, resource type and
//! date lowercased.
//!
//! Built on `reqwest::blocking`, so it must not be driven from inside an
//! async runtime's worker thread.

use super::{DocumentStore, StoreError, StoreResult, PARTITION_KEY_PATH};
use crate::config::AdapterOptions;
use crate::error::AdapterError;
use crate::query::SqlQuerySpec;
use crate::record::PolicyRecord;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use log::{debug, info, warn};
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const HEADER_DATE: &str = "x-ms-date";
const HEADER_VERSION: &str = "x-ms-version";
const HEADER_PARTITION_KEY: &str = "x-ms-documentdb-partitionkey";
const HEADER_IS_QUERY: &str = "x-ms-documentdb-isquery";
const HEADER_CROSS_PARTITION: &str = "x-ms-documentdb-query-enablecrosspartition";
const HEADER_CONTINUATION: &str = "x-ms-continuation";
const QUERY_CONTENT_TYPE: &str = "application/query+json";

// ================================================================================================
// CONNECTION STRING
// ================================================================================================

/// Parsed `AccountEndpoint=...;AccountKey=...;` connection string.
#[derive(Clone, PartialEq, Eq)]
pub struct ConnectionString {
    pub endpoint: String,
    pub key: String,
}

impl std::fmt::Debug for ConnectionString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionString")
            .field("endpoint", &self.endpoint)
            .field("key", &"<redacted>")
            .finish()
    }
}

impl ConnectionString {
    /// Parses a connection string. Keys are case-insensitive, unknown keys
    /// are ignored, and both `AccountEndpoint` and `AccountKey` are required.
    pub fn parse(raw: &str) -> Result<Self, AdapterError> {
        let mut endpoint = None;
        let mut key = None;

        for part in raw.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let Some((name, value)) = part.split_once('=') else {
                return Err(AdapterError::Configuration(format!(
                    "Malformed connection string segment: {}",
                    part
                )));
            };

            match name.trim().to_ascii_lowercase().as_str() {
                "accountendpoint" => endpoint = Some(value.trim().to_string()),
                "accountkey" => key = Some(value.trim().to_string()),
                _ => {}
            }
        }

        match (endpoint, key) {
            (Some(endpoint), Some(key)) if !endpoint.is_empty() && !key.is_empty() => {
                Ok(Self { endpoint, key })
            }
            _ => Err(AdapterError::Configuration(
                "Connection string must contain AccountEndpoint and AccountKey".to_string(),
            )),
        }
    }
}

// ================================================================================================
// CLIENT
// ================================================================================================

/// A page of query results.
#[derive(Debug, Deserialize)]
struct QueryPage {
    #[serde(rename = "Documents", default)]
    documents: Vec<PolicyRecord>,
    #[serde(rename = "_count", default)]
    count: usize,
}

/// Cosmos DB client bound to one database and container.
pub struct CosmosClient {
    http: Client,
    endpoint: String,
    signer: HmacSha256,
    api_version: String,
    database: String,
    container: String,
}

impl std::fmt::Debug for CosmosClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CosmosClient")
            .field("endpoint", &self.endpoint)
            .field("database", &self.database)
            .field("container", &self.container)
            .finish()
    }
}

impl CosmosClient {
    /// Creates a client for `endpoint` signing with the base64 master `key`.
    ///
    /// No request is made here; the account is first contacted by
    /// [`DocumentStore::ensure_database`].
    pub fn new(endpoint: &str, key: &str, options: &AdapterOptions) -> Result<Self, AdapterError> {
        let endpoint = endpoint.trim().trim_end_matches('/').to_string();
        if !endpoint.starts_with("https://") && !endpoint.starts_with("http://") {
            return Err(AdapterError::Configuration(format!(
                "Invalid account endpoint: {}",
                endpoint
            )));
        }

        check_resource_name("database", &options.database_name)?;
        check_resource_name("container", &options.container_name)?;

        let key_bytes = BASE64
            .decode(key.trim())
            .map_err(|e| AdapterError::Configuration(format!("Account key is not valid base64: {}", e)))?;
        let signer = HmacSha256::new_from_slice(&key_bytes)
            .map_err(|e| AdapterError::Configuration(format!("Unusable account key: {}", e)))?;

        let http = Client::builder()
            .timeout(options.client.timeout())
            .user_agent(options.client.user_agent.clone())
            .build()
            .map_err(|e| AdapterError::Configuration(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            endpoint,
            signer,
            api_version: options.client.api_version.clone(),
            database: options.database_name.clone(),
            container: options.container_name.clone(),
        })
    }

    /// Creates a client from a parsed connection string.
    pub fn from_connection_string(
        connection: &ConnectionString,
        options: &AdapterOptions,
    ) -> Result<Self, AdapterError> {
        Self::new(&connection.endpoint, &connection.key, options)
    }

    fn database_link(&self) -> String {
        format!("dbs/{}", self.database)
    }

    fn container_link(&self) -> String {
        format!("dbs/{}/colls/{}", self.database, self.container)
    }

    fn item_link(&self, id: &str) -> String {
        format!("{}/docs/{}", self.container_link(), id)
    }

    // ============================================================================================
    // REQUEST PLUMBING
    // ============================================================================================

    /// Unencoded master-key token for one request.
    fn signature(&self, verb: &Method, resource_type: &str, resource_link: &str, date: &str) -> String {
        let payload = format!(
            "{}\n{}\n{}\n{}\n\n",
            verb.as_str().to_lowercase(),
            resource_type.to_lowercase(),
            resource_link,
            date.to_lowercase()
        );

        let mut mac = self.signer.clone();
        mac.update(payload.as_bytes());
        let sig = BASE64.encode(mac.finalize().into_bytes());

        format!("type=master&ver=1.0&sig={}", sig)
    }

    /// Sends a signed request and maps non-success statuses to errors.
    ///
    /// `path` is the URL path; `resource_link` is what gets signed, which for
    /// feed operations (create, query) is the parent's link.
    fn send(
        &self,
        method: Method,
        path: &str,
        resource_type: &str,
        resource_link: &str,
        configure: impl FnOnce(RequestBuilder) -> StoreResult<RequestBuilder>,
    ) -> StoreResult<Response> {
        let date = http_date(Utc::now());
        let token = self.signature(&method, resource_type, resource_link, &date);
        let url = format!("{}/{}", self.endpoint, path);

        let request = self
            .http
            .request(method.clone(), &url)
            .header(HEADER_DATE, date)
            .header(HEADER_VERSION, self.api_version.as_str())
            .header(AUTHORIZATION, urlencoding::encode(&token).into_owned());

        let response = configure(request)?
            .send()
            .map_err(|e| StoreError::Transport(e.to_string()))?;

        let status = response.status();
        debug!("{} /{} -> {}", method, path, status.as_u16());

        if status.is_success() {
            return Ok(response);
        }

        let message = response.text().unwrap_or_default();
        Err(StoreError::Status {
            status: status.as_u16(),
            message,
        })
    }

    fn create_database(&self) -> StoreResult<()> {
        let body = json!({ "id": self.database });
        match self.send(Method::POST, "dbs", "dbs", "", |req| Ok(req.json(&body))) {
            Ok(_) => Ok(()),
            // Created concurrently by another process.
            Err(StoreError::Status { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }

    fn create_container(&self) -> StoreResult<()> {
        let body = json!({
            "id": self.container,
            "partitionKey": { "paths": [PARTITION_KEY_PATH], "kind": "Hash" }
        });
        let database_link = self.database_link();
        let path = format!("{}/colls", database_link);

        match self.send(Method::POST, &path, "colls", &database_link, |req| Ok(req.json(&body))) {
            Ok(_) => Ok(()),
            Err(StoreError::Status { status: 409, .. }) => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Names are used verbatim in URL paths and signed resource links.
fn check_resource_name(kind: &str, name: &str) -> Result<(), AdapterError> {
    if name.is_empty() || name.trim() != name {
        return Err(AdapterError::Configuration(format!(
            "Invalid {} name: {:?}",
            kind, name
        )));
    }
    if let Some(c) = name.chars().find(|&c| matches!(c, '/' | '\\' | '?' | '#')) {
        return Err(AdapterError::Configuration(format!(
            "Invalid {} name {:?}: character {:?} is not allowed",
            kind, name, c
        )));
    }
    Ok(())
}

/// RFC 1123 date as required by `x-ms-date`.
fn http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn partition_header(partition: &str) -> StoreResult<String> {
    Ok(serde_json::to_string(&[partition])?)
}

impl DocumentStore for CosmosClient {
    fn ensure_database(&self) -> StoreResult<()> {
        let link = self.database_link();
        match self.send(Method::GET, &link, "dbs", &link, Ok) {
            Ok(_) => {
                info!("Using database {}", self.database);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!("Database {} not found, creating it", self.database);
                self.create_database()
            }
            Err(e) => Err(e),
        }
    }

    fn ensure_container(&self) -> StoreResult<()> {
        let link = self.container_link();
        match self.send(Method::GET, &link, "colls", &link, Ok) {
            Ok(_) => {
                info!("Using container {}/{}", self.database, self.container);
                Ok(())
            }
            Err(e) if e.is_not_found() => {
                warn!(
                    "Container {}/{} not found, creating it",
                    self.database, self.container
                );
                self.create_container()
            }
            Err(e) => Err(e),
        }
    }

    fn recreate_container(&self) -> StoreResult<()> {
        let link = self.container_link();
        self.send(Method::DELETE, &link, "colls", &link, Ok)?;
        self.create_container()
    }

    fn create_item(&self, record: &PolicyRecord) -> StoreResult<()> {
        let container_link = self.container_link();
        let path = format!("{}/docs", container_link);
        let partition = partition_header(&record.ptype)?;

        let response = self.send(Method::POST, &path, "docs", &container_link, |req| {
            Ok(req.header(HEADER_PARTITION_KEY, partition).json(record))
        })?;

        let status = response.status();
        if status != StatusCode::CREATED {
            return Err(StoreError::UnexpectedStatus {
                operation: "save policy".to_string(),
                status: status.as_u16(),
            });
        }
        Ok(())
    }

    fn delete_item(&self, partition: &str, id: &str) -> StoreResult<()> {
        let link = self.item_link(id);
        let partition = partition_header(partition)?;
        self.send(Method::DELETE, &link, "docs", &link, |req| {
            Ok(req.header(HEADER_PARTITION_KEY, partition))
        })?;
        Ok(())
    }

    fn query_items(
        &self,
        spec: &SqlQuerySpec,
        partition: Option<&str>,
    ) -> StoreResult<Vec<PolicyRecord>> {
        let container_link = self.container_link();
        let path = format!("{}/docs", container_link);
        let body = serde_json::to_vec(spec)?;
        let partition = partition.map(partition_header).transpose()?;

        let mut records = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self.send(Method::POST, &path, "docs", &container_link, |req| {
                let mut req = req
                    .header(HEADER_IS_QUERY, "True")
                    .header(CONTENT_TYPE, QUERY_CONTENT_TYPE)
                    .body(body.clone());
                req = match &partition {
                    Some(key) => req.header(HEADER_PARTITION_KEY, key.as_str()),
                    None => req.header(HEADER_CROSS_PARTITION, "True"),
                };
                if let Some(token) = &continuation {
                    req = req.header(HEADER_CONTINUATION, token.as_str());
                }
                Ok(req)
            })?;

            let next = response
                .headers()
                .get(HEADER_CONTINUATION)
                .and_then(|v| v.to_str().ok())
                .filter(|v| !v.is_empty())
                .map(str::to_string);

            let bytes = response
                .bytes()
                .map_err(|e| StoreError::Transport(e.to_string()))?;
            let page: QueryPage = serde_json::from_slice(&bytes)?;
            debug!(
                "Query page: {} documents, more pages: {}",
                page.count,
                next.is_some()
            );
            records.extend(page.documents);

            match next {
                Some(token) => continuation = Some(token),
                None => break,
            }
        }

        Ok(records)
    }
}
